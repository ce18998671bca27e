//! # API Shared
//!
//! Shared wire types and services for the rxmatch surfaces.
//!
//! Contains:
//! - Request payloads, result rows, pagination and response envelopes (`wire` module)
//! - Shared services like `HealthService`
//!
//! Used by `rxmatch-core`, `api-rest` and the CLI so every surface speaks the same JSON shapes.

pub mod health;
pub mod wire;

pub use health::HealthService;
pub use wire::*;
