//! # rxmatch Core
//!
//! Core business logic for the rxmatch drug-safety service.
//!
//! This crate resolves drug identifiers given at any level of the drug hierarchy (brand package,
//! brand product, generic package, generic product, moiety, substance) or by free-text name into
//! active-substance identifiers, and evaluates two relations over them:
//! - drug-drug interaction contrasts between current and historical medications
//!   ([`InteractionService`])
//! - drug-allergy cross-matches against current and historical medications ([`AllergyService`])
//!
//! The knowledge graph is reached only through the [`DrugRepository`] port. An in-memory adapter
//! over a YAML catalogue ([`CatalogueRepository`]) ships with the crate.
//!
//! **No API concerns**: HTTP servers, routing and OpenAPI belong in `api-rest`.

pub mod config;
pub mod constants;
pub mod enrichment;
pub mod error;
pub mod hierarchy;
pub mod pagination;
pub mod repositories;
pub mod services;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

// Wire types are shared with every API surface.
pub use api_shared::wire;

pub use config::{FallbackAttribution, MatchConfig};
pub use error::{MatchError, MatchResult, RepositoryError, RepositoryResult};
pub use hierarchy::HierarchyLevel;
pub use repositories::catalogue::{Catalogue, CatalogueRepository};
pub use repositories::{ContrastFact, DrugRepository, HierarchyDetail, SubstancePair};
pub use services::allergy::AllergyService;
pub use services::interaction::InteractionService;
