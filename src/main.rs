//! rxmatch service binary.
//!
//! Loads the drug knowledge catalogue once, wraps it in a session-pooled repository and serves the
//! REST API (with OpenAPI/Swagger UI) on top of it.

use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use rxmatch_core::config::{
    fallback_attribution_from_env_value, pool_size_from_env_value, resolve_catalogue_path,
};
use rxmatch_core::{Catalogue, CatalogueRepository, MatchConfig};

/// Main entry point for the rxmatch service
///
/// # Environment Variables
/// - `RXMATCH_REST_ADDR`: REST server address (default: "0.0.0.0:9999")
/// - `RXMATCH_CATALOGUE_PATH`: Catalogue file (default: `data/catalogue.yaml`, searched upwards)
/// - `RXMATCH_POOL_SIZE`: Maximum concurrent repository sessions (default: 20)
/// - `RXMATCH_FALLBACK_ATTRIBUTION`: `first-record` (default) or `per-record`
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the catalogue cannot be loaded,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rxmatch_run=info".parse()?)
                .add_directive("rxmatch_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("RXMATCH_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:9999".into());

    let catalogue_override = std::env::var("RXMATCH_CATALOGUE_PATH")
        .ok()
        .map(PathBuf::from);
    let catalogue_path = resolve_catalogue_path(catalogue_override)?;
    let pool_size = pool_size_from_env_value(std::env::var("RXMATCH_POOL_SIZE").ok())?;
    let fallback_attribution =
        fallback_attribution_from_env_value(std::env::var("RXMATCH_FALLBACK_ATTRIBUTION").ok())?;

    let cfg = Arc::new(MatchConfig::new(
        catalogue_path,
        pool_size,
        fallback_attribution,
    )?);

    let catalogue = Catalogue::load(cfg.catalogue_path())?;
    let repo = Arc::new(CatalogueRepository::new(catalogue, cfg.pool_size()));
    tracing::info!(
        "-- Repository pool size {}, fallback attribution {:?}",
        cfg.pool_size(),
        cfg.fallback_attribution()
    );

    let app = router(AppState::new(cfg, repo));

    tracing::info!("-- Starting rxmatch REST API on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
