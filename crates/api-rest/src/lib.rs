//! # API REST
//!
//! REST API implementation for rxmatch.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialisation, status codes, CORS)
//!
//! Uses `api-shared` for the wire types and `rxmatch-core` for the matching engines. The binary
//! that serves this router lives in the workspace root (`rxmatch-run`).

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use api_shared::wire::{
    AllergyItem, AllergyPage, AllergyPayload, AllergyResponse, ContrastItem, ContrastPage,
    DrugPayload, DrugRecord, DrugsResponse, HealthRes, Pagination, SubstanceRef,
};
use api_shared::HealthService;
use rxmatch_core::constants::{DEFAULT_PAGE, DEFAULT_ROW, SUCCESS_CODE, SUCCESS_MESSAGE};
use rxmatch_core::{AllergyService, DrugRepository, InteractionService, MatchConfig, MatchError};

/// Application state shared across REST API handlers.
///
/// Holds one instance of each matching engine; both share the same configuration and repository.
#[derive(Clone)]
pub struct AppState {
    interactions: InteractionService,
    allergy: AllergyService,
}

impl AppState {
    pub fn new(cfg: Arc<MatchConfig>, repo: Arc<dyn DrugRepository>) -> Self {
        Self {
            interactions: InteractionService::new(cfg.clone(), repo.clone()),
            allergy: AllergyService::new(cfg, repo),
        }
    }
}

/// Page selection shared by the matching endpoints.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number (default 1).
    page: Option<usize>,
    /// Page size (default 10).
    row: Option<usize>,
}

impl PageQuery {
    fn resolve(&self) -> (usize, usize) {
        (
            self.page.unwrap_or(DEFAULT_PAGE),
            self.row.unwrap_or(DEFAULT_ROW),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, drugs, allergy),
    components(schemas(
        HealthRes,
        DrugRecord,
        DrugPayload,
        AllergyPayload,
        SubstanceRef,
        ContrastItem,
        AllergyItem,
        Pagination,
        ContrastPage,
        AllergyPage,
        DrugsResponse,
        AllergyResponse,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router with its OpenAPI document, Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/drugs", post(drugs))
        .route("/api/v1/allergy", post(allergy))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Maps an engine error to a status code and a plain-text message.
fn error_response(context: &'static str, err: MatchError) -> (StatusCode, String) {
    match err {
        MatchError::InvalidInput(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
        MatchError::RepositoryUnavailable(e) => {
            tracing::error!("{context} error: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Drug knowledge repository unavailable".to_string(),
            )
        }
        other => {
            tracing::error!("{context} error: {:?}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/api/v1/drugs",
    params(PageQuery),
    request_body = DrugPayload,
    responses(
        (status = 200, description = "Page of drug-drug interaction rows", body = DrugsResponse),
        (status = 422, description = "Invalid payload or page request"),
        (status = 503, description = "Drug knowledge repository unavailable"),
        (status = 500, description = "Internal server error")
    )
)]
/// Find interactions between current and historical medications
///
/// # Arguments
/// * `query` - Optional `page` and `row`
/// * `payload` - `drug_currents` (at least one) and optional `drug_histories`
///
/// # Returns
/// * `Ok(Json<DrugsResponse>)` - The requested page of contrast rows
/// * `Err((StatusCode, String))` - Error status with a plain-text message
///
/// # Errors
/// Returns `422 Unprocessable Entity` if the payload or page request is invalid, and
/// `503 Service Unavailable` if the knowledge repository cannot be reached.
#[axum::debug_handler]
async fn drugs(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Json(payload): Json<DrugPayload>,
) -> Result<Json<DrugsResponse>, (StatusCode, String)> {
    let (page, row) = query.resolve();
    let data = state
        .interactions
        .get_interactions(&payload, page, row)
        .await
        .map_err(|e| error_response("Interaction matching", e))?;

    Ok(Json(DrugsResponse {
        status: true,
        code: SUCCESS_CODE,
        message: SUCCESS_MESSAGE.into(),
        data,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/allergy",
    params(PageQuery),
    request_body = AllergyPayload,
    responses(
        (status = 200, description = "Page of drug-allergy rows", body = AllergyResponse),
        (status = 422, description = "Invalid payload or page request"),
        (status = 503, description = "Drug knowledge repository unavailable"),
        (status = 500, description = "Internal server error")
    )
)]
/// Cross-check the allergy list against current and historical medications
///
/// # Arguments
/// * `query` - Optional `page` and `row`
/// * `payload` - `drug_currents` and `drug_allergies` (at least one each), optional
///   `drug_histories`
///
/// # Errors
/// Same mapping as `/api/v1/drugs`.
#[axum::debug_handler]
async fn allergy(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Json(payload): Json<AllergyPayload>,
) -> Result<Json<AllergyResponse>, (StatusCode, String)> {
    let (page, row) = query.resolve();
    let data = state
        .allergy
        .get_allergy(&payload, page, row)
        .await
        .map_err(|e| error_response("Allergy matching", e))?;

    Ok(Json(AllergyResponse {
        status: true,
        code: SUCCESS_CODE,
        message: SUCCESS_MESSAGE.into(),
        data,
    }))
}
