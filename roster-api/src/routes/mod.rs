//! REST API Routes Module
//!
//! Route handlers organized by entity type, all nested under
//! `/api/organizations`:
//! - Organization CRUD and collection routes
//! - Member routes scoped to their organization
//! - OpenAPI spec at `/openapi.json`
//!
//! Every router is wrapped in the panic boundary, request tracing and CORS.

pub mod member;
pub mod organization;

use std::any::Any;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, request::Parts, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use roster_core::{EntityIdType, MemberId, OrganizationId};
use roster_storage::EntityStore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as CorsAny, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::error::{internal_server_error_response, ApiError, ApiResult};
use crate::openapi::ApiDoc;

pub use member::create_router as member_router;
pub use organization::create_router as organization_router;

/// Prefix every route in this module is served under.
pub const BASE_PATH: &str = "/api/organizations";

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// LOCATIONS AND ID COLLECTIONS
// ============================================================================

pub fn organization_location(id: OrganizationId) -> String {
    format!("{}/{}", BASE_PATH, id)
}

pub fn member_location(organization_id: OrganizationId, id: MemberId) -> String {
    format!("{}/{}/members/{}", BASE_PATH, organization_id, id)
}

pub fn collection_location(ids: &[OrganizationId]) -> String {
    let joined = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("{}/collection/({})", BASE_PATH, joined)
}

/// Parse `(id1,id2,...)` or `id1,id2,...` into ids, dropping duplicates.
///
/// An empty list or any unparseable element is a 400.
pub fn parse_id_collection<T>(raw: &str) -> ApiResult<Vec<T>>
where
    T: EntityIdType + FromStr<Err = uuid::Error>,
{
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for part in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = T::from_str(part).map_err(|_| {
            tracing::error!(value = part, "Unparseable id in collection");
            ApiError::invalid_format("ids", "comma-separated UUIDs")
        })?;
        if seen.insert(id) {
            ids.push(id);
        }
    }

    if ids.is_empty() {
        tracing::error!("Parameter ids is null");
        return Err(ApiError::invalid_input("Parameter ids is null"));
    }
    Ok(ids)
}

// ============================================================================
// PANIC BOUNDARY
// ============================================================================

/// Render a panic as the fixed 500 body.
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %detail, "Something went wrong");
    internal_server_error_response()
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, each request origin is checked with
/// [`ApiConfig::is_origin_allowed`], so `*.roster.run` style entries apply.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .expose_headers([header::LOCATION])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_production() {
        tracing::info!("CORS: Development mode - allowing all origins");
        return cors.allow_origin(AllowOrigin::any()).allow_headers(CorsAny);
    }

    tracing::info!(
        "CORS: Production mode - allowing origins: {:?}",
        config.cors_origins
    );
    let allowed = config.clone();
    let cors = cors.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .is_ok_and(|origin| allowed.is_origin_allowed(origin))
        },
    ));

    if config.cors_allow_credentials {
        // Credentials cannot be combined with a wildcard header list.
        cors.allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
            .allow_credentials(true)
    } else {
        cors.allow_headers(CorsAny)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// - Organization routes under /api/organizations
/// - Member routes under /api/organizations/:id/members
/// - OpenAPI spec at /openapi.json
///
/// Pipelines are assembled here, once; a route wired with the wrong fetch
/// mode for its verb fails router construction.
pub fn create_api_router(store: Arc<dyn EntityStore>, api_config: &ApiConfig) -> ApiResult<Router> {
    let entity_routes = organization::create_router(Arc::clone(&store))?
        .merge(member::create_router(store)?);

    let router = Router::new()
        .nest(BASE_PATH, entity_routes)
        .route("/openapi.json", get(openapi_json));

    Ok(router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(api_config)))
}
