//! Organization REST API Routes
//!
//! Single-entity reads and every write run through a [`Pipeline`]; listing
//! and collection reads go to the repositories directly.

use axum::{
    body::Bytes,
    extract::{rejection::PathRejection, Path, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;

use roster_core::{CreateOrganization, OrganizationId, OrganizationResponse, UpdateOrganization};
use roster_storage::{Detached, EntityHandle, EntityStore, RepositoryManager, Tracking};

use crate::{
    error::{ApiError, ApiResult, ErrorCode},
    extractors::PathId,
    pipeline::{OrganizationExists, PayloadValidation, Pipeline},
    routes::{collection_location, organization_location, parse_id_collection},
};

// ============================================================================
// SHARED STATE
// ============================================================================

/// Shared state for organization routes: the store and one pipeline per
/// filtered route.
pub struct OrganizationState {
    store: Arc<dyn EntityStore>,
    get: Pipeline<Detached, ()>,
    create: Pipeline<Detached, CreateOrganization>,
    create_collection: Pipeline<Detached, Vec<CreateOrganization>>,
    update: Pipeline<Tracking, UpdateOrganization>,
    delete: Pipeline<Detached, ()>,
}

impl OrganizationState {
    pub fn new(store: Arc<dyn EntityStore>) -> ApiResult<Self> {
        Ok(Self {
            store,
            get: Pipeline::<Detached, ()>::for_method(Method::GET, "GetOrganization")?
                .stage(OrganizationExists),
            create: Pipeline::<Detached, CreateOrganization>::for_method(
                Method::POST,
                "CreateOrganization",
            )?
            .stage(PayloadValidation::new()),
            create_collection: Pipeline::<Detached, Vec<CreateOrganization>>::for_method(
                Method::POST,
                "CreateOrganizationCollection",
            )?
            .stage(PayloadValidation::new()),
            update: Pipeline::<Tracking, UpdateOrganization>::for_method(
                Method::PUT,
                "UpdateOrganization",
            )?
            .stage(PayloadValidation::new())
            .stage(OrganizationExists),
            delete: Pipeline::<Detached, ()>::for_method(Method::DELETE, "DeleteOrganization")?
                .stage(OrganizationExists),
        })
    }

    pub fn store(&self) -> Arc<dyn EntityStore> {
        Arc::clone(&self.store)
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/organizations - List all organizations
#[utoipa::path(
    get,
    path = "/api/organizations",
    tag = "Organizations",
    responses(
        (status = 200, description = "All organizations ordered by name", body = Vec<OrganizationResponse>),
    )
)]
pub async fn list_organizations(
    State(state): State<Arc<OrganizationState>>,
) -> ApiResult<Json<Vec<OrganizationResponse>>> {
    let repositories = RepositoryManager::new(state.store());
    let organizations = repositories.organizations().list::<Detached>().await?;
    Ok(Json(
        organizations
            .iter()
            .map(|o| OrganizationResponse::from(&**o))
            .collect(),
    ))
}

/// GET /api/organizations/{id} - Get one organization
#[utoipa::path(
    get,
    path = "/api/organizations/{id}",
    tag = "Organizations",
    params(
        ("id" = String, Path, description = "Organization ID"),
    ),
    responses(
        (status = 200, description = "Organization found", body = OrganizationResponse),
        (status = 400, description = "Malformed id", body = ApiError),
        (status = 404, description = "Organization not found", body = ApiError),
    )
)]
pub async fn get_organization(
    State(state): State<Arc<OrganizationState>>,
    PathId(id): PathId<OrganizationId>,
) -> ApiResult<Json<OrganizationResponse>> {
    let pipeline = &state.get;
    let ctx = pipeline.context(state.store()).with_organization_id(id);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let organization = ctx.take_organization()?;
            Ok(Json(OrganizationResponse::from(&*organization)))
        })
        .await
}

/// POST /api/organizations - Create an organization with optional members
#[utoipa::path(
    post,
    path = "/api/organizations",
    tag = "Organizations",
    request_body = CreateOrganization,
    responses(
        (status = 201, description = "Organization created", body = OrganizationResponse),
        (status = 400, description = "Body is missing", body = ApiError),
        (status = 422, description = "Body is invalid", body = ApiError),
    )
)]
pub async fn create_organization(
    State(state): State<Arc<OrganizationState>>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let pipeline = &state.create;
    let ctx = pipeline.context(state.store()).with_body(body);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let request = ctx.take_payload()?;
            let (organization, members) = request.into_entities();
            let response = OrganizationResponse::from(&organization);

            let organization_id = ctx.repositories().organizations().create(organization);
            for member in members {
                ctx.repositories().members().create(organization_id, member);
            }
            ctx.save().await?;

            tracing::info!(organization_id = %organization_id, "Organization created");
            Ok((
                StatusCode::CREATED,
                [(header::LOCATION, organization_location(organization_id))],
                Json(response),
            ))
        })
        .await
}

/// PUT /api/organizations/{id} - Replace an organization's fields
///
/// Members in the body are added to the organization.
#[utoipa::path(
    put,
    path = "/api/organizations/{id}",
    tag = "Organizations",
    params(
        ("id" = String, Path, description = "Organization ID"),
    ),
    request_body = UpdateOrganization,
    responses(
        (status = 204, description = "Organization updated"),
        (status = 400, description = "Body is missing", body = ApiError),
        (status = 404, description = "Organization not found", body = ApiError),
        (status = 422, description = "Body is invalid", body = ApiError),
    )
)]
pub async fn update_organization(
    State(state): State<Arc<OrganizationState>>,
    PathId(id): PathId<OrganizationId>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let pipeline = &state.update;
    let ctx = pipeline
        .context(state.store())
        .with_organization_id(id)
        .with_body(body);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let organization = ctx.take_organization()?;
            let request = ctx.take_payload()?;

            organization.modify(|o| request.apply_to(o));
            let organization_id = organization.id();
            for member in request.new_members(organization_id) {
                ctx.repositories().members().create(organization_id, member);
            }
            ctx.save().await?;

            tracing::info!(organization_id = %organization_id, "Organization updated");
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

/// DELETE /api/organizations/{id} - Delete an organization and its members
#[utoipa::path(
    delete,
    path = "/api/organizations/{id}",
    tag = "Organizations",
    params(
        ("id" = String, Path, description = "Organization ID"),
    ),
    responses(
        (status = 204, description = "Organization deleted"),
        (status = 404, description = "Organization not found", body = ApiError),
    )
)]
pub async fn delete_organization(
    State(state): State<Arc<OrganizationState>>,
    PathId(id): PathId<OrganizationId>,
) -> ApiResult<StatusCode> {
    let pipeline = &state.delete;
    let ctx = pipeline.context(state.store()).with_organization_id(id);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let organization = ctx.take_organization()?;
            ctx.repositories().organizations().delete(&organization);
            ctx.save().await?;

            tracing::info!(organization_id = %organization.id(), "Organization deleted");
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

/// GET /api/organizations/collection/({ids}) - Get several organizations
#[utoipa::path(
    get,
    path = "/api/organizations/collection/{ids}",
    tag = "Organizations",
    params(
        ("ids" = String, Path, description = "Comma-separated organization IDs, optionally in parentheses"),
    ),
    responses(
        (status = 200, description = "Organizations in request order", body = Vec<OrganizationResponse>),
        (status = 400, description = "Empty or malformed id list", body = ApiError),
        (status = 404, description = "Some ids are unknown", body = ApiError),
    )
)]
pub async fn get_organization_collection(
    State(state): State<Arc<OrganizationState>>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<Vec<OrganizationResponse>>> {
    let Path(raw) = path?;
    let ids = parse_id_collection::<OrganizationId>(&raw)?;

    let repositories = RepositoryManager::new(state.store());
    let found = repositories
        .organizations()
        .get_many::<Detached>(&ids)
        .await?;
    if found.len() != ids.len() {
        tracing::error!(
            requested = ids.len(),
            found = found.len(),
            "Some ids are not valid in a collection"
        );
        return Err(ApiError::new(
            ErrorCode::EntityNotFound,
            "Some ids are not valid in a collection",
        ));
    }

    let mut by_id: HashMap<OrganizationId, OrganizationResponse> = found
        .iter()
        .map(|o| (o.id, OrganizationResponse::from(&**o)))
        .collect();
    Ok(Json(ids.iter().filter_map(|id| by_id.remove(id)).collect()))
}

/// POST /api/organizations/collection - Create several organizations at once
#[utoipa::path(
    post,
    path = "/api/organizations/collection",
    tag = "Organizations",
    request_body = Vec<CreateOrganization>,
    responses(
        (status = 201, description = "Organizations created", body = Vec<OrganizationResponse>),
        (status = 400, description = "Body is missing or empty", body = ApiError),
        (status = 422, description = "Some organization is invalid", body = ApiError),
    )
)]
pub async fn create_organization_collection(
    State(state): State<Arc<OrganizationState>>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let pipeline = &state.create_collection;
    let ctx = pipeline.context(state.store()).with_body(body);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let requests = ctx.take_payload()?;
            if requests.is_empty() {
                tracing::error!(operation = ctx.operation(), "Organization collection is empty");
                return Err(ApiError::invalid_input("Organization collection is empty"));
            }

            let mut ids = Vec::with_capacity(requests.len());
            let mut responses = Vec::with_capacity(requests.len());
            for request in requests {
                let (organization, members) = request.into_entities();
                responses.push(OrganizationResponse::from(&organization));
                let organization_id = ctx.repositories().organizations().create(organization);
                for member in members {
                    ctx.repositories().members().create(organization_id, member);
                }
                ids.push(organization_id);
            }
            ctx.save().await?;

            tracing::info!(count = ids.len(), "Organization collection created");
            Ok((
                StatusCode::CREATED,
                [(header::LOCATION, collection_location(&ids))],
                Json(responses),
            ))
        })
        .await
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the organization router, relative to /api/organizations.
pub fn create_router(store: Arc<dyn EntityStore>) -> ApiResult<Router> {
    let state = Arc::new(OrganizationState::new(store)?);

    Ok(Router::new()
        .route("/", get(list_organizations).post(create_organization))
        .route(
            "/:id",
            get(get_organization)
                .put(update_organization)
                .delete(delete_organization),
        )
        .route("/collection", post(create_organization_collection))
        .route("/collection/:ids", get(get_organization_collection))
        .with_state(state))
}
