//! Member REST API Routes
//!
//! Members are always addressed through their organization. A member id that
//! exists under a different organization is reported as not found.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use roster_core::{
    CreateMember, MemberId, MemberResponse, OrganizationId, PatchOperation, PatchOutcomeError,
    UpdateMember,
};
use roster_storage::{Detached, EntityHandle, EntityStore, Tracking};

use crate::{
    error::{ApiError, ApiResult},
    extractors::{PathId, PathIds},
    pipeline::{
        parse_patch_document, MemberOfOrganizationExists, OrganizationExists, PayloadValidation,
        Pipeline,
    },
    routes::member_location,
};

// ============================================================================
// SHARED STATE
// ============================================================================

/// Shared state for member routes.
pub struct MemberState {
    store: Arc<dyn EntityStore>,
    list: Pipeline<Detached, ()>,
    get: Pipeline<Detached, ()>,
    create: Pipeline<Detached, CreateMember>,
    update: Pipeline<Tracking, UpdateMember>,
    patch: Pipeline<Tracking, ()>,
    delete: Pipeline<Detached, ()>,
}

impl MemberState {
    pub fn new(store: Arc<dyn EntityStore>) -> ApiResult<Self> {
        Ok(Self {
            store,
            list: Pipeline::<Detached, ()>::for_method(
                Method::GET,
                "GetMembersForOrganization",
            )?
            .stage(OrganizationExists),
            get: Pipeline::<Detached, ()>::for_method(Method::GET, "GetMemberForOrganization")?
                .stage(MemberOfOrganizationExists),
            create: Pipeline::<Detached, CreateMember>::for_method(
                Method::POST,
                "CreateMemberForOrganization",
            )?
            .stage(PayloadValidation::new())
            .stage(OrganizationExists),
            update: Pipeline::<Tracking, UpdateMember>::for_method(
                Method::PUT,
                "UpdateMemberForOrganization",
            )?
            .stage(PayloadValidation::new())
            .stage(MemberOfOrganizationExists),
            patch: Pipeline::<Tracking, ()>::for_method(
                Method::PATCH,
                "PartiallyUpdateMemberForOrganization",
            )?
            .stage(MemberOfOrganizationExists),
            delete: Pipeline::<Detached, ()>::for_method(
                Method::DELETE,
                "DeleteMemberForOrganization",
            )?
            .stage(MemberOfOrganizationExists),
        })
    }

    pub fn store(&self) -> Arc<dyn EntityStore> {
        Arc::clone(&self.store)
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/organizations/{id}/members - List the members of an organization
#[utoipa::path(
    get,
    path = "/api/organizations/{id}/members",
    tag = "Members",
    params(
        ("id" = String, Path, description = "Organization ID"),
    ),
    responses(
        (status = 200, description = "Members ordered by name", body = Vec<MemberResponse>),
        (status = 404, description = "Organization not found", body = ApiError),
    )
)]
pub async fn list_members(
    State(state): State<Arc<MemberState>>,
    PathId(organization_id): PathId<OrganizationId>,
) -> ApiResult<Json<Vec<MemberResponse>>> {
    let pipeline = &state.list;
    let ctx = pipeline
        .context(state.store())
        .with_organization_id(organization_id);
    pipeline
        .execute(ctx, |ctx| async move {
            let members = ctx
                .repositories()
                .members()
                .list::<Detached>(organization_id)
                .await?;
            Ok(Json(
                members.iter().map(|m| MemberResponse::from(&**m)).collect(),
            ))
        })
        .await
}

/// GET /api/organizations/{id}/members/{member_id} - Get one member
#[utoipa::path(
    get,
    path = "/api/organizations/{id}/members/{member_id}",
    tag = "Members",
    params(
        ("id" = String, Path, description = "Organization ID"),
        ("member_id" = String, Path, description = "Member ID"),
    ),
    responses(
        (status = 200, description = "Member found", body = MemberResponse),
        (status = 404, description = "Organization or member not found", body = ApiError),
    )
)]
pub async fn get_member(
    State(state): State<Arc<MemberState>>,
    PathIds((organization_id, member_id)): PathIds<(OrganizationId, MemberId)>,
) -> ApiResult<Json<MemberResponse>> {
    let pipeline = &state.get;
    let ctx = pipeline
        .context(state.store())
        .with_organization_id(organization_id)
        .with_member_id(member_id);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let member = ctx.take_member()?;
            Ok(Json(MemberResponse::from(&*member)))
        })
        .await
}

/// POST /api/organizations/{id}/members - Add a member to an organization
#[utoipa::path(
    post,
    path = "/api/organizations/{id}/members",
    tag = "Members",
    params(
        ("id" = String, Path, description = "Organization ID"),
    ),
    request_body = CreateMember,
    responses(
        (status = 201, description = "Member created", body = MemberResponse),
        (status = 400, description = "Body is missing", body = ApiError),
        (status = 404, description = "Organization not found", body = ApiError),
        (status = 422, description = "Body is invalid", body = ApiError),
    )
)]
pub async fn create_member(
    State(state): State<Arc<MemberState>>,
    PathId(organization_id): PathId<OrganizationId>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let pipeline = &state.create;
    let ctx = pipeline
        .context(state.store())
        .with_organization_id(organization_id)
        .with_body(body);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let member = ctx.take_payload()?.into_member(organization_id);
            let response = MemberResponse::from(&member);

            let member_id = ctx.repositories().members().create(organization_id, member);
            ctx.save().await?;

            tracing::info!(
                organization_id = %organization_id,
                member_id = %member_id,
                "Member created"
            );
            Ok((
                StatusCode::CREATED,
                [(header::LOCATION, member_location(organization_id, member_id))],
                Json(response),
            ))
        })
        .await
}

/// PUT /api/organizations/{id}/members/{member_id} - Replace a member's fields
#[utoipa::path(
    put,
    path = "/api/organizations/{id}/members/{member_id}",
    tag = "Members",
    params(
        ("id" = String, Path, description = "Organization ID"),
        ("member_id" = String, Path, description = "Member ID"),
    ),
    request_body = UpdateMember,
    responses(
        (status = 204, description = "Member updated"),
        (status = 400, description = "Body is missing", body = ApiError),
        (status = 404, description = "Organization or member not found", body = ApiError),
        (status = 422, description = "Body is invalid", body = ApiError),
    )
)]
pub async fn update_member(
    State(state): State<Arc<MemberState>>,
    PathIds((organization_id, member_id)): PathIds<(OrganizationId, MemberId)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let pipeline = &state.update;
    let ctx = pipeline
        .context(state.store())
        .with_organization_id(organization_id)
        .with_member_id(member_id)
        .with_body(body);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let member = ctx.take_member()?;
            let request = ctx.take_payload()?;

            member.modify(|m| request.apply_to(m));
            ctx.save().await?;

            tracing::info!(member_id = %member.id(), "Member updated");
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

/// PATCH /api/organizations/{id}/members/{member_id} - Apply a JSON Patch
///
/// The document is applied to the member's update-shape projection, which is
/// re-validated before anything is copied back onto the tracked member.
#[utoipa::path(
    patch,
    path = "/api/organizations/{id}/members/{member_id}",
    tag = "Members",
    params(
        ("id" = String, Path, description = "Organization ID"),
        ("member_id" = String, Path, description = "Member ID"),
    ),
    request_body = Vec<PatchOperation>,
    responses(
        (status = 204, description = "Member patched"),
        (status = 400, description = "Patch document is missing", body = ApiError),
        (status = 404, description = "Organization or member not found", body = ApiError),
        (status = 422, description = "Patch failed or produced an invalid member", body = ApiError),
    )
)]
pub async fn patch_member(
    State(state): State<Arc<MemberState>>,
    PathIds((organization_id, member_id)): PathIds<(OrganizationId, MemberId)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let pipeline = &state.patch;
    let ctx = pipeline
        .context(state.store())
        .with_organization_id(organization_id)
        .with_member_id(member_id)
        .with_body(body);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let member = ctx.take_member()?;
            let document = parse_patch_document(ctx.body(), ctx.operation())?;

            let projection = UpdateMember::from(&member.get());
            let patched = document
                .apply_validated(&projection)
                .map_err(|err| match err {
                    PatchOutcomeError::Patch(err) => {
                        tracing::error!(
                            operation = ctx.operation(),
                            error = %err,
                            "Patch document could not be applied"
                        );
                        ApiError::invalid_patch(&err)
                    }
                    PatchOutcomeError::Invalid(violations) => {
                        tracing::error!(
                            operation = ctx.operation(),
                            violations = violations.len(),
                            "Invalid model state for the patch document"
                        );
                        ApiError::validation_failed(ctx.operation(), &violations)
                    }
                })?;

            member.modify(|m| patched.apply_to(m));
            ctx.save().await?;

            tracing::info!(
                member_id = %member.id(),
                operations = document.len(),
                "Member patched"
            );
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

/// DELETE /api/organizations/{id}/members/{member_id} - Remove a member
#[utoipa::path(
    delete,
    path = "/api/organizations/{id}/members/{member_id}",
    tag = "Members",
    params(
        ("id" = String, Path, description = "Organization ID"),
        ("member_id" = String, Path, description = "Member ID"),
    ),
    responses(
        (status = 204, description = "Member deleted"),
        (status = 404, description = "Organization or member not found", body = ApiError),
    )
)]
pub async fn delete_member(
    State(state): State<Arc<MemberState>>,
    PathIds((organization_id, member_id)): PathIds<(OrganizationId, MemberId)>,
) -> ApiResult<StatusCode> {
    let pipeline = &state.delete;
    let ctx = pipeline
        .context(state.store())
        .with_organization_id(organization_id)
        .with_member_id(member_id);
    pipeline
        .execute(ctx, |mut ctx| async move {
            let member = ctx.take_member()?;
            ctx.repositories().members().delete(&member);
            ctx.save().await?;

            tracing::info!(member_id = %member.id(), "Member deleted");
            Ok(StatusCode::NO_CONTENT)
        })
        .await
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the member router, relative to /api/organizations.
pub fn create_router(store: Arc<dyn EntityStore>) -> ApiResult<Router> {
    let state = Arc::new(MemberState::new(store)?);

    Ok(Router::new()
        .route("/:id/members", get(list_members).post(create_member))
        .route(
            "/:id/members/:member_id",
            get(get_member)
                .put(update_member)
                .patch(patch_member)
                .delete(delete_member),
        )
        .with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_storage::InMemoryEntityStore;

    #[test]
    fn test_member_pipelines() {
        let state =
            MemberState::new(Arc::new(InMemoryEntityStore::new())).expect("pipelines wire up");
        assert_eq!(
            state.update.stage_names(),
            vec!["member-of-organization-exists", "payload-validation"]
        );
        assert_eq!(
            state.create.stage_names(),
            vec!["organization-exists", "payload-validation"]
        );
        assert_eq!(
            state.patch.stage_names(),
            vec!["member-of-organization-exists"]
        );
    }
}
