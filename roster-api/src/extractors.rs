//! Path extractors for typed entity ids.
//!
//! A path segment that is not a UUID is rejected with a 400 `InvalidFormat`
//! [`ApiError`] instead of axum's plain-text rejection.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use roster_core::EntityIdType;
use uuid::Uuid;

use crate::error::ApiError;

/// Extractor for a single typed id from the path.
///
/// ```rust,ignore
/// async fn get_organization(
///     PathId(organization_id): PathId<OrganizationId>,
/// ) -> ApiResult<impl IntoResponse> { ... }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PathId<T: EntityIdType>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathId<T>
where
    S: Send + Sync,
    T: EntityIdType,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(uuid): Path<Uuid> = Path::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                tracing::info!(
                    path = %parts.uri.path(),
                    entity = %T::KIND,
                    "Rejected path parameter"
                );
                ApiError::from(rejection)
            })?;

        Ok(PathId(T::new(uuid)))
    }
}

/// Extractor for two typed ids, in route order.
///
/// ```rust,ignore
/// // For route: /:id/members/:member_id
/// async fn get_member(
///     PathIds((organization_id, member_id)): PathIds<(OrganizationId, MemberId)>,
/// ) -> ApiResult<impl IntoResponse> { ... }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PathIds<T>(pub T);

#[async_trait]
impl<S, T1, T2> FromRequestParts<S> for PathIds<(T1, T2)>
where
    S: Send + Sync,
    T1: EntityIdType,
    T2: EntityIdType,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((first, second)): Path<(Uuid, Uuid)> = Path::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                tracing::info!(path = %parts.uri.path(), "Rejected path parameters");
                ApiError::from(rejection)
            })?;

        Ok(PathIds((T1::new(first), T2::new(second))))
    }
}
