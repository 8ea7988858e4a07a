//! Async entity store contract.
//!
//! The store is the persistence gateway behind the repository facade. The
//! `tracking` flag on every read is the caller's change-tracking hint; the
//! repository decides what kind of handle the returned value becomes.

use crate::error::StoreResult;
use crate::record::ChangeSet;
use ::async_trait::async_trait;
use roster_core::{Member, MemberId, Organization, OrganizationId};

/// Persistence gateway for organizations and members.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // ========================================================================
    // ORGANIZATION OPERATIONS
    // ========================================================================

    /// Get an organization by ID.
    async fn organization_get(
        &self,
        id: OrganizationId,
        tracking: bool,
    ) -> StoreResult<Option<Organization>>;

    /// Get every organization whose ID is in `ids`. Unknown IDs are skipped.
    async fn organization_get_many(
        &self,
        ids: &[OrganizationId],
        tracking: bool,
    ) -> StoreResult<Vec<Organization>>;

    /// List all organizations ordered by name.
    async fn organization_list(&self, tracking: bool) -> StoreResult<Vec<Organization>>;

    // ========================================================================
    // MEMBER OPERATIONS
    // ========================================================================

    /// Get a member by ID, scoped to its organization.
    async fn member_get(
        &self,
        organization_id: OrganizationId,
        id: MemberId,
        tracking: bool,
    ) -> StoreResult<Option<Member>>;

    /// List the members of an organization ordered by name.
    async fn member_list_by_organization(
        &self,
        organization_id: OrganizationId,
        tracking: bool,
    ) -> StoreResult<Vec<Member>>;

    // ========================================================================
    // FLUSH
    // ========================================================================

    /// Durably apply a change set, all or nothing.
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()>;
}
