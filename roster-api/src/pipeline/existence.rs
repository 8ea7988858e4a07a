//! Existence stages.
//!
//! Resolve the entities named by the request path before the handler runs and
//! leave them in the request context. A missing entity ends the request with
//! a 404; the handler never sees it.

use crate::error::ApiError;
use crate::pipeline::{Flow, Phase, RequestContext, Stage};
use async_trait::async_trait;
use roster_storage::{Detached, FetchMode};

/// Resolves the organization named by the path into `ctx.organization`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationExists;

#[async_trait]
impl<M, B> Stage<M, B> for OrganizationExists
where
    M: FetchMode,
    B: Send + Sync,
{
    fn name(&self) -> &'static str {
        "organization-exists"
    }

    fn phase(&self) -> Phase {
        Phase::Existence
    }

    async fn run(&self, ctx: &mut RequestContext<M, B>) -> Flow {
        let id = match ctx.organization_id() {
            Ok(id) => id,
            Err(error) => return Flow::ShortCircuit(error),
        };

        let found = match ctx.repositories().organizations().get::<M>(id).await {
            Ok(found) => found,
            Err(error) => return Flow::ShortCircuit(ApiError::from(error)),
        };

        match found {
            None => {
                tracing::info!(
                    organization_id = %id,
                    "Organization with id {} doesn't exist in the database",
                    id
                );
                Flow::ShortCircuit(ApiError::organization_not_found(id))
            }
            Some(organization) => match ctx.organization.put(organization) {
                Ok(()) => Flow::Continue,
                Err(error) => Flow::ShortCircuit(error),
            },
        }
    }
}

/// Resolves the organization and then the member named by the path.
///
/// The parent is only checked, never kept, so it is always fetched detached.
/// The member goes into `ctx.member` in the pipeline's fetch mode. An absent
/// parent ends the request before any member query is issued.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberOfOrganizationExists;

#[async_trait]
impl<M, B> Stage<M, B> for MemberOfOrganizationExists
where
    M: FetchMode,
    B: Send + Sync,
{
    fn name(&self) -> &'static str {
        "member-of-organization-exists"
    }

    fn phase(&self) -> Phase {
        Phase::Existence
    }

    async fn run(&self, ctx: &mut RequestContext<M, B>) -> Flow {
        let (organization_id, member_id) = match (ctx.organization_id(), ctx.member_id()) {
            (Ok(organization_id), Ok(member_id)) => (organization_id, member_id),
            (Err(error), _) | (_, Err(error)) => return Flow::ShortCircuit(error),
        };

        let parent = ctx
            .repositories()
            .organizations()
            .get::<Detached>(organization_id)
            .await;
        match parent {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::info!(
                    organization_id = %organization_id,
                    "Organization with id {} doesn't exist in the database",
                    organization_id
                );
                return Flow::ShortCircuit(ApiError::organization_not_found(organization_id));
            }
            Err(error) => return Flow::ShortCircuit(ApiError::from(error)),
        }

        let member = match ctx
            .repositories()
            .members()
            .get::<M>(organization_id, member_id)
            .await
        {
            Ok(member) => member,
            Err(error) => return Flow::ShortCircuit(ApiError::from(error)),
        };

        match member {
            None => {
                tracing::info!(
                    member_id = %member_id,
                    "Member with id {} doesn't exist in the database",
                    member_id
                );
                Flow::ShortCircuit(ApiError::member_not_found(member_id))
            }
            Some(member) => match ctx.member.put(member) {
                Ok(()) => Flow::Continue,
                Err(error) => Flow::ShortCircuit(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::pipeline::MutationIntent;
    use roster_core::{EntityIdType, MemberId, OrganizationId};
    use roster_storage::{EntityHandle, Tracking};
    use roster_test_utils::{fixtures, RecordingStore, StoreCall};
    use std::sync::Arc;

    fn context<M: FetchMode>(
        store: &RecordingStore,
        intent: MutationIntent,
    ) -> RequestContext<M, ()> {
        RequestContext::new(Arc::new(store.clone()), intent, "Test")
    }

    #[tokio::test]
    async fn test_missing_organization_leaves_slot_empty() {
        let (store, _, _) = fixtures::seeded_store();
        let store = RecordingStore::new(Arc::new(store));
        let mut ctx = context::<Detached>(&store, MutationIntent::ReadOnly)
            .with_organization_id(OrganizationId::now_v7());

        let flow = OrganizationExists.run(&mut ctx).await;

        match flow {
            Flow::ShortCircuit(error) => assert_eq!(error.code, ErrorCode::OrganizationNotFound),
            Flow::Continue => panic!("expected a short-circuit"),
        }
        assert!(!ctx.organization.was_populated());
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_tracked_organization_lookup() {
        let (store, org, _) = fixtures::seeded_store();
        let store = RecordingStore::new(Arc::new(store));
        let mut ctx =
            context::<Tracking>(&store, MutationIntent::Replace).with_organization_id(org.id);

        assert!(matches!(OrganizationExists.run(&mut ctx).await, Flow::Continue));
        assert_eq!(ctx.take_organization().expect("populated").id(), org.id);
        assert_eq!(store.tracking_flags(), vec![true]);
    }

    #[tokio::test]
    async fn test_absent_parent_issues_no_member_query() {
        let (store, _, member) = fixtures::seeded_store();
        let store = RecordingStore::new(Arc::new(store));
        let mut ctx = context::<Tracking>(&store, MutationIntent::Partial)
            .with_organization_id(OrganizationId::now_v7())
            .with_member_id(member.id);

        let flow = MemberOfOrganizationExists.run(&mut ctx).await;

        assert!(matches!(
            flow,
            Flow::ShortCircuit(ref e) if e.code == ErrorCode::OrganizationNotFound
        ));
        assert_eq!(store.member_query_count(), 0);
        assert!(!ctx.member.was_populated());
    }

    #[tokio::test]
    async fn test_missing_member_short_circuits() {
        let (store, org, _) = fixtures::seeded_store();
        let store = RecordingStore::new(Arc::new(store));
        let mut ctx = context::<Detached>(&store, MutationIntent::ReadOnly)
            .with_organization_id(org.id)
            .with_member_id(MemberId::now_v7());

        let flow = MemberOfOrganizationExists.run(&mut ctx).await;

        assert!(matches!(flow, Flow::ShortCircuit(ref e) if e.code == ErrorCode::MemberNotFound));
        assert!(!ctx.member.was_populated());
    }

    #[tokio::test]
    async fn test_member_fetched_in_pipeline_mode() {
        let (store, org, member) = fixtures::seeded_store();
        let store = RecordingStore::new(Arc::new(store));
        let mut ctx = context::<Tracking>(&store, MutationIntent::Replace)
            .with_organization_id(org.id)
            .with_member_id(member.id);

        assert!(matches!(
            MemberOfOrganizationExists.run(&mut ctx).await,
            Flow::Continue
        ));
        let member_call = store
            .calls()
            .into_iter()
            .find(StoreCall::is_member_query)
            .expect("member queried");
        assert!(member_call.tracking());
        assert_eq!(ctx.take_member().expect("populated").id(), member.id);
    }
}
