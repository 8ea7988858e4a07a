//! Roster Test Utilities
//!
//! Shared test infrastructure for the roster workspace:
//! - Proptest generators for entities and request shapes
//! - Fixtures for common scenarios
//! - A recording store that observes every store call

pub use roster_core::{
    CreateMember, CreateOrganization, EntityIdType, Member, MemberId, Organization,
    OrganizationId, UpdateMember, UpdateOrganization,
};
pub use roster_storage::{ChangeSet, EntityStore, InMemoryEntityStore, StoreError, StoreResult};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for roster entities and request shapes.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_organization_id() -> impl Strategy<Value = OrganizationId> {
        arb_uuid().prop_map(OrganizationId::new)
    }

    pub fn arb_member_id() -> impl Strategy<Value = MemberId> {
        arb_uuid().prop_map(MemberId::new)
    }

    /// Non-blank text of at most `max` characters.
    fn arb_text(max: usize) -> impl Strategy<Value = String> {
        prop::collection::vec(prop::char::range('a', 'z'), 1..=max)
            .prop_map(|chars| chars.into_iter().collect())
    }

    /// Generate a valid age.
    pub fn arb_age() -> impl Strategy<Value = i32> {
        0..=150i32
    }

    /// Generate an age outside the accepted range.
    pub fn arb_invalid_age() -> impl Strategy<Value = i32> {
        prop_oneof![i32::MIN..0i32, 151..=i32::MAX]
    }

    /// Generate a valid CreateMember request.
    pub fn arb_create_member() -> impl Strategy<Value = CreateMember> {
        (arb_text(30), arb_age(), arb_text(20)).prop_map(|(name, age, position)| CreateMember {
            name,
            age: Some(age),
            position,
        })
    }

    /// Generate a valid UpdateMember request.
    pub fn arb_update_member() -> impl Strategy<Value = UpdateMember> {
        (arb_text(30), arb_age(), arb_text(20)).prop_map(|(name, age, position)| UpdateMember {
            name,
            age: Some(age),
            position,
        })
    }

    /// Generate a valid CreateOrganization request with up to three members.
    pub fn arb_create_organization() -> impl Strategy<Value = CreateOrganization> {
        (
            arb_text(60),
            arb_text(60),
            prop::option::of(arb_text(60)),
            prop::collection::vec(arb_create_member(), 0..3),
        )
            .prop_map(|(name, address, country, members)| CreateOrganization {
                name,
                address,
                country,
                members,
            })
    }

    /// Generate a valid UpdateOrganization request without nested members.
    pub fn arb_update_organization() -> impl Strategy<Value = UpdateOrganization> {
        (arb_text(60), arb_text(60), prop::option::of(arb_text(60))).prop_map(
            |(name, address, country)| UpdateOrganization {
                name,
                address,
                country,
                members: vec![],
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities for common testing scenarios.

    use super::*;

    pub fn acme() -> Organization {
        Organization {
            id: OrganizationId::now_v7(),
            name: "Acme".to_string(),
            address: "1 Main St".to_string(),
            country: Some("USA".to_string()),
        }
    }

    pub fn create_acme() -> CreateOrganization {
        CreateOrganization {
            name: "Acme".to_string(),
            address: "1 Main St".to_string(),
            country: Some("USA".to_string()),
            members: vec![],
        }
    }

    pub fn member_of(organization_id: OrganizationId, name: &str, age: i32) -> Member {
        Member {
            id: MemberId::now_v7(),
            organization_id,
            name: name.to_string(),
            age,
            position: "Engineer".to_string(),
        }
    }

    pub fn create_member(name: &str, age: i32) -> CreateMember {
        CreateMember {
            name: name.to_string(),
            age: Some(age),
            position: "Engineer".to_string(),
        }
    }

    /// Store holding Acme and one member, Ana (30).
    pub fn seeded_store() -> (InMemoryEntityStore, Organization, Member) {
        let org = acme();
        let member = member_of(org.id, "Ana", 30);
        let store = InMemoryEntityStore::seeded(vec![org.clone()], vec![member.clone()])
            .unwrap_or_else(|err| panic!("seeding fixture store failed: {}", err));
        (store, org, member)
    }
}

// ============================================================================
// RECORDING STORE
// ============================================================================

/// A store read observed by [`RecordingStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCall {
    OrganizationGet { id: OrganizationId, tracking: bool },
    OrganizationGetMany { count: usize, tracking: bool },
    OrganizationList { tracking: bool },
    MemberGet {
        organization_id: OrganizationId,
        id: MemberId,
        tracking: bool,
    },
    MemberList {
        organization_id: OrganizationId,
        tracking: bool,
    },
}

impl StoreCall {
    pub fn tracking(&self) -> bool {
        match *self {
            StoreCall::OrganizationGet { tracking, .. }
            | StoreCall::OrganizationGetMany { tracking, .. }
            | StoreCall::OrganizationList { tracking }
            | StoreCall::MemberGet { tracking, .. }
            | StoreCall::MemberList { tracking, .. } => tracking,
        }
    }

    pub fn is_member_query(&self) -> bool {
        matches!(self, StoreCall::MemberGet { .. } | StoreCall::MemberList { .. })
    }
}

#[derive(Default)]
struct Recorded {
    calls: Vec<StoreCall>,
    commits: Vec<ChangeSet>,
}

/// Store wrapper that records every call and can fail commits on demand.
///
/// Clones share the recording.
#[derive(Clone)]
pub struct RecordingStore {
    inner: Arc<dyn EntityStore>,
    recorded: Arc<Mutex<Recorded>>,
    fail_commits: Arc<AtomicBool>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn EntityStore>) -> Self {
        Self {
            inner,
            recorded: Arc::new(Mutex::new(Recorded::default())),
            fail_commits: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every following commit fail with a database error.
    pub fn failing_commits(self) -> Self {
        self.fail_commits.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.recorded
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .calls
            .clone()
    }

    /// Change sets that reached the inner store.
    pub fn commits(&self) -> Vec<ChangeSet> {
        self.recorded
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .commits
            .clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commits().len()
    }

    pub fn member_query_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_member_query()).count()
    }

    /// Tracking flag of every recorded read, in call order.
    pub fn tracking_flags(&self) -> Vec<bool> {
        self.calls().iter().map(StoreCall::tracking).collect()
    }

    pub fn reset(&self) {
        let mut recorded = self.recorded.lock().unwrap_or_else(|err| err.into_inner());
        recorded.calls.clear();
        recorded.commits.clear();
    }

    fn record(&self, call: StoreCall) {
        self.recorded
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .calls
            .push(call);
    }
}

#[async_trait]
impl EntityStore for RecordingStore {
    async fn organization_get(
        &self,
        id: OrganizationId,
        tracking: bool,
    ) -> StoreResult<Option<Organization>> {
        self.record(StoreCall::OrganizationGet { id, tracking });
        self.inner.organization_get(id, tracking).await
    }

    async fn organization_get_many(
        &self,
        ids: &[OrganizationId],
        tracking: bool,
    ) -> StoreResult<Vec<Organization>> {
        self.record(StoreCall::OrganizationGetMany {
            count: ids.len(),
            tracking,
        });
        self.inner.organization_get_many(ids, tracking).await
    }

    async fn organization_list(&self, tracking: bool) -> StoreResult<Vec<Organization>> {
        self.record(StoreCall::OrganizationList { tracking });
        self.inner.organization_list(tracking).await
    }

    async fn member_get(
        &self,
        organization_id: OrganizationId,
        id: MemberId,
        tracking: bool,
    ) -> StoreResult<Option<Member>> {
        self.record(StoreCall::MemberGet {
            organization_id,
            id,
            tracking,
        });
        self.inner.member_get(organization_id, id, tracking).await
    }

    async fn member_list_by_organization(
        &self,
        organization_id: OrganizationId,
        tracking: bool,
    ) -> StoreResult<Vec<Member>> {
        self.record(StoreCall::MemberList {
            organization_id,
            tracking,
        });
        self.inner
            .member_list_by_organization(organization_id, tracking)
            .await
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Database {
                reason: "injected commit failure".to_string(),
            });
        }
        self.recorded
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .commits
            .push(changes.clone());
        self.inner.commit(changes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use roster_core::Validate;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_generated_organizations_are_valid(req in generators::arb_create_organization()) {
            prop_assert!(req.validate().is_ok());
        }

        #[test]
        fn prop_generated_members_are_valid(req in generators::arb_create_member()) {
            prop_assert!(req.validate().is_ok());
        }

        #[test]
        fn prop_invalid_age_always_rejected(age in generators::arb_invalid_age()) {
            let req = CreateMember { age: Some(age), ..fixtures::create_member("Ana", 30) };
            let violations = req.validate().expect_err("age out of range");
            let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
            prop_assert_eq!(fields, vec!["age"]);
        }
    }

    #[tokio::test]
    async fn test_recording_store_records_tracking_flags() {
        let (store, org, member) = fixtures::seeded_store();
        let recording = RecordingStore::new(Arc::new(store));

        recording
            .organization_get(org.id, true)
            .await
            .expect("lookup");
        recording
            .member_get(org.id, member.id, false)
            .await
            .expect("lookup");

        assert_eq!(recording.tracking_flags(), vec![true, false]);
        assert_eq!(recording.member_query_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_commits_never_reach_inner_store() {
        let (store, _, _) = fixtures::seeded_store();
        let recording = RecordingStore::new(Arc::new(store)).failing_commits();
        let result = recording
            .commit(ChangeSet {
                inserts: vec![roster_storage::EntityRecord::Organization(fixtures::acme())],
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(StoreError::Database { .. })));
        assert_eq!(recording.commit_count(), 0);
    }
}
