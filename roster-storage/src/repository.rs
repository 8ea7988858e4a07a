//! Repository facade and unit of work.
//!
//! A [`RepositoryManager`] lives for one request. It exposes one repository per
//! entity type and a single [`RepositoryManager::save`] that flushes every
//! staged insert, delete and tracked modification as one store commit.

use crate::error::{RepositoryError, RepositoryResult, StoreError};
use crate::handle::{EntityHandle, FetchMode, Tracked, TrackedCell, TrackedEntry};
use crate::record::{ChangeSet, Entity, EntityKey, EntityRecord};
use crate::store::EntityStore;
use roster_core::{Member, MemberId, Organization, OrganizationId};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ============================================================================
// UNIT OF WORK
// ============================================================================

struct TrackedSlot {
    entry: Arc<dyn TrackedEntry>,
    cell: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct UnitState {
    /// Identity map of tracked entities.
    tracked: HashMap<EntityKey, TrackedSlot>,
    inserts: Vec<EntityRecord>,
    deletes: Vec<EntityKey>,
}

/// Pending changes of one request.
#[derive(Default)]
pub struct UnitOfWork {
    state: Mutex<UnitState>,
}

impl UnitOfWork {
    fn lock(&self) -> MutexGuard<'_, UnitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a loaded entity for change tracking.
    ///
    /// A second fetch of the same entity returns the handle already tracked,
    /// including any unsaved modifications.
    pub(crate) fn track<E: Entity>(&self, entity: E) -> Tracked<E> {
        let key = entity.key();
        let mut state = self.lock();
        if let Some(slot) = state.tracked.get(&key) {
            if let Ok(cell) = Arc::clone(&slot.cell).downcast::<TrackedCell<E>>() {
                return Tracked::from_cell(cell);
            }
        }
        let cell = Arc::new(TrackedCell::new(entity));
        state.tracked.insert(
            key,
            TrackedSlot {
                entry: cell.clone(),
                cell: cell.clone(),
            },
        );
        Tracked::from_cell(cell)
    }

    fn stage_insert(&self, record: EntityRecord) {
        self.lock().inserts.push(record);
    }

    fn stage_delete(&self, key: EntityKey) {
        let mut state = self.lock();
        state.tracked.remove(&key);

        let before = state.inserts.len();
        state.inserts.retain(|r| r.key() != key);
        if state.inserts.len() != before {
            // Never persisted: drop the insert (and, for an organization, the
            // members staged with it) instead of deleting.
            if let EntityKey::Organization(id) = key {
                state
                    .inserts
                    .retain(|r| !matches!(r, EntityRecord::Member(m) if m.organization_id == id));
            }
            return;
        }
        if !state.deletes.contains(&key) {
            state.deletes.push(key);
        }
    }

    fn has_changes(&self) -> RepositoryResult<bool> {
        let state = self.lock();
        if !state.inserts.is_empty() || !state.deletes.is_empty() {
            return Ok(true);
        }
        for slot in state.tracked.values() {
            if slot.entry.pending()?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Collect everything pending into a change set, leaving state intact.
    fn change_set(&self) -> RepositoryResult<(ChangeSet, Vec<Arc<dyn TrackedEntry>>)> {
        let state = self.lock();
        let deleted: HashSet<EntityKey> = state.deletes.iter().copied().collect();

        let mut updates = Vec::new();
        let mut entries = Vec::with_capacity(state.tracked.len());
        for slot in state.tracked.values() {
            entries.push(Arc::clone(&slot.entry));
            let Some(record) = slot.entry.pending()? else {
                continue;
            };
            let owner_deleted = matches!(
                &record,
                EntityRecord::Member(m) if deleted.contains(&EntityKey::Organization(m.organization_id))
            );
            if !owner_deleted && !deleted.contains(&record.key()) {
                updates.push(record);
            }
        }

        let changes = ChangeSet {
            inserts: state.inserts.clone(),
            updates,
            deletes: state.deletes.clone(),
        };
        Ok((changes, entries))
    }

    fn committed(&self, changes: &ChangeSet, entries: &[Arc<dyn TrackedEntry>]) {
        let inserted: HashSet<EntityKey> = changes.inserts.iter().map(EntityRecord::key).collect();
        let mut state = self.lock();
        state.inserts.retain(|r| !inserted.contains(&r.key()));
        state.deletes.retain(|k| !changes.deletes.contains(k));
        for entry in entries {
            entry.accept();
        }
    }
}

// ============================================================================
// REPOSITORY MANAGER
// ============================================================================

/// Per-request access point to every repository.
pub struct RepositoryManager {
    store: Arc<dyn EntityStore>,
    uow: UnitOfWork,
}

impl RepositoryManager {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            uow: UnitOfWork::default(),
        }
    }

    pub fn organizations(&self) -> OrganizationRepository<'_> {
        OrganizationRepository { manager: self }
    }

    pub fn members(&self) -> MemberRepository<'_> {
        MemberRepository { manager: self }
    }

    /// Whether a save would write anything.
    pub fn has_pending_changes(&self) -> RepositoryResult<bool> {
        self.uow.has_changes()
    }

    /// Flush all pending changes as one commit.
    ///
    /// Returns the number of operations written. On failure nothing is
    /// committed and the pending changes are kept.
    pub async fn save(&self) -> RepositoryResult<usize> {
        let (changes, entries) = self.uow.change_set()?;
        if changes.is_empty() {
            tracing::debug!("No pending changes to save");
            return Ok(0);
        }

        let count = changes.len();
        tracing::debug!(
            inserts = changes.inserts.len(),
            updates = changes.updates.len(),
            deletes = changes.deletes.len(),
            "Saving changes"
        );
        self.store
            .commit(changes.clone())
            .await
            .map_err(RepositoryError::Persistence)?;

        self.uow.committed(&changes, &entries);
        Ok(count)
    }

    fn attach_all<M: FetchMode, E: Entity>(&self, entities: Vec<E>) -> Vec<M::Handle<E>> {
        entities
            .into_iter()
            .map(|e| M::attach(&self.uow, e))
            .collect()
    }
}

fn lookup(err: StoreError) -> RepositoryError {
    RepositoryError::Lookup(err)
}

// ============================================================================
// ORGANIZATION REPOSITORY
// ============================================================================

/// Organization access scoped to one [`RepositoryManager`].
pub struct OrganizationRepository<'a> {
    manager: &'a RepositoryManager,
}

impl OrganizationRepository<'_> {
    pub async fn get<M: FetchMode>(
        &self,
        id: OrganizationId,
    ) -> RepositoryResult<Option<M::Handle<Organization>>> {
        let found = self
            .manager
            .store
            .organization_get(id, M::TRACKING)
            .await
            .map_err(lookup)?;
        Ok(found.map(|o| M::attach(&self.manager.uow, o)))
    }

    /// Fetch several organizations. Unknown ids are skipped.
    pub async fn get_many<M: FetchMode>(
        &self,
        ids: &[OrganizationId],
    ) -> RepositoryResult<Vec<M::Handle<Organization>>> {
        let found = self
            .manager
            .store
            .organization_get_many(ids, M::TRACKING)
            .await
            .map_err(lookup)?;
        Ok(self.manager.attach_all::<M, _>(found))
    }

    pub async fn list<M: FetchMode>(&self) -> RepositoryResult<Vec<M::Handle<Organization>>> {
        let found = self
            .manager
            .store
            .organization_list(M::TRACKING)
            .await
            .map_err(lookup)?;
        Ok(self.manager.attach_all::<M, _>(found))
    }

    /// Stage a new organization. Written on the next save.
    pub fn create(&self, organization: Organization) -> OrganizationId {
        let id = organization.id;
        self.manager
            .uow
            .stage_insert(EntityRecord::Organization(organization));
        id
    }

    /// Stage deletion of an organization and, through the store, its members.
    pub fn delete(&self, organization: &impl EntityHandle<Organization>) {
        self.manager
            .uow
            .stage_delete(EntityKey::Organization(organization.id()));
    }
}

// ============================================================================
// MEMBER REPOSITORY
// ============================================================================

/// Member access scoped to one [`RepositoryManager`].
pub struct MemberRepository<'a> {
    manager: &'a RepositoryManager,
}

impl MemberRepository<'_> {
    /// Fetch a member of an organization.
    pub async fn get<M: FetchMode>(
        &self,
        organization_id: OrganizationId,
        id: MemberId,
    ) -> RepositoryResult<Option<M::Handle<Member>>> {
        let found = self
            .manager
            .store
            .member_get(organization_id, id, M::TRACKING)
            .await
            .map_err(lookup)?;
        Ok(found.map(|m| M::attach(&self.manager.uow, m)))
    }

    pub async fn list<M: FetchMode>(
        &self,
        organization_id: OrganizationId,
    ) -> RepositoryResult<Vec<M::Handle<Member>>> {
        let found = self
            .manager
            .store
            .member_list_by_organization(organization_id, M::TRACKING)
            .await
            .map_err(lookup)?;
        Ok(self.manager.attach_all::<M, _>(found))
    }

    /// Stage a new member of `organization_id`.
    pub fn create(&self, organization_id: OrganizationId, mut member: Member) -> MemberId {
        member.organization_id = organization_id;
        let id = member.id;
        self.manager.uow.stage_insert(EntityRecord::Member(member));
        id
    }

    pub fn delete(&self, member: &impl EntityHandle<Member>) {
        self.manager.uow.stage_delete(EntityKey::Member(member.id()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Detached, Tracking};
    use crate::memory::InMemoryEntityStore;
    use roster_core::EntityIdType;

    fn organization(name: &str) -> Organization {
        Organization {
            id: OrganizationId::now_v7(),
            name: name.to_string(),
            address: "1 Main St".to_string(),
            country: Some("USA".to_string()),
        }
    }

    fn member(organization_id: OrganizationId, name: &str, age: i32) -> Member {
        Member {
            id: MemberId::now_v7(),
            organization_id,
            name: name.to_string(),
            age,
            position: "Engineer".to_string(),
        }
    }

    fn seeded() -> (InMemoryEntityStore, Organization, Member) {
        let org = organization("Acme");
        let m = member(org.id, "Ana", 30);
        let store =
            InMemoryEntityStore::seeded(vec![org.clone()], vec![m.clone()]).expect("seed store");
        (store, org, m)
    }

    #[tokio::test]
    async fn test_tracked_modification_is_saved() {
        let (store, org, m) = seeded();
        let repos = RepositoryManager::new(Arc::new(store.clone()));

        let tracked = repos
            .members()
            .get::<Tracking>(org.id, m.id)
            .await
            .expect("lookup")
            .expect("member exists");
        tracked.modify(|m| m.age = 31);
        assert!(repos.has_pending_changes().expect("pending"));

        assert_eq!(repos.save().await.expect("save"), 1);
        assert!(!tracked.is_dirty());

        let stored = store
            .member_get(org.id, m.id, false)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(stored.age, 31);
    }

    #[tokio::test]
    async fn test_detached_reads_never_flush() {
        let (store, org, _) = seeded();
        let repos = RepositoryManager::new(Arc::new(store));

        let snapshot = repos
            .organizations()
            .get::<Detached>(org.id)
            .await
            .expect("lookup")
            .expect("exists");
        let mut copy = snapshot.into_inner();
        copy.name = "Changed".to_string();

        assert!(!repos.has_pending_changes().expect("pending"));
        assert_eq!(repos.save().await.expect("save"), 0);
    }

    #[tokio::test]
    async fn test_tracked_refetch_returns_same_handle() {
        let (store, org, _) = seeded();
        let repos = RepositoryManager::new(Arc::new(store));
        let first = repos
            .organizations()
            .get::<Tracking>(org.id)
            .await
            .expect("lookup")
            .expect("exists");
        first.modify(|o| o.name = "Acme Corp".to_string());

        let second = repos
            .organizations()
            .get::<Tracking>(org.id)
            .await
            .expect("lookup")
            .expect("exists");
        assert!(first.ptr_eq(&second));
        assert_eq!(second.get().name, "Acme Corp");
    }

    #[tokio::test]
    async fn test_create_then_save_inserts() {
        let store = InMemoryEntityStore::new();
        let repos = RepositoryManager::new(Arc::new(store.clone()));
        let org = organization("Initech");
        let org_id = repos.organizations().create(org);
        repos
            .members()
            .create(org_id, member(OrganizationId::now_v7(), "Peter", 33));

        assert_eq!(repos.save().await.expect("save"), 2);
        let members = store
            .member_list_by_organization(org_id, false)
            .await
            .expect("list");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].organization_id, org_id);
    }

    #[tokio::test]
    async fn test_delete_of_staged_insert_cancels_both() {
        let store = InMemoryEntityStore::new();
        let repos = RepositoryManager::new(Arc::new(store.clone()));
        let org = organization("Initech");
        let id = repos.organizations().create(org.clone());
        repos.members().create(id, member(id, "Peter", 33));

        let handle = Detached::attach(&repos.uow, org);
        repos.organizations().delete(&handle);

        assert!(!repos.has_pending_changes().expect("pending"));
        assert_eq!(store.organization_count().expect("count"), 0);
    }

    #[tokio::test]
    async fn test_updates_to_deleted_entities_are_dropped() {
        let (store, org, m) = seeded();
        let repos = RepositoryManager::new(Arc::new(store.clone()));
        let tracked_member = repos
            .members()
            .get::<Tracking>(org.id, m.id)
            .await
            .expect("lookup")
            .expect("exists");
        tracked_member.modify(|m| m.position = "Lead".to_string());

        let tracked_org = repos
            .organizations()
            .get::<Tracking>(org.id)
            .await
            .expect("lookup")
            .expect("exists");
        repos.organizations().delete(&tracked_org);

        assert_eq!(repos.save().await.expect("save"), 1);
        assert_eq!(store.member_count().expect("count"), 0);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_pending_changes() {
        let (store, org, _) = seeded();
        let repos = RepositoryManager::new(Arc::new(store.clone()));
        let ghost = Detached::attach(&repos.uow, member(org.id, "Ghost", 40));
        repos.members().delete(&ghost);

        let err = repos.save().await.expect_err("unknown member");
        assert!(matches!(
            err,
            RepositoryError::Persistence(StoreError::NotFound { .. })
        ));
        assert!(repos.has_pending_changes().expect("pending"));
    }

    #[tokio::test]
    async fn test_identity_change_is_rejected() {
        let (store, org, _) = seeded();
        let repos = RepositoryManager::new(Arc::new(store));
        let tracked = repos
            .organizations()
            .get::<Tracking>(org.id)
            .await
            .expect("lookup")
            .expect("exists");
        tracked.modify(|o| o.id = OrganizationId::now_v7());

        assert!(matches!(
            repos.save().await,
            Err(RepositoryError::IdentityChanged { .. })
        ));
    }
}
