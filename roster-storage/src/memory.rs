//! In-memory EntityStore implementation.
//!
//! Tables live in HashMaps behind an RwLock. A commit is applied to a copy of
//! the tables and swapped in only when every operation succeeded, which gives
//! the same all-or-nothing behaviour as a database transaction.

use crate::error::{StoreError, StoreResult};
use crate::record::{ChangeSet, EntityKey, EntityRecord};
use crate::store::EntityStore;
use roster_core::{EntityKind, Member, MemberId, Organization, OrganizationId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
struct Tables {
    organizations: HashMap<OrganizationId, Organization>,
    members: HashMap<MemberId, Member>,
}

impl Tables {
    fn insert(&mut self, record: EntityRecord) -> StoreResult<()> {
        match record {
            EntityRecord::Organization(o) => {
                if self.organizations.contains_key(&o.id) {
                    return Err(StoreError::AlreadyExists {
                        kind: EntityKind::Organization,
                        id: o.id.to_string(),
                    });
                }
                self.organizations.insert(o.id, o);
            }
            EntityRecord::Member(m) => {
                if self.members.contains_key(&m.id) {
                    return Err(StoreError::AlreadyExists {
                        kind: EntityKind::Member,
                        id: m.id.to_string(),
                    });
                }
                self.check_owner(&m)?;
                self.members.insert(m.id, m);
            }
        }
        Ok(())
    }

    fn update(&mut self, record: EntityRecord) -> StoreResult<()> {
        match record {
            EntityRecord::Organization(o) => match self.organizations.get_mut(&o.id) {
                Some(slot) => *slot = o,
                None => {
                    return Err(StoreError::NotFound {
                        kind: EntityKind::Organization,
                        id: o.id.to_string(),
                    })
                }
            },
            EntityRecord::Member(m) => {
                self.check_owner(&m)?;
                match self.members.get_mut(&m.id) {
                    Some(slot) => *slot = m,
                    None => {
                        return Err(StoreError::NotFound {
                            kind: EntityKind::Member,
                            id: m.id.to_string(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, key: EntityKey) -> StoreResult<()> {
        let removed = match key {
            EntityKey::Organization(id) => {
                let removed = self.organizations.remove(&id).is_some();
                if removed {
                    self.members.retain(|_, m| m.organization_id != id);
                }
                removed
            }
            EntityKey::Member(id) => self.members.remove(&id).is_some(),
        };
        if removed {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                kind: key.kind(),
                id: key.id_string(),
            })
        }
    }

    fn check_owner(&self, member: &Member) -> StoreResult<()> {
        if self.organizations.contains_key(&member.organization_id) {
            Ok(())
        } else {
            Err(StoreError::InvalidReference {
                kind: EntityKind::Member,
                id: member.id.to_string(),
                reason: format!("organization {} does not exist", member.organization_id),
            })
        }
    }
}

/// In-memory entity store for tests and development.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryEntityStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with organizations and members.
    pub fn seeded(organizations: Vec<Organization>, members: Vec<Member>) -> StoreResult<Self> {
        let mut tables = Tables::default();
        for o in organizations {
            tables.insert(EntityRecord::Organization(o))?;
        }
        for m in members {
            tables.insert(EntityRecord::Member(m))?;
        }
        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
        })
    }

    /// Number of stored organizations.
    pub fn organization_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.organizations.len())
    }

    /// Number of stored members across all organizations.
    pub fn member_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.members.len())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait::async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn organization_get(
        &self,
        id: OrganizationId,
        _tracking: bool,
    ) -> StoreResult<Option<Organization>> {
        Ok(self.read()?.organizations.get(&id).cloned())
    }

    async fn organization_get_many(
        &self,
        ids: &[OrganizationId],
        _tracking: bool,
    ) -> StoreResult<Vec<Organization>> {
        let tables = self.read()?;
        let mut seen = std::collections::HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| tables.organizations.get(id).cloned())
            .collect())
    }

    async fn organization_list(&self, _tracking: bool) -> StoreResult<Vec<Organization>> {
        let mut all: Vec<Organization> = self.read()?.organizations.values().cloned().collect();
        all.sort_by(|a, b| (a.name.as_str(), a.id).cmp(&(b.name.as_str(), b.id)));
        Ok(all)
    }

    async fn member_get(
        &self,
        organization_id: OrganizationId,
        id: MemberId,
        _tracking: bool,
    ) -> StoreResult<Option<Member>> {
        Ok(self
            .read()?
            .members
            .get(&id)
            .filter(|m| m.organization_id == organization_id)
            .cloned())
    }

    async fn member_list_by_organization(
        &self,
        organization_id: OrganizationId,
        _tracking: bool,
    ) -> StoreResult<Vec<Member>> {
        let mut members: Vec<Member> = self
            .read()?
            .members
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| (a.name.as_str(), a.id).cmp(&(b.name.as_str(), b.id)));
        Ok(members)
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        let mut guard = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut staged = guard.clone();

        // Organizations first so members inserted alongside them resolve.
        let (orgs, members): (Vec<_>, Vec<_>) = changes
            .inserts
            .into_iter()
            .partition(|r| matches!(r, EntityRecord::Organization(_)));
        for record in orgs.into_iter().chain(members) {
            staged.insert(record)?;
        }
        for record in changes.updates {
            staged.update(record)?;
        }
        for key in changes.deletes {
            staged.delete(key)?;
        }

        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::EntityIdType;

    fn organization(name: &str) -> Organization {
        Organization {
            id: OrganizationId::now_v7(),
            name: name.to_string(),
            address: "1 Main St".to_string(),
            country: None,
        }
    }

    fn member(organization_id: OrganizationId, name: &str) -> Member {
        Member {
            id: MemberId::now_v7(),
            organization_id,
            name: name.to_string(),
            age: 30,
            position: "Engineer".to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_inserts_members_with_new_organization() {
        let store = InMemoryEntityStore::new();
        let org = organization("Acme");
        let changes = ChangeSet {
            inserts: vec![
                EntityRecord::Member(member(org.id, "Ana")),
                EntityRecord::Organization(org.clone()),
            ],
            ..Default::default()
        };
        store.commit(changes).await.expect("commit succeeds");
        let members = store
            .member_list_by_organization(org.id, false)
            .await
            .expect("list");
        assert_eq!(members.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_organization_cascades_to_members() {
        let org = organization("Acme");
        let other = organization("Globex");
        let store = InMemoryEntityStore::seeded(
            vec![org.clone(), other.clone()],
            vec![member(org.id, "Ana"), member(org.id, "Bo"), member(other.id, "Cy")],
        )
        .expect("seed");

        store
            .commit(ChangeSet {
                deletes: vec![EntityKey::Organization(org.id)],
                ..Default::default()
            })
            .await
            .expect("commit succeeds");

        assert_eq!(store.organization_count().expect("count"), 1);
        assert_eq!(store.member_count().expect("count"), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_tables_untouched() {
        let org = organization("Acme");
        let store = InMemoryEntityStore::seeded(vec![org.clone()], vec![]).expect("seed");

        let result = store
            .commit(ChangeSet {
                inserts: vec![EntityRecord::Organization(organization("Initech"))],
                deletes: vec![EntityKey::Member(MemberId::now_v7())],
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert_eq!(store.organization_count().expect("count"), 1);
    }

    #[tokio::test]
    async fn test_member_get_is_scoped_to_organization() {
        let org = organization("Acme");
        let other = organization("Globex");
        let m = member(org.id, "Ana");
        let store = InMemoryEntityStore::seeded(vec![org.clone(), other.clone()], vec![m.clone()])
            .expect("seed");

        assert!(store.member_get(org.id, m.id, false).await.expect("get").is_some());
        assert!(store.member_get(other.id, m.id, false).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_member_insert_requires_owner() {
        let store = InMemoryEntityStore::new();
        let result = store
            .commit(ChangeSet {
                inserts: vec![EntityRecord::Member(member(OrganizationId::now_v7(), "Ana"))],
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(StoreError::InvalidReference { .. })));
    }

    #[tokio::test]
    async fn test_list_ordered_by_name() {
        let store = InMemoryEntityStore::seeded(
            vec![organization("Zeta"), organization("Acme"), organization("Mu")],
            vec![],
        )
        .expect("seed");
        let names: Vec<_> = store
            .organization_list(false)
            .await
            .expect("list")
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["Acme", "Mu", "Zeta"]);
    }

    #[tokio::test]
    async fn test_get_many_skips_unknown_and_duplicates() {
        let a = organization("Acme");
        let store = InMemoryEntityStore::seeded(vec![a.clone()], vec![]).expect("seed");
        let found = store
            .organization_get_many(&[a.id, a.id, OrganizationId::now_v7()], false)
            .await
            .expect("get many");
        assert_eq!(found, vec![a]);
    }
}
