//! Entity records and change sets exchanged with the entity store.

use roster_core::{EntityIdType, EntityKind, Member, MemberId, Organization, OrganizationId};

/// Key identifying one stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Organization(OrganizationId),
    Member(MemberId),
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityKey::Organization(_) => EntityKind::Organization,
            EntityKey::Member(_) => EntityKind::Member,
        }
    }

    /// Raw id rendered for log lines and error messages.
    pub fn id_string(&self) -> String {
        match self {
            EntityKey::Organization(id) => id.to_string(),
            EntityKey::Member(id) => id.to_string(),
        }
    }
}

/// Full entity value carried by a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRecord {
    Organization(Organization),
    Member(Member),
}

impl EntityRecord {
    pub fn key(&self) -> EntityKey {
        match self {
            EntityRecord::Organization(o) => EntityKey::Organization(o.id),
            EntityRecord::Member(m) => EntityKey::Member(m.id),
        }
    }
}

/// A value the repository can hand out, track and persist.
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    type Id: EntityIdType;

    fn id(&self) -> Self::Id;

    fn key(&self) -> EntityKey;

    fn into_record(self) -> EntityRecord;
}

impl Entity for Organization {
    type Id = OrganizationId;

    fn id(&self) -> OrganizationId {
        self.id
    }

    fn key(&self) -> EntityKey {
        EntityKey::Organization(self.id)
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Organization(self)
    }
}

impl Entity for Member {
    type Id = MemberId;

    fn id(&self) -> MemberId {
        self.id
    }

    fn key(&self) -> EntityKey {
        EntityKey::Member(self.id)
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Member(self)
    }
}

/// Everything one flush commits.
///
/// Stores apply a change set atomically: inserts, then updates, then deletes.
/// Deleting an organization deletes its members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub inserts: Vec<EntityRecord>,
    pub updates: Vec<EntityRecord>,
    pub deletes: Vec<EntityKey>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Total number of staged operations.
    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }
}
