//! Roster Storage - Entity Store, Repositories and Unit of Work
//!
//! The [`EntityStore`] trait is the persistence gateway, with an in-memory and
//! a PostgreSQL implementation. On top of it, [`RepositoryManager`] offers
//! per-entity repositories whose reads are either detached snapshots or
//! change-tracked handles, and a single save that commits everything pending.

pub mod error;
pub mod handle;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod repository;
pub mod store;

pub use error::{RepositoryError, RepositoryResult, StoreError, StoreResult};
pub use handle::{Detached, EntityHandle, FetchMode, Snapshot, Tracked, Tracking};
pub use memory::InMemoryEntityStore;
pub use postgres::{DbConfig, PostgresEntityStore};
pub use record::{ChangeSet, Entity, EntityKey, EntityRecord};
pub use repository::{MemberRepository, OrganizationRepository, RepositoryManager, UnitOfWork};
pub use store::EntityStore;
