//! PostgreSQL EntityStore implementation.
//!
//! Connection pooling uses deadpool-postgres. Every commit runs inside a
//! single transaction so a failing statement rolls the whole change set back.

use crate::error::{StoreError, StoreResult};
use crate::record::{ChangeSet, EntityKey, EntityRecord};
use crate::store::EntityStore;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use roster_core::{EntityIdType, Member, MemberId, Organization, OrganizationId};
use std::time::Duration;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "roster".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("ROSTER_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("ROSTER_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("ROSTER_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("ROSTER_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("ROSTER_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("ROSTER_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("ROSTER_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StoreResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool {
                reason: format!("Failed to create pool: {}", e),
            })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS organizations (
    id UUID PRIMARY KEY,
    name VARCHAR(60) NOT NULL,
    address VARCHAR(60) NOT NULL,
    country VARCHAR(60)
);
CREATE TABLE IF NOT EXISTS members (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    name VARCHAR(30) NOT NULL,
    age INTEGER NOT NULL,
    position VARCHAR(20) NOT NULL
);
CREATE INDEX IF NOT EXISTS members_organization_id_idx ON members(organization_id);
";

fn organization_from_row(row: &Row) -> StoreResult<Organization> {
    Ok(Organization {
        id: OrganizationId::new(row.try_get::<_, Uuid>("id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        country: row.try_get("country")?,
    })
}

fn member_from_row(row: &Row) -> StoreResult<Member> {
    Ok(Member {
        id: MemberId::new(row.try_get::<_, Uuid>("id")?),
        organization_id: OrganizationId::new(row.try_get::<_, Uuid>("organization_id")?),
        name: row.try_get("name")?,
        age: row.try_get("age")?,
        position: row.try_get("position")?,
    })
}

// ============================================================================
// STORE
// ============================================================================

/// Entity store backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresEntityStore {
    pool: Pool,
}

impl PostgresEntityStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> StoreResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA).await?;
        Ok(())
    }
}

fn expect_one_row(affected: u64, key: EntityKey) -> StoreResult<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StoreError::NotFound {
            kind: key.kind(),
            id: key.id_string(),
        })
    }
}

#[async_trait::async_trait]
impl EntityStore for PostgresEntityStore {
    async fn organization_get(
        &self,
        id: OrganizationId,
        tracking: bool,
    ) -> StoreResult<Option<Organization>> {
        tracing::debug!(%id, tracking, "Loading organization");
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT id, name, address, country FROM organizations WHERE id = $1",
                &[&id.as_uuid()],
            )
            .await?;
        row.as_ref().map(organization_from_row).transpose()
    }

    async fn organization_get_many(
        &self,
        ids: &[OrganizationId],
        tracking: bool,
    ) -> StoreResult<Vec<Organization>> {
        tracing::debug!(count = ids.len(), tracking, "Loading organizations");
        let uuids: Vec<Uuid> = ids.iter().map(EntityIdType::as_uuid).collect();
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT id, name, address, country FROM organizations WHERE id = ANY($1) ORDER BY name, id",
                &[&uuids],
            )
            .await?;
        rows.iter().map(organization_from_row).collect()
    }

    async fn organization_list(&self, tracking: bool) -> StoreResult<Vec<Organization>> {
        tracing::debug!(tracking, "Listing organizations");
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT id, name, address, country FROM organizations ORDER BY name, id",
                &[],
            )
            .await?;
        rows.iter().map(organization_from_row).collect()
    }

    async fn member_get(
        &self,
        organization_id: OrganizationId,
        id: MemberId,
        tracking: bool,
    ) -> StoreResult<Option<Member>> {
        tracing::debug!(%organization_id, %id, tracking, "Loading member");
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT id, organization_id, name, age, position FROM members WHERE id = $1 AND organization_id = $2",
                &[&id.as_uuid(), &organization_id.as_uuid()],
            )
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn member_list_by_organization(
        &self,
        organization_id: OrganizationId,
        tracking: bool,
    ) -> StoreResult<Vec<Member>> {
        tracing::debug!(%organization_id, tracking, "Listing members");
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT id, organization_id, name, age, position FROM members WHERE organization_id = $1 ORDER BY name, id",
                &[&organization_id.as_uuid()],
            )
            .await?;
        rows.iter().map(member_from_row).collect()
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        let tx = conn.transaction().await?;

        let (orgs, members): (Vec<_>, Vec<_>) = changes
            .inserts
            .into_iter()
            .partition(|r| matches!(r, EntityRecord::Organization(_)));
        for record in orgs.into_iter().chain(members) {
            match record {
                EntityRecord::Organization(o) => {
                    tx.execute(
                        "INSERT INTO organizations (id, name, address, country) VALUES ($1, $2, $3, $4)",
                        &[&o.id.as_uuid(), &o.name, &o.address, &o.country],
                    )
                    .await?;
                }
                EntityRecord::Member(m) => {
                    tx.execute(
                        "INSERT INTO members (id, organization_id, name, age, position) VALUES ($1, $2, $3, $4, $5)",
                        &[&m.id.as_uuid(), &m.organization_id.as_uuid(), &m.name, &m.age, &m.position],
                    )
                    .await?;
                }
            }
        }

        for record in changes.updates {
            let key = record.key();
            let affected = match record {
                EntityRecord::Organization(o) => {
                    tx.execute(
                        "UPDATE organizations SET name = $2, address = $3, country = $4 WHERE id = $1",
                        &[&o.id.as_uuid(), &o.name, &o.address, &o.country],
                    )
                    .await?
                }
                EntityRecord::Member(m) => {
                    tx.execute(
                        "UPDATE members SET organization_id = $2, name = $3, age = $4, position = $5 WHERE id = $1",
                        &[&m.id.as_uuid(), &m.organization_id.as_uuid(), &m.name, &m.age, &m.position],
                    )
                    .await?
                }
            };
            expect_one_row(affected, key)?;
        }

        for key in changes.deletes {
            let affected = match key {
                EntityKey::Organization(id) => {
                    tx.execute("DELETE FROM organizations WHERE id = $1", &[&id.as_uuid()])
                        .await?
                }
                EntityKey::Member(id) => {
                    tx.execute("DELETE FROM members WHERE id = $1", &[&id.as_uuid()])
                        .await?
                }
            };
            expect_one_row(affected, key)?;
        }

        tx.commit().await?;
        tracing::debug!("Committed change set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::EntityKind;

    #[test]
    fn test_db_config_default() {
        let config = DbConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "roster");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_expect_one_row() {
        let key = EntityKey::Member(MemberId::now_v7());
        assert!(expect_one_row(1, key).is_ok());
        assert!(matches!(
            expect_one_row(0, key),
            Err(StoreError::NotFound {
                kind: EntityKind::Member,
                ..
            })
        ));
    }
}
