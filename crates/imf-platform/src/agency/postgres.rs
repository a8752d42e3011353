//! PostgreSQL Agency Repository
//!
//! The rights map is stored as a JSONB column on the agency row: rights
//! mutations always rewrite the whole map inside the owning transaction,
//! which matches the aggregate boundary (one agency, one row).

use crate::agency::entity::{Agency, AgencyStatus, UserRight};
use crate::agency::repository::AgencyRepository;
use crate::shared::{PlatformError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::BTreeMap;
use tracing::info;

/// Insert or update an agency row inside an open transaction. Shared with
/// the unit of work.
pub async fn save_agency_tx(
    tx: &mut Transaction<'_, Postgres>,
    agency: &Agency,
) -> anyhow::Result<()> {
    let rights_json = serde_json::to_string(&agency.users_rights)?;

    sqlx::query(
        "INSERT INTO agencies (id, name, status, refers_to_agency_id, users_rights, created_at) \
         VALUES ($1, $2, $3, $4, $5::jsonb, $6) \
         ON CONFLICT (id) DO UPDATE SET \
           name = EXCLUDED.name, \
           status = EXCLUDED.status, \
           refers_to_agency_id = EXCLUDED.refers_to_agency_id, \
           users_rights = EXCLUDED.users_rights",
    )
    .bind(&agency.id)
    .bind(&agency.name)
    .bind(agency.status.as_str())
    .bind(&agency.refers_to_agency_id)
    .bind(&rights_json)
    .bind(agency.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub struct PgAgencyRepository {
    pool: PgPool,
}

impl PgAgencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the agencies table if it does not exist.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agencies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                refers_to_agency_id TEXT,
                users_rights JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_agencies_status ON agencies(status);
            CREATE INDEX IF NOT EXISTS idx_agencies_refers_to ON agencies(refers_to_agency_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Initialized agencies schema");
        Ok(())
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Result<Agency> {
        let status_str: String = row.get("status");
        let status = AgencyStatus::parse(&status_str).ok_or_else(|| {
            PlatformError::internal(format!("unknown agency status '{}'", status_str))
        })?;

        let rights_json: String = row.get("users_rights");
        let users_rights: BTreeMap<String, UserRight> = serde_json::from_str(&rights_json)?;
        let created_at: DateTime<Utc> = row.get("created_at");

        Ok(Agency {
            id: row.get("id"),
            name: row.get("name"),
            status,
            refers_to_agency_id: row.get("refers_to_agency_id"),
            users_rights,
            created_at,
        })
    }

    async fn fetch_where(&self, clause: &str, bind: &str) -> Result<Vec<Agency>> {
        let query = format!(
            "SELECT id, name, status, refers_to_agency_id, users_rights::text AS users_rights, \
             created_at FROM agencies WHERE {} ORDER BY id",
            clause
        );
        let rows = sqlx::query(&query).bind(bind).fetch_all(&self.pool).await?;
        rows.iter().map(Self::parse_row).collect()
    }
}

#[async_trait]
impl AgencyRepository for PgAgencyRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<Agency>> {
        let row = sqlx::query(
            "SELECT id, name, status, refers_to_agency_id, users_rights::text AS users_rights, \
             created_at FROM agencies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn get_all_active(&self) -> Result<Vec<Agency>> {
        self.fetch_where("status = $1", AgencyStatus::Active.as_str())
            .await
    }

    async fn get_children(&self, parent_id: &str) -> Result<Vec<Agency>> {
        self.fetch_where("refers_to_agency_id = $1", parent_id).await
    }

    async fn get_agencies_with_rights_for_user(&self, user_id: &str) -> Result<Vec<Agency>> {
        self.fetch_where("jsonb_exists(users_rights, $1)", user_id)
            .await
    }
}
