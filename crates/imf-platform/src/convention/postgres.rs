//! PostgreSQL Convention Repository
//!
//! Conventions are written by subsystems outside this crate; here we only
//! read the activity signal the agency-closure scan needs.

use crate::convention::repository::ConventionRepository;
use crate::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::info;

pub struct PgConventionRepository {
    pool: PgPool,
}

impl PgConventionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the conventions table if it does not exist.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conventions (
                id TEXT PRIMARY KEY,
                agency_id TEXT NOT NULL,
                status TEXT NOT NULL,
                date_validation TIMESTAMPTZ
            );
            CREATE INDEX IF NOT EXISTS idx_conventions_agency ON conventions(agency_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Initialized conventions schema");
        Ok(())
    }
}

#[async_trait]
impl ConventionRepository for PgConventionRepository {
    async fn latest_validation_date_for_agency(
        &self,
        agency_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(date_validation) AS latest FROM conventions \
             WHERE agency_id = $1 AND status = 'acceptedByValidator'",
        )
        .bind(agency_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("latest"))
    }
}
