//! PostgreSQL Outbox Repository Implementation
//!
//! Events live in one table; publication attempts live in an append-only
//! child table keyed by (event_id, attempt). `save` inserts the event row
//! once and appends any attempts not yet persisted, so re-saving the full
//! event is idempotent and concurrent appends conflict on the primary key
//! instead of silently overwriting history.

use crate::event::{DomainEvent, EventPayload, EventPublication, PublicationFailure};
use crate::repository::OutboxRepository;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use tracing::{debug, info};

/// Table names for the outbox schema.
#[derive(Debug, Clone)]
pub struct OutboxTableConfig {
    pub events_table: String,
    pub publications_table: String,
}

impl Default for OutboxTableConfig {
    fn default() -> Self {
        Self {
            events_table: "outbox_events".to_string(),
            publications_table: "outbox_event_publications".to_string(),
        }
    }
}

pub struct PostgresOutboxRepository {
    pool: PgPool,
    table_config: OutboxTableConfig,
}

impl PostgresOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table_config: OutboxTableConfig::default(),
        }
    }

    pub fn with_config(pool: PgPool, table_config: OutboxTableConfig) -> Self {
        Self { pool, table_config }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    pub async fn init_schema(&self) -> Result<()> {
        let schema = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {events} (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                payload JSONB NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                was_quarantined BOOLEAN NOT NULL DEFAULT FALSE
            );
            CREATE INDEX IF NOT EXISTS idx_{events_ix}_occurred_at ON {events}(occurred_at);
            CREATE TABLE IF NOT EXISTS {pubs} (
                event_id TEXT NOT NULL REFERENCES {events}(id),
                attempt INTEGER NOT NULL,
                published_at TIMESTAMPTZ NOT NULL,
                failures JSONB NOT NULL DEFAULT '[]',
                PRIMARY KEY (event_id, attempt)
            );
            "#,
            events = self.table_config.events_table,
            events_ix = self.table_config.events_table.replace('.', "_"),
            pubs = self.table_config.publications_table,
        );

        sqlx::query(&schema).execute(&self.pool).await?;

        info!(
            events_table = %self.table_config.events_table,
            publications_table = %self.table_config.publications_table,
            "Initialized PostgreSQL outbox schema"
        );

        Ok(())
    }

    /// Insert an event and its publication history inside an open
    /// transaction. Shared with the platform unit of work so use cases can
    /// persist aggregates and events atomically.
    pub async fn insert_event_tx(
        tx: &mut Transaction<'_, Postgres>,
        table_config: &OutboxTableConfig,
        event: &DomainEvent,
    ) -> Result<()> {
        let payload_json = serde_json::to_string(&event.payload)?;

        let insert_event = format!(
            "INSERT INTO {} (id, topic, payload, occurred_at, was_quarantined) \
             VALUES ($1, $2, $3::jsonb, $4, $5) ON CONFLICT (id) DO NOTHING",
            table_config.events_table
        );
        sqlx::query(&insert_event)
            .bind(&event.id)
            .bind(event.topic().as_str())
            .bind(&payload_json)
            .bind(event.occurred_at)
            .bind(event.was_quarantined)
            .execute(&mut **tx)
            .await?;

        let insert_publication = format!(
            "INSERT INTO {} (event_id, attempt, published_at, failures) \
             VALUES ($1, $2, $3, $4::jsonb) ON CONFLICT (event_id, attempt) DO NOTHING",
            table_config.publications_table
        );
        for (attempt, publication) in event.publications.iter().enumerate() {
            let failures_json = serde_json::to_string(&publication.failures)?;
            sqlx::query(&insert_publication)
                .bind(&event.id)
                .bind(attempt as i32)
                .bind(publication.published_at)
                .bind(&failures_json)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Result<DomainEvent> {
        let payload_json: String = row.get("payload");
        let payload: EventPayload = serde_json::from_str(&payload_json)?;
        let occurred_at: DateTime<Utc> = row.get("occurred_at");

        Ok(DomainEvent {
            id: row.get("id"),
            occurred_at,
            payload,
            publications: Vec::new(),
            was_quarantined: row.get("was_quarantined"),
        })
    }

    /// Load the full publication history for a set of events.
    async fn load_publications(
        &self,
        event_ids: &[String],
    ) -> Result<HashMap<String, Vec<EventPublication>>> {
        if event_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = format!(
            "SELECT event_id, published_at, failures::text AS failures \
             FROM {} WHERE event_id = ANY($1) ORDER BY event_id, attempt ASC",
            self.table_config.publications_table
        );

        let rows = sqlx::query(&query)
            .bind(event_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut publications: HashMap<String, Vec<EventPublication>> = HashMap::new();
        for row in &rows {
            let event_id: String = row.get("event_id");
            let failures_json: String = row.get("failures");
            let failures: Vec<PublicationFailure> = serde_json::from_str(&failures_json)?;
            publications.entry(event_id).or_default().push(EventPublication {
                published_at: row.get("published_at"),
                failures,
            });
        }

        Ok(publications)
    }

    async fn hydrate(&self, rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<DomainEvent>> {
        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            events.push(Self::parse_row(row)?);
        }

        let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
        let mut publications = self.load_publications(&ids).await?;
        for event in &mut events {
            if let Some(history) = publications.remove(&event.id) {
                event.publications = history;
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl OutboxRepository for PostgresOutboxRepository {
    async fn save(&self, event: &DomainEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_event_tx(&mut tx, &self.table_config, event).await?;
        tx.commit().await?;

        debug!(
            event_id = %event.id,
            topic = %event.topic(),
            attempts = event.publications.len(),
            "Saved outbox event"
        );

        Ok(())
    }

    async fn get_all_unpublished_events(&self) -> Result<Vec<DomainEvent>> {
        let query = format!(
            "SELECT e.id, e.payload::text AS payload, e.occurred_at, e.was_quarantined \
             FROM {events} e \
             WHERE e.was_quarantined = FALSE \
               AND NOT EXISTS (SELECT 1 FROM {pubs} p WHERE p.event_id = e.id) \
             ORDER BY e.occurred_at ASC",
            events = self.table_config.events_table,
            pubs = self.table_config.publications_table,
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn get_all_failed_events(&self) -> Result<Vec<DomainEvent>> {
        // The last attempt decides: a clean retry supersedes earlier failures.
        let query = format!(
            "SELECT e.id, e.payload::text AS payload, e.occurred_at, e.was_quarantined \
             FROM {events} e \
             JOIN {pubs} last ON last.event_id = e.id \
              AND last.attempt = (SELECT MAX(p.attempt) FROM {pubs} p WHERE p.event_id = e.id) \
             WHERE e.was_quarantined = FALSE \
               AND jsonb_array_length(last.failures) > 0 \
             ORDER BY e.occurred_at ASC",
            events = self.table_config.events_table,
            pubs = self.table_config.publications_table,
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_config_default() {
        let config = OutboxTableConfig::default();
        assert_eq!(config.events_table, "outbox_events");
        assert_eq!(config.publications_table, "outbox_event_publications");
    }
}
