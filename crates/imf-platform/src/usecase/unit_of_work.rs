//! Unit of Work
//!
//! Atomic commit of aggregate state changes and the domain events that
//! describe them. This is the ONLY way to create a successful
//! `UseCaseResult`: `UseCaseResult::success()` is crate-private, so use
//! cases must go through the unit of work to report success, which
//! guarantees events are always appended to the outbox whenever state
//! changes, and that a failed invariant check leaves prior state
//! untouched.

use async_trait::async_trait;
use imf_outbox::DomainEvent;
use tracing::{debug, error};

use super::error::UseCaseError;
use super::result::UseCaseResult;
use crate::agency::entity::Agency;
use crate::user::entity::User;
use imf_common::UserId;

/// One aggregate mutation to apply inside the commit.
#[derive(Debug, Clone)]
pub enum AggregateChange {
    SaveAgency(Agency),
    SaveUser(User),
    DeleteUser(UserId),
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Apply every change and append every event atomically. Returns the
    /// committed events on success; any failure rolls the whole batch
    /// back and surfaces as a `CommitError`.
    async fn commit(
        &self,
        changes: Vec<AggregateChange>,
        events: Vec<DomainEvent>,
    ) -> UseCaseResult<Vec<DomainEvent>>;
}

/// PostgreSQL unit of work: one transaction spanning the aggregate tables
/// and the outbox.
#[cfg(feature = "postgres")]
pub struct PgUnitOfWork {
    pool: sqlx::PgPool,
    outbox_tables: imf_outbox::OutboxTableConfig,
}

#[cfg(feature = "postgres")]
impl PgUnitOfWork {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            outbox_tables: imf_outbox::OutboxTableConfig::default(),
        }
    }

    pub fn with_outbox_tables(
        pool: sqlx::PgPool,
        outbox_tables: imf_outbox::OutboxTableConfig,
    ) -> Self {
        Self {
            pool,
            outbox_tables,
        }
    }

    async fn commit_inner(
        &self,
        changes: &[AggregateChange],
        events: &[DomainEvent],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for change in changes {
            match change {
                AggregateChange::SaveAgency(agency) => {
                    crate::agency::postgres::save_agency_tx(&mut tx, agency).await?;
                }
                AggregateChange::SaveUser(user) => {
                    crate::user::postgres::save_user_tx(&mut tx, user).await?;
                }
                AggregateChange::DeleteUser(user_id) => {
                    crate::user::postgres::delete_user_tx(&mut tx, user_id).await?;
                }
            }
        }

        for event in events {
            imf_outbox::PostgresOutboxRepository::insert_event_tx(
                &mut tx,
                &self.outbox_tables,
                event,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(
        &self,
        changes: Vec<AggregateChange>,
        events: Vec<DomainEvent>,
    ) -> UseCaseResult<Vec<DomainEvent>> {
        match self.commit_inner(&changes, &events).await {
            Ok(()) => {
                debug!(
                    changes = changes.len(),
                    events = events.len(),
                    "Committed unit of work"
                );
                UseCaseResult::success(events)
            }
            Err(e) => {
                error!(error = %e, "Unit of work commit failed");
                UseCaseResult::failure(UseCaseError::commit(e.to_string()))
            }
        }
    }
}

/// In-memory unit of work backed by the in-memory repositories.
///
/// Applies changes sequentially without rollback; use cases validate
/// before committing so this is sufficient for tests and development.
pub struct InMemoryUnitOfWork {
    pub agencies: std::sync::Arc<crate::agency::repository::InMemoryAgencyRepository>,
    pub users: std::sync::Arc<crate::user::repository::InMemoryUserRepository>,
    pub outbox: std::sync::Arc<imf_outbox::InMemoryOutboxRepository>,
}

impl InMemoryUnitOfWork {
    pub fn new(
        agencies: std::sync::Arc<crate::agency::repository::InMemoryAgencyRepository>,
        users: std::sync::Arc<crate::user::repository::InMemoryUserRepository>,
        outbox: std::sync::Arc<imf_outbox::InMemoryOutboxRepository>,
    ) -> Self {
        Self {
            agencies,
            users,
            outbox,
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(
        &self,
        changes: Vec<AggregateChange>,
        events: Vec<DomainEvent>,
    ) -> UseCaseResult<Vec<DomainEvent>> {
        use imf_outbox::OutboxRepository;

        for change in changes {
            match change {
                AggregateChange::SaveAgency(agency) => self.agencies.insert(agency),
                AggregateChange::SaveUser(user) => self.users.insert(user),
                AggregateChange::DeleteUser(user_id) => {
                    self.users.delete(&user_id);
                }
            }
        }

        for event in &events {
            if let Err(e) = self.outbox.save(event).await {
                return UseCaseResult::failure(UseCaseError::commit(e.to_string()));
            }
        }

        UseCaseResult::success(events)
    }
}
