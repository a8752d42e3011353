//! Outbox Repository Trait
//!
//! Persistence contract for the event outbox. Storage-layer errors
//! propagate unchanged; all business semantics (delivery state,
//! quarantine) live in the query contracts below.

use crate::event::DomainEvent;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Upsert an event by id. Used both for brand-new events and for
    /// appending publication attempts: the caller re-saves the full event
    /// with its extended `publications` history and the store appends the
    /// new attempts.
    async fn save(&self, event: &DomainEvent) -> Result<()>;

    /// Events with zero publication attempts, excluding quarantined ones,
    /// ordered by `occurred_at` ascending (oldest first, preserving causal
    /// ordering for consumers that care).
    async fn get_all_unpublished_events(&self) -> Result<Vec<DomainEvent>>;

    /// Events whose last publication attempt has at least one failure,
    /// excluding quarantined events and events whose last attempt
    /// succeeded (a successful retry supersedes earlier failures).
    /// Ordered by `occurred_at` ascending.
    async fn get_all_failed_events(&self) -> Result<Vec<DomainEvent>>;
}
