//! In-Memory Outbox Repository
//!
//! Reference implementation of the store semantics, used by tests and by
//! the development wiring. State is a plain map guarded by a mutex; query
//! results are sorted on the way out.

use crate::event::DomainEvent;
use crate::repository::OutboxRepository;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryOutboxRepository {
    events: Mutex<HashMap<String, DomainEvent>>,
}

impl InMemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a single event, for assertions.
    pub fn get(&self, id: &str) -> Option<DomainEvent> {
        self.events.lock().unwrap().get(id).cloned()
    }

    /// Snapshot of every stored event, unordered.
    pub fn all(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn save(&self, event: &DomainEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn get_all_unpublished_events(&self) -> Result<Vec<DomainEvent>> {
        let mut events: Vec<DomainEvent> = self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.is_unpublished())
            .cloned()
            .collect();
        events.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(events)
    }

    async fn get_all_failed_events(&self) -> Result<Vec<DomainEvent>> {
        let mut events: Vec<DomainEvent> = self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.is_retryable())
            .cloned()
            .collect();
        events.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(events)
    }
}
