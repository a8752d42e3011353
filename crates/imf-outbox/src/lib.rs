pub mod crawler;
pub mod event;
pub mod factory;
pub mod memory;
pub mod repository;
pub mod webhook;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export key types
pub use crawler::{CrawlReport, EventCrawler, EventSubscriber, SubscriberRegistry};
pub use event::{
    DomainEvent, EventPayload, EventPublication, EventTopic, PublicationFailure,
};
pub use factory::{quarantine_set, EventFactory};
pub use memory::InMemoryOutboxRepository;
pub use repository::OutboxRepository;
pub use webhook::{WebhookConfig, WebhookSubscriber};

#[cfg(feature = "postgres")]
pub use postgres::{OutboxTableConfig, PostgresOutboxRepository};
