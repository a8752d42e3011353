//! Use Case Infrastructure
//!
//! Provides the foundational patterns for implementing use cases:
//! - `UseCaseResult` - sealed result type for use case outcomes
//! - `UseCaseError` - categorized error types for consistent handling
//! - `UnitOfWork` - atomic commit of aggregate changes + outbox events

pub mod error;
pub mod result;
pub mod unit_of_work;

pub use error::UseCaseError;
pub use result::UseCaseResult;
pub use unit_of_work::{AggregateChange, InMemoryUnitOfWork, UnitOfWork};

#[cfg(feature = "postgres")]
pub use unit_of_work::PgUnitOfWork;
