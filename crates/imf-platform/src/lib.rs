//! Immersion Facilitée Platform
//!
//! Core platform providing:
//! - Agency lifecycle (review, activation, rejection, automatic closure)
//! - Per-agency user rights with notification invariants
//! - OAuth identity-conflict resolution (account merging)
//! - Use Case pattern committing aggregates and outbox events atomically
//!
//! ## Module Organization (Aggregate-based)
//!
//! Each aggregate contains:
//! - `entity` - Domain entities
//! - `repository` - Data access
//! - `operations` - Use case operations (where applicable)
//! - `postgres` - PostgreSQL repositories (feature-gated)

// Core aggregates
pub mod agency;
pub mod convention;
pub mod user;

// Shared infrastructure
pub mod shared;

// Cross-cutting concerns
pub mod usecase;

// Re-export common types from shared
pub use shared::error::{PlatformError, Result};

// Re-export use case infrastructure
pub use usecase::{
    AggregateChange, InMemoryUnitOfWork, UnitOfWork, UseCaseError, UseCaseResult,
};
#[cfg(feature = "postgres")]
pub use usecase::PgUnitOfWork;
// Note: details! macro is automatically exported at crate root via #[macro_export]

// Re-export main entity types for convenience
pub use agency::entity::{Agency, AgencyStatus, UserRight};
pub use convention::entity::{Convention, ConventionStatus};
pub use user::entity::User;

// Re-export repositories
pub use agency::repository::AgencyRepository;
pub use convention::repository::ConventionRepository;
pub use user::repository::UserRepository;

// Re-export operations
pub use agency::operations::{
    AddAgencyCommand, AddAgencyUseCase, CloseInactiveAgenciesCommand,
    CloseInactiveAgenciesUseCase, ClosureReport, RemoveUserRightsCommand,
    RemoveUserRightsUseCase, ReviewAgencyCommand, ReviewAgencyUseCase, ReviewDecision,
    UpdateUserRightsCommand, UpdateUserRightsUseCase,
};
pub use user::operations::{
    CreateUserForAgencyCommand, CreateUserForAgencyUseCase, ResolveIdentityConflictCommand,
    ResolveIdentityConflictUseCase,
};
