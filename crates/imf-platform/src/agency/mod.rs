//! Agency Aggregate
//!
//! Agency lifecycle, user rights and the invariants between them.

pub mod entity;
pub mod operations;
pub mod repository;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export main types
pub use entity::{Agency, AgencyStatus, InvalidStatusTransition, RightsViolation, UserRight};
pub use repository::{AgencyRepository, InMemoryAgencyRepository};

#[cfg(feature = "postgres")]
pub use postgres::PgAgencyRepository;
