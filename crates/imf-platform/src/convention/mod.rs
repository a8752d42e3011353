//! Convention Aggregate
//!
//! Read-only view of immersion conventions; the agency-closure scan uses
//! validated conventions as the activity signal.

pub mod entity;
pub mod repository;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export main types
pub use entity::{Convention, ConventionStatus};
pub use repository::{ConventionRepository, InMemoryConventionRepository};

#[cfg(feature = "postgres")]
pub use postgres::PgConventionRepository;
