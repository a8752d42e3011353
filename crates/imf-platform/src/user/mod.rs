//! User Aggregate
//!
//! User identity records and OAuth identity reconciliation.

pub mod entity;
pub mod operations;
pub mod repository;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export main types
pub use entity::User;
pub use repository::{InMemoryUserRepository, UserRepository};

#[cfg(feature = "postgres")]
pub use postgres::PgUserRepository;
