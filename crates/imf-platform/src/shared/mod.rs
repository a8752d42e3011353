//! Shared Infrastructure

pub mod error;

pub use error::{PlatformError, Result};
