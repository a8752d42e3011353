use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

pub mod logging;

// ============================================================================
// Identifiers
// ============================================================================

/// Agency identifier (UUID string).
pub type AgencyId = String;
/// User identifier (UUID string).
pub type UserId = String;
/// Convention identifier (UUID string).
pub type ConventionId = String;

// ============================================================================
// Agency Roles
// ============================================================================

/// Role a user can hold on an agency.
///
/// Serialized in camelCase to match the wire format of the legacy backend
/// (`counsellor`, `validator`, `agencyAdmin`, `toReview`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgencyRole {
    /// Reviews convention submissions before validation. Only meaningful on
    /// agencies that delegate validation to a parent agency.
    Counsellor,
    /// Validates conventions. Forbidden on agencies with a refers-to parent.
    Validator,
    /// Manages the agency record itself (rights, closure notifications).
    AgencyAdmin,
    /// Freshly attached user awaiting a real role assignment.
    ToReview,
}

impl std::fmt::Display for AgencyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgencyRole::Counsellor => "counsellor",
            AgencyRole::Validator => "validator",
            AgencyRole::AgencyAdmin => "agencyAdmin",
            AgencyRole::ToReview => "toReview",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Clock / Id Providers
// ============================================================================

/// Time source abstraction so use cases and the event factory can be tested
/// with a deterministic clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Identifier source abstraction, same rationale as [`Clock`].
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Wall-clock implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// UUID v4 implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic clock for tests. Returns the configured instant and can be
/// advanced between assertions.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Deterministic id generator for tests: "id-1", "id-2", ...
pub struct SequentialIds {
    prefix: String,
    counter: Mutex<u64>,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Mutex::new(0),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        format!("{}-{}", self.prefix, counter)
    }
}
