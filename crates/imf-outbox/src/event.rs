//! Domain Event Model
//!
//! Events are immutable facts with an append-only publication history.
//! The topic/payload pair is a closed tagged union so subscriber
//! registration and payload access are checked at compile time.

use chrono::{DateTime, Utc};
use imf_common::{AgencyId, AgencyRole, ConventionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Closed set of business occurrences the platform publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    NewAgencyAdded,
    AgencyActivated,
    AgencyRejected,
    AgencyClosed,
    ConnectedUserAgencyRightChanged,
    UserAccountsMerged,
    ConventionSubmitted,
    ConventionRejected,
}

impl EventTopic {
    pub const ALL: &'static [EventTopic] = &[
        EventTopic::NewAgencyAdded,
        EventTopic::AgencyActivated,
        EventTopic::AgencyRejected,
        EventTopic::AgencyClosed,
        EventTopic::ConnectedUserAgencyRightChanged,
        EventTopic::UserAccountsMerged,
        EventTopic::ConventionSubmitted,
        EventTopic::ConventionRejected,
    ];

    /// Parse a topic from its wire name (the enum variant name).
    pub fn parse(s: &str) -> Option<EventTopic> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::NewAgencyAdded => "NewAgencyAdded",
            EventTopic::AgencyActivated => "AgencyActivated",
            EventTopic::AgencyRejected => "AgencyRejected",
            EventTopic::AgencyClosed => "AgencyClosed",
            EventTopic::ConnectedUserAgencyRightChanged => "ConnectedUserAgencyRightChanged",
            EventTopic::UserAccountsMerged => "UserAccountsMerged",
            EventTopic::ConventionSubmitted => "ConventionSubmitted",
            EventTopic::ConventionRejected => "ConventionRejected",
        }
    }
}

impl std::fmt::Display for EventTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic-specific event data. The serde tag doubles as the stored topic
/// column, so the persisted JSON stays self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum EventPayload {
    NewAgencyAdded {
        agency_id: AgencyId,
    },
    AgencyActivated {
        agency_id: AgencyId,
    },
    AgencyRejected {
        agency_id: AgencyId,
        justification: String,
    },
    AgencyClosed {
        agency_id: AgencyId,
    },
    ConnectedUserAgencyRightChanged {
        agency_id: AgencyId,
        user_id: UserId,
        roles: BTreeSet<AgencyRole>,
        is_notified_by_email: bool,
    },
    UserAccountsMerged {
        kept_user_id: UserId,
        deleted_user_id: UserId,
    },
    ConventionSubmitted {
        convention_id: ConventionId,
        agency_id: AgencyId,
    },
    ConventionRejected {
        convention_id: ConventionId,
        agency_id: AgencyId,
        justification: String,
    },
}

impl EventPayload {
    pub fn topic(&self) -> EventTopic {
        match self {
            EventPayload::NewAgencyAdded { .. } => EventTopic::NewAgencyAdded,
            EventPayload::AgencyActivated { .. } => EventTopic::AgencyActivated,
            EventPayload::AgencyRejected { .. } => EventTopic::AgencyRejected,
            EventPayload::AgencyClosed { .. } => EventTopic::AgencyClosed,
            EventPayload::ConnectedUserAgencyRightChanged { .. } => {
                EventTopic::ConnectedUserAgencyRightChanged
            }
            EventPayload::UserAccountsMerged { .. } => EventTopic::UserAccountsMerged,
            EventPayload::ConventionSubmitted { .. } => EventTopic::ConventionSubmitted,
            EventPayload::ConventionRejected { .. } => EventTopic::ConventionRejected,
        }
    }
}

/// A single failed subscriber invocation within a publication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationFailure {
    pub subscription_id: String,
    pub error_message: String,
}

/// One dispatch attempt: when it ran and which subscribers failed.
/// An empty `failures` list means every subscriber succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPublication {
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub failures: Vec<PublicationFailure>,
}

/// An immutable domain event with its append-only publication history.
///
/// Lifecycle: created once by a use case, mutated only by appending
/// publication attempts, never deleted by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(default)]
    pub publications: Vec<EventPublication>,
    #[serde(default)]
    pub was_quarantined: bool,
}

impl DomainEvent {
    pub fn topic(&self) -> EventTopic {
        self.payload.topic()
    }

    pub fn last_publication(&self) -> Option<&EventPublication> {
        self.publications.last()
    }

    /// True once a publication attempt succeeded for every subscriber.
    /// Such an event must never be redelivered.
    pub fn is_delivered(&self) -> bool {
        self.last_publication()
            .map(|p| p.failures.is_empty())
            .unwrap_or(false)
    }

    /// True when the last attempt left at least one failure and the event
    /// is not quarantined. Retried by the crawler's failed-events pass.
    pub fn is_retryable(&self) -> bool {
        !self.was_quarantined
            && self
                .last_publication()
                .map(|p| !p.failures.is_empty())
                .unwrap_or(false)
    }

    /// True when no dispatch has ever been attempted and the event is not
    /// quarantined. Picked up by the crawler's new-events pass.
    pub fn is_unpublished(&self) -> bool {
        !self.was_quarantined && self.publications.is_empty()
    }
}
