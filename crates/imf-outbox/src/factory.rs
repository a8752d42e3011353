//! Event Factory
//!
//! Pure construction of [`DomainEvent`] records. The factory owns the
//! quarantine policy: topics in the configured set are flagged at creation
//! time and permanently excluded from automatic dispatch.

use crate::event::{DomainEvent, EventPayload, EventPublication, EventTopic};
use imf_common::{Clock, IdGenerator};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Parse configured topic names into the quarantine set an [`EventFactory`]
/// takes. Unknown names are skipped with a warning.
pub fn quarantine_set<I, S>(names: I) -> HashSet<EventTopic>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut topics = HashSet::new();
    for name in names {
        let name = name.as_ref();
        match EventTopic::parse(name) {
            Some(topic) => {
                topics.insert(topic);
            }
            None => warn!(topic = %name, "Unknown topic in quarantine configuration, skipping"),
        }
    }
    topics
}

/// Builds domain events with injected time and id providers.
///
/// No I/O happens here; malformed payloads cannot exist because the payload
/// is a typed union validated upstream.
pub struct EventFactory {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    quarantined_topics: HashSet<EventTopic>,
}

impl EventFactory {
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        quarantined_topics: HashSet<EventTopic>,
    ) -> Self {
        Self { clock, ids, quarantined_topics }
    }

    /// Create a fresh event for a payload. `was_quarantined` is stamped from
    /// the configured topic set.
    pub fn create(&self, payload: EventPayload) -> DomainEvent {
        self.create_with_publications(payload, Vec::new())
    }

    /// Create an event carrying a pre-existing publication history.
    /// Used for replay tooling and tests.
    pub fn create_with_publications(
        &self,
        payload: EventPayload,
        publications: Vec<EventPublication>,
    ) -> DomainEvent {
        let topic = payload.topic();
        DomainEvent {
            id: self.ids.generate(),
            occurred_at: self.clock.now(),
            payload,
            publications,
            was_quarantined: self.quarantined_topics.contains(&topic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PublicationFailure;
    use chrono::{TimeZone, Utc};
    use imf_common::{FixedClock, SequentialIds};

    fn factory(quarantined: &[EventTopic]) -> EventFactory {
        EventFactory::new(
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())),
            Arc::new(SequentialIds::new("evt")),
            quarantined.iter().copied().collect(),
        )
    }

    #[test]
    fn test_create_stamps_id_and_time() {
        let factory = factory(&[]);
        let event = factory.create(EventPayload::NewAgencyAdded {
            agency_id: "agency-1".to_string(),
        });

        assert_eq!(event.id, "evt-1");
        assert_eq!(event.occurred_at, Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap());
        assert!(event.publications.is_empty());
        assert!(!event.was_quarantined);
    }

    #[test]
    fn test_quarantined_topic_is_flagged() {
        let factory = factory(&[EventTopic::ConventionRejected]);

        let rejected = factory.create(EventPayload::ConventionRejected {
            convention_id: "conv-1".to_string(),
            agency_id: "agency-1".to_string(),
            justification: "missing signature".to_string(),
        });
        assert!(rejected.was_quarantined);

        let added = factory.create(EventPayload::NewAgencyAdded {
            agency_id: "agency-1".to_string(),
        });
        assert!(!added.was_quarantined);
    }

    #[test]
    fn test_quarantine_set_parses_configured_names() {
        let set = quarantine_set(["ConventionRejected", "AgencyClosed"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&EventTopic::ConventionRejected));
        assert!(set.contains(&EventTopic::AgencyClosed));
    }

    #[test]
    fn test_quarantine_set_skips_unknown_names() {
        let set = quarantine_set(["ConventionRejected", "NoSuchTopic"]);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&EventTopic::ConventionRejected));
    }

    #[test]
    fn test_factory_built_from_configured_names_flags_events() {
        let factory = EventFactory::new(
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())),
            Arc::new(SequentialIds::new("evt")),
            quarantine_set(["ConventionRejected"]),
        );

        let event = factory.create(EventPayload::ConventionRejected {
            convention_id: "conv-1".to_string(),
            agency_id: "agency-1".to_string(),
            justification: "missing signature".to_string(),
        });
        assert!(event.was_quarantined);
    }

    #[test]
    fn test_create_with_publications_preserves_history() {
        let factory = factory(&[]);
        let history = vec![EventPublication {
            published_at: Utc.with_ymd_and_hms(2024, 5, 30, 10, 0, 0).unwrap(),
            failures: vec![PublicationFailure {
                subscription_id: "sub-1".to_string(),
                error_message: "timeout".to_string(),
            }],
        }];

        let event = factory.create_with_publications(
            EventPayload::AgencyActivated { agency_id: "agency-1".to_string() },
            history.clone(),
        );
        assert_eq!(event.publications, history);
        assert!(event.is_retryable());
    }
}
