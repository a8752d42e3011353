//! Event Crawler
//!
//! Polls the outbox and pushes events to registered subscribers. Two
//! separate passes run on their own schedules: `process_new_events` for
//! events that were never dispatched, `retry_failed_events` for events
//! whose last attempt left failures. Each pass appends exactly one
//! publication attempt per processed event, so delivery state always moves
//! forward and a crash between dispatch and save costs at most one
//! duplicate delivery.

use crate::event::{DomainEvent, EventPublication, EventTopic, PublicationFailure};
use crate::repository::OutboxRepository;
use anyhow::Result;
use async_trait::async_trait;
use imf_common::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A consumer of domain events for one topic.
///
/// The `subscription_id` must be stable across restarts: it is recorded in
/// publication failures and drives which subscriber a retry is blamed on.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn subscription_id(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

/// Topic-to-subscribers routing table, built once at startup.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: HashMap<EventTopic, Vec<Arc<dyn EventSubscriber>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, topic: EventTopic, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.entry(topic).or_default().push(subscriber);
    }

    pub fn subscribers_for(&self, topic: EventTopic) -> &[Arc<dyn EventSubscriber>] {
        self.subscribers
            .get(&topic)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn topic_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Outcome of one crawl pass, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub processed: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct EventCrawler {
    repository: Arc<dyn OutboxRepository>,
    registry: SubscriberRegistry,
    clock: Arc<dyn Clock>,
}

impl EventCrawler {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        registry: SubscriberRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            registry,
            clock,
        }
    }

    /// Dispatch every never-published event, oldest first.
    pub async fn process_new_events(&self) -> Result<CrawlReport> {
        let events = self.repository.get_all_unpublished_events().await?;
        Ok(self.dispatch_batch(events, "new").await)
    }

    /// Re-dispatch every event whose last attempt left failures. All
    /// subscribers of the topic are invoked again, not only the failed
    /// ones, so subscribers must tolerate duplicate delivery.
    pub async fn retry_failed_events(&self) -> Result<CrawlReport> {
        let events = self.repository.get_all_failed_events().await?;
        Ok(self.dispatch_batch(events, "retry").await)
    }

    async fn dispatch_batch(&self, events: Vec<DomainEvent>, pass: &str) -> CrawlReport {
        let mut report = CrawlReport::default();
        if events.is_empty() {
            return report;
        }

        debug!(pass, count = events.len(), "Dispatching outbox events");

        for mut event in events {
            report.processed += 1;
            // One event failing to persist must not block the rest of the batch.
            match self.dispatch_one(&mut event).await {
                Ok(true) => report.delivered += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(event_id = %event.id, error = %e, "Failed to persist publication attempt");
                }
            }
        }

        info!(
            pass,
            processed = report.processed,
            delivered = report.delivered,
            failed = report.failed,
            "Crawl pass complete"
        );

        report
    }

    /// Invoke every subscriber of the event's topic, then append one
    /// publication attempt recording the failures. Returns whether the
    /// attempt was fully successful.
    async fn dispatch_one(&self, event: &mut DomainEvent) -> Result<bool> {
        let topic = event.topic();
        let mut failures = Vec::new();

        for subscriber in self.registry.subscribers_for(topic) {
            if let Err(e) = subscriber.handle(event).await {
                warn!(
                    event_id = %event.id,
                    topic = %topic,
                    subscription_id = subscriber.subscription_id(),
                    error = %e,
                    "Subscriber failed"
                );
                failures.push(PublicationFailure {
                    subscription_id: subscriber.subscription_id().to_string(),
                    error_message: e.to_string(),
                });
            }
        }

        let delivered = failures.is_empty();
        event.publications.push(EventPublication {
            published_at: self.clock.now(),
            failures,
        });
        self.repository.save(event).await?;

        Ok(delivered)
    }

    /// Run both passes on their own intervals until the shutdown signal
    /// flips. Ticks skipped while a pass is still running are dropped
    /// rather than bursted.
    pub fn start(
        self: Arc<Self>,
        poll_interval: Duration,
        retry_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut poll = tokio::time::interval(poll_interval);
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut retry = tokio::time::interval(retry_interval);
            retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            info!(
                poll_interval_ms = poll_interval.as_millis() as u64,
                retry_interval_ms = retry_interval.as_millis() as u64,
                topics = self.registry.topic_count(),
                "Event crawler started"
            );

            loop {
                tokio::select! {
                    _ = poll.tick() => {
                        if let Err(e) = self.process_new_events().await {
                            error!(error = %e, "New-events pass failed");
                        }
                    }
                    _ = retry.tick() => {
                        if let Err(e) = self.retry_failed_events().await {
                            error!(error = %e, "Retry pass failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Event crawler stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;
    use crate::factory::EventFactory;
    use crate::memory::InMemoryOutboxRepository;
    use chrono::{TimeZone, Utc};
    use imf_common::{FixedClock, SequentialIds};
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct RecordingSubscriber {
        id: String,
        seen: Mutex<Vec<String>>,
        fail_until_call: Mutex<usize>,
    }

    impl RecordingSubscriber {
        fn reliable(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                seen: Mutex::new(Vec::new()),
                fail_until_call: Mutex::new(0),
            })
        }

        /// Fails the first `n` calls, then succeeds.
        fn flaky(id: &str, n: usize) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                seen: Mutex::new(Vec::new()),
                fail_until_call: Mutex::new(n),
            })
        }

        fn seen_ids(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSubscriber for RecordingSubscriber {
        fn subscription_id(&self) -> &str {
            &self.id
        }

        async fn handle(&self, event: &DomainEvent) -> Result<()> {
            self.seen.lock().unwrap().push(event.id.clone());
            let mut remaining = self.fail_until_call.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn fixture() -> (EventFactory, Arc<FixedClock>, Arc<InMemoryOutboxRepository>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        ));
        let factory = EventFactory::new(
            clock.clone(),
            Arc::new(SequentialIds::new("evt")),
            HashSet::new(),
        );
        (factory, clock, Arc::new(InMemoryOutboxRepository::new()))
    }

    fn crawler(
        repo: Arc<InMemoryOutboxRepository>,
        clock: Arc<FixedClock>,
        subs: Vec<(EventTopic, Arc<dyn EventSubscriber>)>,
    ) -> EventCrawler {
        let mut registry = SubscriberRegistry::new();
        for (topic, sub) in subs {
            registry.subscribe(topic, sub);
        }
        EventCrawler::new(repo, registry, clock)
    }

    fn agency_added(factory: &EventFactory) -> DomainEvent {
        factory.create(EventPayload::NewAgencyAdded {
            agency_id: "agency-1".to_string(),
        })
    }

    #[tokio::test]
    async fn test_new_events_delivered_to_all_topic_subscribers() {
        let (factory, clock, repo) = fixture();
        let first = RecordingSubscriber::reliable("sub-1");
        let second = RecordingSubscriber::reliable("sub-2");
        let crawler = crawler(
            repo.clone(),
            clock,
            vec![
                (EventTopic::NewAgencyAdded, first.clone() as _),
                (EventTopic::NewAgencyAdded, second.clone() as _),
            ],
        );

        let event = agency_added(&factory);
        repo.save(&event).await.unwrap();

        let report = crawler.process_new_events().await.unwrap();
        assert_eq!(report, CrawlReport { processed: 1, delivered: 1, failed: 0 });
        assert_eq!(first.seen_ids(), vec![event.id.clone()]);
        assert_eq!(second.seen_ids(), vec![event.id.clone()]);

        let stored = repo.get(&event.id).unwrap();
        assert!(stored.is_delivered());
    }

    #[tokio::test]
    async fn test_delivered_event_not_redispatched() {
        let (factory, clock, repo) = fixture();
        let sub = RecordingSubscriber::reliable("sub-1");
        let crawler = crawler(
            repo.clone(),
            clock,
            vec![(EventTopic::NewAgencyAdded, sub.clone() as _)],
        );

        let event = agency_added(&factory);
        repo.save(&event).await.unwrap();

        crawler.process_new_events().await.unwrap();
        let second_pass = crawler.process_new_events().await.unwrap();
        assert_eq!(second_pass.processed, 0);
        assert_eq!(sub.seen_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_one_failing_subscriber_marks_event_failed_but_others_run() {
        let (factory, clock, repo) = fixture();
        let healthy = RecordingSubscriber::reliable("sub-ok");
        let broken = RecordingSubscriber::flaky("sub-broken", usize::MAX);
        let crawler = crawler(
            repo.clone(),
            clock,
            vec![
                (EventTopic::NewAgencyAdded, healthy.clone() as _),
                (EventTopic::NewAgencyAdded, broken.clone() as _),
            ],
        );

        let event = agency_added(&factory);
        repo.save(&event).await.unwrap();

        let report = crawler.process_new_events().await.unwrap();
        assert_eq!(report, CrawlReport { processed: 1, delivered: 0, failed: 1 });
        assert_eq!(healthy.seen_ids().len(), 1);

        let stored = repo.get(&event.id).unwrap();
        let failures = &stored.last_publication().unwrap().failures;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].subscription_id, "sub-broken");
        assert_eq!(failures[0].error_message, "boom");
        assert!(stored.is_retryable());
    }

    #[tokio::test]
    async fn test_retry_pass_clears_failure_once_subscriber_recovers() {
        let (factory, clock, repo) = fixture();
        let steady = RecordingSubscriber::reliable("sub-steady");
        let flaky = RecordingSubscriber::flaky("sub-flaky", 1);
        let crawler = crawler(
            repo.clone(),
            clock,
            vec![
                (EventTopic::NewAgencyAdded, steady.clone() as _),
                (EventTopic::NewAgencyAdded, flaky.clone() as _),
            ],
        );

        let event = agency_added(&factory);
        repo.save(&event).await.unwrap();

        crawler.process_new_events().await.unwrap();
        assert!(repo.get(&event.id).unwrap().is_retryable());

        let retry = crawler.retry_failed_events().await.unwrap();
        assert_eq!(retry, CrawlReport { processed: 1, delivered: 1, failed: 0 });

        let stored = repo.get(&event.id).unwrap();
        assert!(stored.is_delivered());
        assert_eq!(stored.publications.len(), 2);

        // Retry re-invokes every subscriber, including the one that already
        // succeeded.
        assert_eq!(steady.seen_ids().len(), 2);
        assert_eq!(flaky.seen_ids().len(), 2);

        assert!(repo.get_all_failed_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_processed_oldest_first() {
        let (factory, clock, repo) = fixture();
        let sub = RecordingSubscriber::reliable("sub-1");
        let e1 = agency_added(&factory);
        clock.advance(chrono::Duration::minutes(1));
        let e2 = agency_added(&factory);

        repo.save(&e2).await.unwrap();
        repo.save(&e1).await.unwrap();

        let crawler = crawler(
            repo.clone(),
            clock,
            vec![(EventTopic::NewAgencyAdded, sub.clone() as _)],
        );
        crawler.process_new_events().await.unwrap();

        assert_eq!(sub.seen_ids(), vec![e1.id, e2.id]);
    }

    #[tokio::test]
    async fn test_event_without_subscribers_is_marked_delivered() {
        let (factory, clock, repo) = fixture();
        let crawler = crawler(repo.clone(), clock, vec![]);

        let event = agency_added(&factory);
        repo.save(&event).await.unwrap();

        let report = crawler.process_new_events().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert!(repo.get(&event.id).unwrap().is_delivered());
    }
}
