//! Immersion Facilitée Event Crawler
//!
//! Drains the transactional outbox and dispatches events to configured
//! webhook subscribers. New events are polled on a tight interval; failed
//! events are retried on a slower one. Quarantined topics are never
//! auto-dispatched.
//!
//! ## Configuration
//!
//! Loaded from `config.toml` (see `AppConfig::example_toml()`), with
//! environment variable overrides:
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `IMMERSION_CONFIG` | Explicit config file path |
//! | `IMMERSION_DATABASE_URL` | PostgreSQL connection URL |
//! | `IMMERSION_CRAWLER_POLL_INTERVAL_MS` | New-events poll interval |
//! | `IMMERSION_CRAWLER_RETRY_INTERVAL_MS` | Failed-events retry interval |
//! | `IMMERSION_QUARANTINED_TOPICS` | Comma-separated quarantined topics |
//! | `LOG_FORMAT` | `json` or text (default) |
//! | `RUST_LOG` | Log level filter (default: info) |

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use imf_config::AppConfig;
use imf_outbox::{
    quarantine_set, EventCrawler, EventTopic, PostgresOutboxRepository, SubscriberRegistry,
    WebhookConfig, WebhookSubscriber,
};

#[tokio::main]
async fn main() -> Result<()> {
    imf_common::logging::init_logging("imf-event-crawler");

    info!("Starting Immersion Facilitée Event Crawler");

    let config = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    info!("Connected to PostgreSQL");

    let outbox_repo = Arc::new(PostgresOutboxRepository::new(pool));
    outbox_repo.init_schema().await?;

    let quarantined = quarantine_set(&config.events.quarantined_topics);
    if !quarantined.is_empty() {
        info!(
            topics = ?quarantined,
            "Quarantined topics: events created on these topics are stored but never dispatched"
        );
    }

    let registry = build_registry(&config, &quarantined)?;
    info!(
        webhooks = config.webhooks.len(),
        topics = registry.topic_count(),
        "Subscriber registry built"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let crawler = Arc::new(EventCrawler::new(
        outbox_repo,
        registry,
        Arc::new(imf_common::SystemClock),
    ));
    let crawler_handle = crawler.start(
        Duration::from_millis(config.crawler.poll_interval_ms),
        Duration::from_millis(config.crawler.retry_interval_ms),
        shutdown_rx.clone(),
    );

    // Health endpoints
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    let app = axum::Router::new()
        .route("/health", axum::routing::get(health_handler))
        .route("/ready", axum::routing::get(ready_handler));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Health server listening on http://{}/health", addr);

    let http_handle = {
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.changed().await;
                })
                .await
                .ok();
        })
    };

    info!("Immersion Facilitée Event Crawler started");
    info!("Press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(true);

    let _ = tokio::time::timeout(Duration::from_secs(30), async {
        let _ = crawler_handle.await;
        let _ = http_handle.await;
    })
    .await;

    info!("Immersion Facilitée Event Crawler shutdown complete");
    Ok(())
}

/// Build the topic routing table from the configured webhook bindings.
/// Bindings on unknown topics are skipped with a warning rather than
/// aborting startup; bindings on quarantined topics stay registered, since
/// events stored before the topic was quarantined can still be retried.
fn build_registry(
    config: &AppConfig,
    quarantined: &HashSet<EventTopic>,
) -> Result<SubscriberRegistry> {
    let mut registry = SubscriberRegistry::new();

    for binding in &config.webhooks {
        let topic = match EventTopic::parse(&binding.topic) {
            Some(topic) => topic,
            None => {
                warn!(
                    subscription_id = %binding.subscription_id,
                    topic = %binding.topic,
                    "Unknown topic in webhook binding, skipping"
                );
                continue;
            }
        };

        if quarantined.contains(&topic) {
            warn!(
                subscription_id = %binding.subscription_id,
                topic = %binding.topic,
                "Webhook bound to a quarantined topic; new events will not reach it"
            );
        }

        let mut webhook_config = WebhookConfig::new(&binding.subscription_id, &binding.url);
        webhook_config.auth_token = binding.auth_token.clone();

        registry.subscribe(topic, Arc::new(WebhookSubscriber::new(webhook_config)?));
        info!(
            subscription_id = %binding.subscription_id,
            topic = %binding.topic,
            url = %binding.url,
            "Registered webhook subscriber"
        );
    }

    Ok(registry)
}

async fn health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ready_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "READY"
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
