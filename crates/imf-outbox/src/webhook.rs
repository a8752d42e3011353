//! Webhook Subscriber
//!
//! Delivers domain events to external consumers over HTTP POST. One
//! instance per configured webhook binding; the crawler treats each as an
//! ordinary subscriber, so webhook failures are captured in the event's
//! publication history like any other.

use crate::crawler::EventSubscriber;
use crate::event::DomainEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Configuration for a single webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Stable identifier recorded in publication failures.
    pub subscription_id: String,
    /// Target URL receiving the event JSON.
    pub url: String,
    /// Optional bearer token.
    pub auth_token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl WebhookConfig {
    pub fn new(subscription_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            url: url.into(),
            auth_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct WebhookSubscriber {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookSubscriber {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl EventSubscriber for WebhookSubscriber {
    fn subscription_id(&self) -> &str {
        &self.config.subscription_id
    }

    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        debug!(
            event_id = %event.id,
            topic = %event.topic(),
            url = %self.config.url,
            "Posting event to webhook"
        );

        let mut request = self.client.post(&self.config.url).json(event);
        if let Some(ref token) = self.config.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {}: {}", status, body);
        }

        Ok(())
    }
}
