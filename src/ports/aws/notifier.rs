//! Webhook-backed `Notifier` (Slack-compatible incoming webhook payloads).

use crate::errors::{CoreResult, TransportError};
use crate::model::PipelineChangeSummary;
use crate::ports::Notifier;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }

    async fn post(&self, text: &str) -> CoreResult<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| TransportError::new(format!("webhook notify failed: {e}")))?;

        if !response.status().is_success() {
            // Notifier failures are explicitly non-fatal; the caller logs
            // and moves on rather than aborting the tick.
            warn!(status = %response.status(), "notifier.webhook.non_success");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn message(&self, text: &str) -> CoreResult<()> {
        self.post(text).await
    }

    async fn manual_approval(
        &self,
        pipeline: &str,
        changes: &PipelineChangeSummary,
        link: &str,
    ) -> CoreResult<()> {
        self.post(&format!(
            "Manual approval required for `{pipeline}`: +{} ~{} -{}. Review: {link}",
            changes.added, changes.changed, changes.destroyed
        ))
        .await
    }

    async fn step_state(&self, status: &str, step: &str) -> CoreResult<()> {
        self.post(&format!("Step `{step}` is now {status}")).await
    }
}
