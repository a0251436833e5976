//! Operator notification adapters

use super::Notifier;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), CollaboratorError> {
        info!(notification = %text, "Operator notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<&'a str>,
    text: &'a str,
    parse_mode: &'static str,
}

/// Posts notifications as HTML messages to a chat webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: String,
    chat_id: Option<String>,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        chat_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url: url.into(),
            chat_id,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<(), CollaboratorError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&WebhookMessage {
                chat_id: self.chat_id.as_deref(),
                text,
                parse_mode: "HTML",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollaboratorError::rejected(
                "notifier",
                format!("webhook returned {}", response.status()),
            ));
        }
        Ok(())
    }
}
