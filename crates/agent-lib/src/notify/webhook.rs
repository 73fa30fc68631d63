//! Chat relay notifier
//!
//! Posts `{channel_id, message}` to the relay that forwards messages into
//! the chat platform.

use super::Notifier;
use crate::error::{MonitorError, MonitorResult};
use crate::models::Registration;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Body posted to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub channel_id: String,
    pub message: String,
}

pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> MonitorResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| MonitorError::Notifier(format!("invalid webhook URL {:?}: {}", url, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MonitorError::Notifier(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, registration: &Registration, message: &str) -> MonitorResult<()> {
        let body = RelayMessage {
            channel_id: registration.channel.channel_id.clone(),
            message: message.to_string(),
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| MonitorError::Notifier(format!("failed to send: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(MonitorError::Notifier(format!("relay error ({}): {}", status, text)));
        }
        Ok(())
    }
}
