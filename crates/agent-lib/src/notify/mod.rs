//! Outbound notifications and anomaly summaries
//!
//! This module provides:
//! - The `Notifier` and `Summarizer` seams used by the monitor loop
//! - Message rendering for anomaly and scaling notices
//! - A JSON webhook notifier for the chat relay

mod message;
mod webhook;

pub use message::{
    anomaly_message, scale_failure_message, scale_message, service_header, summary_context,
};
pub use webhook::{RelayMessage, WebhookNotifier};

use crate::error::MonitorResult;
use crate::models::Registration;
use async_trait::async_trait;

/// Delivers a message to the channel owning a registration
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, registration: &Registration, message: &str) -> MonitorResult<()>;
}

/// Produces a free-text analysis of an anomaly context
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn generate(&self, context: &str) -> MonitorResult<String>;
}
