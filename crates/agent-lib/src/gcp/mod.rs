//! Google Cloud REST adapters
//!
//! This module provides:
//! - Access tokens from a static value or the metadata server
//! - `MetricBackend` over Cloud Monitoring v3
//! - `LogBackend` over Cloud Logging v2
//! - `ControlPlane` over the Cloud Run Admin v2 API
//! - `Summarizer` over Vertex AI text prediction

mod auth;
mod logging;
mod monitoring;
mod run;
mod vertex;

pub use auth::{TokenSource, METADATA_TOKEN_URL};
pub use logging::CloudLogging;
pub use monitoring::CloudMonitoring;
pub use run::CloudRunAdmin;
pub use vertex::{VertexParameters, VertexSummarizer};

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use std::time::Duration;

pub const DEFAULT_MONITORING_ENDPOINT: &str = "https://monitoring.googleapis.com";
pub const DEFAULT_LOGGING_ENDPOINT: &str = "https://logging.googleapis.com";
pub const DEFAULT_RUN_ENDPOINT: &str = "https://run.googleapis.com";

/// Regional Vertex AI endpoint
pub fn vertex_endpoint(region: &str) -> String {
    format!("https://{}-aiplatform.googleapis.com", region)
}

/// Shared HTTP client for the adapters
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Turn a non-success response into an error carrying its body
async fn ensure_success(response: Response) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("API error ({}): {}", status, body);
    }
    Ok(response)
}

fn trim_base(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}
