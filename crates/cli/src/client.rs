//! API client for communicating with the autoscale agent

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// API client for the agent's HTTP API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    /// Health is reported with 503 when unhealthy, so any status with a body is accepted
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.base_url.join("healthz").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        response.json().await.context("Failed to parse response")
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        anyhow::bail!("API error ({}): {}", status, message);
    }

    response.json().await.context("Failed to parse response")
}

/// Path of the services collection owned by a channel
pub fn services_path(guild: &str, channel: &str) -> String {
    format!("api/v1/guilds/{}/channels/{}/services", guild, channel)
}

/// Path of one channel-owned service
pub fn service_path(guild: &str, channel: &str, service: &ServiceRef) -> String {
    format!(
        "{}/{}/{}/{}",
        services_path(guild, channel),
        service.region,
        service.project_id,
        service.service_name
    )
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub region: String,
    pub project_id: String,
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub guild_id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub service: ServiceRef,
    pub channel: ChannelRef,
    pub registered_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

/// One minute of aligned metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: String,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub snapshots: Vec<Snapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReason {
    pub reason: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyWindow {
    pub timestamp: String,
    pub reason: AnomalyReason,
    pub cpu_advice: Option<String>,
    pub memory_advice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub windows: Vec<AnomalyWindow>,
}
