//! Agent configuration

use agent_lib::gcp::{
    vertex_endpoint, DEFAULT_LOGGING_ENDPOINT, DEFAULT_MONITORING_ENDPOINT, DEFAULT_RUN_ENDPOINT,
};
use agent_lib::monitor::MonitorConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name reported in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health, metrics and registrations
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Delay between monitor ticks in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Metric history evaluated per tick
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    /// Upper bound for each metric query in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Minimum spacing between anomaly summaries in seconds
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// JSON file keeping registrations across restarts; in memory when unset
    #[serde(default)]
    pub registry_path: Option<String>,

    /// Relay that forwards notifications to chat channels
    #[serde(default = "default_notifier_webhook_url")]
    pub notifier_webhook_url: String,

    #[serde(default = "default_monitoring_endpoint")]
    pub monitoring_endpoint: String,

    #[serde(default = "default_logging_endpoint")]
    pub logging_endpoint: String,

    #[serde(default = "default_run_endpoint")]
    pub run_endpoint: String,

    /// Vertex AI endpoint; derived from `vertex_region` when unset
    #[serde(default)]
    pub vertex_endpoint: Option<String>,

    /// Project billed for summaries
    #[serde(default = "default_vertex_project")]
    pub vertex_project: String,

    #[serde(default = "default_vertex_region")]
    pub vertex_region: String,

    #[serde(default = "default_vertex_model")]
    pub vertex_model: String,

    /// Delay before the single summary retry in seconds
    #[serde(default = "default_vertex_retry_delay")]
    pub vertex_retry_delay_secs: u64,

    /// Static bearer token; the metadata server is used when unset
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_instance_name() -> String {
    std::env::var("K_REVISION")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "autoscale-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_poll_interval() -> u64 {
    30
}

fn default_window_minutes() -> u32 {
    5
}

fn default_fetch_timeout() -> u64 {
    20
}

fn default_cooldown() -> u64 {
    600
}

fn default_notifier_webhook_url() -> String {
    "http://localhost:5000/notify".to_string()
}

fn default_monitoring_endpoint() -> String {
    DEFAULT_MONITORING_ENDPOINT.to_string()
}

fn default_logging_endpoint() -> String {
    DEFAULT_LOGGING_ENDPOINT.to_string()
}

fn default_run_endpoint() -> String {
    DEFAULT_RUN_ENDPOINT.to_string()
}

fn default_vertex_project() -> String {
    std::env::var("GOOGLE_CLOUD_PROJECT").unwrap_or_default()
}

fn default_vertex_region() -> String {
    "us-central1".to_string()
}

fn default_vertex_model() -> String {
    "text-bison@001".to_string()
}

fn default_vertex_retry_delay() -> u64 {
    50
}

impl AgentConfig {
    /// Load configuration from `AGENT_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT"))
            .build()?;

        let config: AgentConfig = config
            .try_deserialize()
            .context("Invalid agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.vertex_project.is_empty(),
            "AGENT_VERTEX_PROJECT (or GOOGLE_CLOUD_PROJECT) must be set"
        );
        anyhow::ensure!(self.window_minutes >= 2, "window_minutes must be at least 2");
        anyhow::ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be positive");
        Ok(())
    }

    pub fn vertex_endpoint(&self) -> String {
        self.vertex_endpoint
            .clone()
            .unwrap_or_else(|| vertex_endpoint(&self.vertex_region))
    }

    pub fn vertex_retry_delay(&self) -> Duration {
        Duration::from_secs(self.vertex_retry_delay_secs)
    }

    /// Monitor loop settings; thresholds keep their defaults
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            window_minutes: self.window_minutes,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            cooldown: Duration::from_secs(self.cooldown_secs),
            ..MonitorConfig::default()
        }
    }
}
