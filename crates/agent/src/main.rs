//! Autoscale Agent - per-service Cloud Run resource autoscaler
//!
//! This binary polls Cloud Monitoring for every registered service,
//! summarizes anomalies and adjusts CPU/memory limits through the Cloud Run
//! Admin API.

use agent_lib::{
    gcp::{
        http_client, CloudLogging, CloudMonitoring, CloudRunAdmin, TokenSource, VertexSummarizer,
        METADATA_TOKEN_URL,
    },
    health::{components, HealthRegistry},
    monitor::{MonitorSupervisorBuilder, Registry, ServiceRegistry},
    notify::WebhookNotifier,
    observability::{AgentMetrics, StructuredLogger},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Timeout for every call to a Google API
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting autoscale-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(
        instance = %config.instance_name,
        poll_interval_secs = config.poll_interval_secs,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    // Google API clients share one HTTP client and token source
    let client = http_client(HTTP_TIMEOUT)?;
    let tokens = Arc::new(match &config.access_token {
        Some(token) => TokenSource::fixed(token.clone()),
        None => TokenSource::metadata(client.clone(), METADATA_TOKEN_URL),
    });

    let monitoring = Arc::new(CloudMonitoring::new(
        client.clone(),
        &config.monitoring_endpoint,
        tokens.clone(),
    ));
    let logging = Arc::new(CloudLogging::new(
        client.clone(),
        &config.logging_endpoint,
        tokens.clone(),
    ));
    let run_admin = Arc::new(CloudRunAdmin::new(
        client.clone(),
        &config.run_endpoint,
        tokens.clone(),
    ));
    let summarizer = Arc::new(
        VertexSummarizer::new(
            client,
            &config.vertex_endpoint(),
            config.vertex_project.clone(),
            config.vertex_region.clone(),
            config.vertex_model.clone(),
            tokens,
        )
        .with_retry_delay(config.vertex_retry_delay()),
    );
    let notifier = Arc::new(
        WebhookNotifier::new(&config.notifier_webhook_url)
            .context("Failed to create notifier")?,
    );

    let registry: Arc<dyn Registry> = match &config.registry_path {
        Some(path) => Arc::new(
            ServiceRegistry::open(path)
                .await
                .with_context(|| format!("Failed to open registry at {}", path))?,
        ),
        None => {
            warn!("No registry path configured, registrations will not survive a restart");
            Arc::new(ServiceRegistry::in_memory())
        }
    };

    let supervisor = Arc::new(
        MonitorSupervisorBuilder::new()
            .metric_backend(monitoring)
            .log_backend(logging)
            .control_plane(run_admin)
            .notifier(notifier)
            .summarizer(summarizer)
            .registry(registry)
            .health(health_registry.clone())
            .logger(logger.clone())
            .config(config.monitor_config())
            .build()?,
    );

    let resumed = supervisor
        .resume()
        .await
        .context("Failed to resume registered services")?;
    logger.log_startup(AGENT_VERSION, resumed);

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        supervisor.clone(),
    ));

    // Mark agent as ready after initialization
    health_registry.record_success(components::MONITOR).await;
    health_registry.set_ready(true).await;

    // Serve until SIGINT
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
    };
    api::serve(config.api_port, app_state, shutdown).await?;

    health_registry.set_ready(false).await;
    supervisor.shutdown().await;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
