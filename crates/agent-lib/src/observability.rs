//! Observability infrastructure for the autoscaling agent
//!
//! Provides:
//! - Prometheus metrics (evaluation latency, poll failures, anomalies, scale actions)
//! - Structured JSON logging with tracing

use crate::anomaly::AnomalyReason;
use crate::models::{Registration, ResourceKind, ServiceRef};
use crate::resources::ScaleDirection;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for one evaluation cycle (in seconds)
const EVALUATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    evaluation_latency_seconds: Histogram,
    evaluations: IntCounter,
    poll_failures: IntCounter,
    anomalies_detected: IntCounter,
    summaries_generated: IntCounter,
    scale_actions: IntCounterVec,
    notify_failures: IntCounter,
    services_monitored: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            evaluation_latency_seconds: register_histogram!(
                "autoscale_agent_evaluation_latency_seconds",
                "Time spent on one monitor evaluation cycle",
                EVALUATION_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),

            evaluations: register_int_counter!(
                "autoscale_agent_evaluations_total",
                "Total number of monitor evaluation cycles"
            )
            .expect("Failed to register evaluations"),

            poll_failures: register_int_counter!(
                "autoscale_agent_poll_failures_total",
                "Total number of failed metric polls"
            )
            .expect("Failed to register poll_failures"),

            anomalies_detected: register_int_counter!(
                "autoscale_agent_anomalies_detected_total",
                "Total number of anomalous evaluations"
            )
            .expect("Failed to register anomalies_detected"),

            summaries_generated: register_int_counter!(
                "autoscale_agent_summaries_generated_total",
                "Total number of anomaly summaries sent"
            )
            .expect("Failed to register summaries_generated"),

            scale_actions: register_int_counter_vec!(
                "autoscale_agent_scale_actions_total",
                "Scaling steps attempted, by resource, direction and outcome",
                &["resource", "direction", "outcome"]
            )
            .expect("Failed to register scale_actions"),

            notify_failures: register_int_counter!(
                "autoscale_agent_notify_failures_total",
                "Total number of notifications that could not be delivered"
            )
            .expect("Failed to register notify_failures"),

            services_monitored: register_int_gauge!(
                "autoscale_agent_services_monitored",
                "Number of services with a running monitor"
            )
            .expect("Failed to register services_monitored"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_evaluation(&self, duration_secs: f64) {
        self.inner().evaluations.inc();
        self.inner().evaluation_latency_seconds.observe(duration_secs);
    }

    pub fn inc_poll_failures(&self) {
        self.inner().poll_failures.inc();
    }

    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn inc_summaries_generated(&self) {
        self.inner().summaries_generated.inc();
    }

    /// Count a scaling attempt; `applied` is false when it was rejected
    pub fn inc_scale_action(&self, kind: ResourceKind, direction: ScaleDirection, applied: bool) {
        let resource = match kind {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        };
        let outcome = if applied { "applied" } else { "rejected" };
        let direction = direction.to_string();
        self.inner()
            .scale_actions
            .with_label_values(&[resource, direction.as_str(), outcome])
            .inc();
    }

    pub fn inc_notify_failures(&self) {
        self.inner().notify_failures.inc();
    }

    /// Notifications not delivered since process start
    pub fn notify_failures(&self) -> u64 {
        self.inner().notify_failures.get()
    }

    pub fn set_services_monitored(&self, count: i64) {
        self.inner().services_monitored.set(count);
    }
}

/// Structured logger for agent events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, resumed_services: usize) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            resumed_services = resumed_services,
            "Autoscale agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Autoscale agent shutting down"
        );
    }

    pub fn log_service_registered(&self, registration: &Registration) {
        info!(
            event = "service_registered",
            instance = %self.instance,
            service = %registration.service,
            guild_id = %registration.channel.guild_id,
            channel_id = %registration.channel.channel_id,
            "Service registered for monitoring"
        );
    }

    pub fn log_service_unregistered(&self, service: &ServiceRef, channel_id: &str) {
        info!(
            event = "service_unregistered",
            instance = %self.instance,
            service = %service,
            channel_id = %channel_id,
            "Service unregistered"
        );
    }

    pub fn log_anomaly(&self, service: &ServiceRef, reason: &AnomalyReason, summarized: bool) {
        warn!(
            event = "anomaly_detected",
            instance = %self.instance,
            service = %service,
            reason = %reason,
            summarized = summarized,
            "Anomaly detected"
        );
    }

    pub fn log_scale_action(
        &self,
        service: &ServiceRef,
        kind: ResourceKind,
        direction: ScaleDirection,
        vote: i32,
        error: Option<&str>,
    ) {
        match error {
            None => info!(
                event = "scale_action",
                instance = %self.instance,
                service = %service,
                resource = %kind,
                direction = %direction,
                vote = vote,
                applied = true,
                "Scaling step applied"
            ),
            Some(error) => warn!(
                event = "scale_action",
                instance = %self.instance,
                service = %service,
                resource = %kind,
                direction = %direction,
                vote = vote,
                applied = false,
                error = %error,
                "Scaling step rejected"
            ),
        }
    }

    pub fn log_metric_fetch_failed(&self, service: &ServiceRef, error: &str) {
        warn!(
            event = "metric_fetch_failed",
            instance = %self.instance,
            service = %service,
            error = %error,
            "Metric poll failed, skipping evaluation"
        );
    }
}
