//! Notification text

use crate::anomaly::AnomalyReason;
use crate::error::MonitorError;
use crate::models::{AlignedSnapshot, ResourceKind, ServiceRef};
use crate::resources::{ResourceCodec, ScaleDirection, ScaleOutcome};

/// Log lines included in a summary context at most
const MAX_LOG_LINES: usize = 50;

/// Identifying lines shared by every notice about a service
pub fn service_header(service: &ServiceRef) -> String {
    format!(
        "- service name: **{}**\n  - project id: **{}**\n  - region: **{}**\n",
        service.service_name, service.project_id, service.region
    )
}

pub fn anomaly_message(service: &ServiceRef, reason: &AnomalyReason, summary: &str) -> String {
    format!(
        "{}  - anomaly: **{}**\n{}",
        service_header(service),
        reason,
        summary
    )
}

pub fn scale_message(service: &ServiceRef, outcome: &ScaleOutcome) -> String {
    let verb = match outcome.direction {
        ScaleDirection::Up => "increased",
        ScaleDirection::Down => "decreased",
    };
    format!(
        "{}{} **{}**: {} -> {}",
        service_header(service),
        outcome.kind,
        verb,
        render(outcome.previous.get(outcome.kind), outcome.kind),
        render(outcome.applied.get(outcome.kind), outcome.kind),
    )
}

pub fn scale_failure_message(
    service: &ServiceRef,
    kind: ResourceKind,
    direction: ScaleDirection,
    error: &MonitorError,
) -> String {
    format!(
        "{}{} scale {} **skipped**: {}",
        service_header(service),
        kind,
        direction,
        error
    )
}

/// Input handed to the summarizer for an anomaly
pub fn summary_context(
    service: &ServiceRef,
    reason: &AnomalyReason,
    history: &[AlignedSnapshot],
    logs: &[String],
) -> String {
    let metrics = serde_json::to_string(history).unwrap_or_else(|_| "[]".to_string());
    let logs = if logs.is_empty() {
        "no log entries".to_string()
    } else {
        logs.iter()
            .take(MAX_LOG_LINES)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Service: {}\nDetected: {}\nMetrics:\n{}\nLogs:\n{}\n---\n\
         A Cloud Run service shows abnormal metrics. Explain the likely cause \
         and suggest remediation.",
        service, reason, metrics, logs
    )
}

fn render(value: u32, kind: ResourceKind) -> String {
    match kind {
        ResourceKind::Cpu => format!("{} vCPU", value),
        ResourceKind::Memory => ResourceCodec::format(value, kind),
    }
}
