//! Tracked Cloud Run metrics
//!
//! Each definition names its source metric type, the aggregation family it
//! belongs to, and how its samples become snapshot columns.

use super::{Aggregation, Aligner, Reducer};
use std::time::Duration;

pub const REQUEST_COUNT: &str = "run.googleapis.com/request_count";
pub const REQUEST_LATENCIES: &str = "run.googleapis.com/request_latencies";
pub const INSTANCE_COUNT: &str = "run.googleapis.com/container/instance_count";
pub const CPU_UTILIZATION: &str = "run.googleapis.com/container/cpu/utilizations";
pub const MEMORY_UTILIZATION: &str = "run.googleapis.com/container/memory/utilizations";
pub const STARTUP_LATENCIES: &str = "run.googleapis.com/container/startup_latencies";

/// Counters summed across a label
const SCALAR_TYPES: &[&str] = &[REQUEST_COUNT, INSTANCE_COUNT];

/// Distributions reduced by their median
const DISTRIBUTION_TYPES: &[&str] = &[
    REQUEST_LATENCIES,
    CPU_UTILIZATION,
    MEMORY_UTILIZATION,
    STARTUP_LATENCIES,
];

/// Alignment period used for every query
const ALIGNMENT_PERIOD: Duration = Duration::from_secs(10);

/// Snapshot column names
pub mod columns {
    pub const REQUEST_COUNT: &str = "Request Count";
    pub const REQUEST_COUNT_4XX: &str = "Request Count (4xx)";
    pub const REQUEST_COUNT_5XX: &str = "Request Count (5xx)";
    pub const REQUEST_LATENCY: &str = "Request Latency (ms)";
    pub const INSTANCE_COUNT: &str = "Instance Count";
    pub const INSTANCE_COUNT_ACTIVE: &str = "Instance Count (active)";
    pub const CPU_UTILIZATION: &str = "Container CPU Utilization (%)";
    pub const MEMORY_UTILIZATION: &str = "Container Memory Utilization (%)";
    pub const STARTUP_LATENCY: &str = "Container Startup Latency (ms)";
}

/// Statistical family of a metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Scalar,
    Distribution,
}

impl MetricKind {
    /// Fixed lookup by metric type; `None` for untracked types
    pub fn for_metric_type(metric_type: &str) -> Option<Self> {
        if SCALAR_TYPES.contains(&metric_type) {
            Some(MetricKind::Scalar)
        } else if DISTRIBUTION_TYPES.contains(&metric_type) {
            Some(MetricKind::Distribution)
        } else {
            None
        }
    }
}

/// How one metric type is queried and turned into snapshot columns
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub metric_type: &'static str,
    pub kind: MetricKind,
    /// Metric label expanded into one column per value
    pub source_label: Option<&'static str>,
    /// Column name, or column prefix when `source_label` is set
    pub rename_to: &'static str,
    pub scale_factor: f64,
}

impl MetricDefinition {
    fn new(metric_type: &'static str, rename_to: &'static str) -> Self {
        let kind = MetricKind::for_metric_type(metric_type).unwrap_or(MetricKind::Distribution);
        Self {
            metric_type,
            kind,
            source_label: None,
            rename_to,
            scale_factor: 1.0,
        }
    }

    fn labeled(mut self, label: &'static str) -> Self {
        self.source_label = Some(label);
        self
    }

    fn scaled(mut self, factor: f64) -> Self {
        self.scale_factor = factor;
        self
    }

    /// Column a sample with the given label value lands in
    pub fn column_for(&self, label: Option<&str>) -> String {
        match (self.source_label, label) {
            (Some(_), Some(value)) => format!("{} ({})", self.rename_to, value),
            _ => self.rename_to.to_string(),
        }
    }

    /// Query shape for this metric's kind
    pub fn aggregation(&self) -> Aggregation {
        match self.kind {
            MetricKind::Scalar => Aggregation {
                aligner: Aligner::Mean,
                alignment_period: ALIGNMENT_PERIOD,
                reducer: Reducer::Sum,
                group_by: self
                    .source_label
                    .map(|label| vec![format!("metric.label.{}", label)])
                    .unwrap_or_default(),
            },
            MetricKind::Distribution => Aggregation {
                aligner: Aligner::Percentile50,
                alignment_period: ALIGNMENT_PERIOD,
                reducer: Reducer::Mean,
                group_by: Vec::new(),
            },
        }
    }
}

/// The six metrics every service is polled for
pub fn standard_definitions() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(REQUEST_COUNT, columns::REQUEST_COUNT).labeled("response_code_class"),
        MetricDefinition::new(REQUEST_LATENCIES, columns::REQUEST_LATENCY),
        MetricDefinition::new(INSTANCE_COUNT, columns::INSTANCE_COUNT).labeled("state"),
        MetricDefinition::new(CPU_UTILIZATION, columns::CPU_UTILIZATION).scaled(100.0),
        MetricDefinition::new(MEMORY_UTILIZATION, columns::MEMORY_UTILIZATION).scaled(100.0),
        MetricDefinition::new(STARTUP_LATENCIES, columns::STARTUP_LATENCY),
    ]
}
