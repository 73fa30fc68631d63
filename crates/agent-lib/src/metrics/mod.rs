//! Metric acquisition for monitored services
//!
//! This module provides:
//! - The fixed set of Cloud Run metric definitions the agent tracks
//! - Query aggregation shapes per metric kind
//! - Alignment of several metric series into per-minute snapshots
//! - A poller that fetches every definition concurrently

mod align;
mod definitions;
mod poller;

pub use align::MetricAligner;
pub use definitions::{
    columns, standard_definitions, MetricDefinition, MetricKind, CPU_UTILIZATION,
    INSTANCE_COUNT, MEMORY_UTILIZATION, REQUEST_COUNT, REQUEST_LATENCIES, STARTUP_LATENCIES,
};
pub use poller::{MetricPoller, PollerConfig, DEFAULT_FETCH_TIMEOUT};

use crate::error::MonitorResult;
use crate::models::{MetricSeries, ServiceRef, TimeRange};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-series alignment applied before reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aligner {
    Mean,
    Percentile50,
}

impl Aligner {
    /// Cloud Monitoring API name of the aligner
    pub fn api_name(&self) -> &'static str {
        match self {
            Aligner::Mean => "ALIGN_MEAN",
            Aligner::Percentile50 => "ALIGN_PERCENTILE_50",
        }
    }
}

/// Cross-series reduction applied after alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reducer {
    Sum,
    Mean,
}

impl Reducer {
    /// Cloud Monitoring API name of the reducer
    pub fn api_name(&self) -> &'static str {
        match self {
            Reducer::Sum => "REDUCE_SUM",
            Reducer::Mean => "REDUCE_MEAN",
        }
    }
}

/// How a metric query aligns and reduces raw time series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub aligner: Aligner,
    pub alignment_period: Duration,
    pub reducer: Reducer,
    /// Metric labels kept as separate series after reduction
    pub group_by: Vec<String>,
}

/// Read-only source of metric time series
#[async_trait]
pub trait MetricBackend: Send + Sync {
    async fn query(
        &self,
        service: &ServiceRef,
        metric_type: &str,
        window: &TimeRange,
        aggregation: &Aggregation,
    ) -> MonitorResult<MetricSeries>;
}

/// Read-only source of service logs
#[async_trait]
pub trait LogBackend: Send + Sync {
    async fn query(&self, service: &ServiceRef, window: &TimeRange) -> MonitorResult<Vec<String>>;
}
