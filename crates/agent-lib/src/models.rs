//! Core data models for the autoscaling agent

use crate::error::{MonitorError, MonitorResult};
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies a monitored Cloud Run service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceRef {
    pub region: String,
    pub project_id: String,
    pub service_name: String,
}

impl ServiceRef {
    pub fn new(
        region: impl Into<String>,
        project_id: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            project_id: project_id.into(),
            service_name: service_name.into(),
        }
    }

    /// Full resource name as used by the Cloud Run Admin API
    pub fn full_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/services/{}",
            self.project_id, self.region, self.service_name
        )
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Chat channel that owns a registration and receives its notifications
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelRef {
    pub guild_id: String,
    pub channel_id: String,
}

impl ChannelRef {
    pub fn new(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// A monitored service together with its owning channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub service: ServiceRef,
    pub channel: ChannelRef,
    pub registered_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(service: ServiceRef, channel: ChannelRef) -> Self {
        Self {
            service,
            channel,
            registered_at: Utc::now(),
        }
    }
}

/// Window of time a metric or log query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    /// The last `minutes` minutes, ending at the minute the range was built
    Relative { minutes: u32, end: DateTime<Utc> },
    /// A fixed historical window
    Absolute {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeRange {
    /// Range covering the last `minutes` minutes, with `now` floored to the minute.
    ///
    /// Always covers at least one minute so that `end > start` holds.
    pub fn last_minutes(minutes: u32) -> Self {
        Self::Relative {
            minutes: minutes.max(1),
            end: floor_to_minute(Utc::now()),
        }
    }

    /// Fixed range; `end` must be strictly after `start`
    pub fn absolute(start: DateTime<Utc>, end: DateTime<Utc>) -> MonitorResult<Self> {
        if end <= start {
            return Err(MonitorError::InvalidTimeRange(format!(
                "end {} is not after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self::Absolute { start, end })
    }

    /// Range spanning two snapshot timestamps, including the last minute bucket
    pub fn covering(first: DateTime<Utc>, last: DateTime<Utc>) -> MonitorResult<Self> {
        Self::absolute(first, last + ChronoDuration::minutes(1))
    }

    pub fn start(&self) -> DateTime<Utc> {
        match self {
            TimeRange::Relative { minutes, end } => *end - ChronoDuration::minutes(*minutes as i64),
            TimeRange::Absolute { start, .. } => *start,
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        match self {
            TimeRange::Relative { end, .. } | TimeRange::Absolute { end, .. } => *end,
        }
    }

    /// Duration of the range in whole minutes
    pub fn minutes(&self) -> i64 {
        match self {
            TimeRange::Relative { minutes, .. } => *minutes as i64,
            TimeRange::Absolute { start, end } => (*end - *start).num_minutes(),
        }
    }
}

/// Truncate a timestamp to the start of its minute
pub fn floor_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(ChronoDuration::minutes(1)).unwrap_or(ts)
}

/// A single point of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    /// Value of the group-by label this sample was reduced over, if any
    pub label: Option<String>,
    pub value: f64,
}

/// Time-ordered samples of one metric type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric_type: String,
    pub samples: Vec<MetricSample>,
}

impl MetricSeries {
    pub fn new(metric_type: impl Into<String>, mut samples: Vec<MetricSample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self {
            metric_type: metric_type.into(),
            samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One aligned row of every tracked metric at a minute timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedSnapshot {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

impl AlignedSnapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: f64) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }

    /// Value of a column, or `default` when the column is absent
    pub fn value_or(&self, column: &str, default: f64) -> f64 {
        self.get(column).unwrap_or(default)
    }

    /// Sum of every `"{prefix} (...)"` column, or `None` if there are none
    pub fn sum_labeled(&self, prefix: &str) -> Option<f64> {
        let head = format!("{} (", prefix);
        let mut matched = false;
        let total = self
            .values
            .iter()
            .filter(|(column, _)| column.starts_with(&head))
            .inspect(|_| matched = true)
            .map(|(_, v)| *v)
            .sum::<f64>();
        matched.then_some(total)
    }
}

/// Resource axis of a Cloud Run container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    /// Values below 16 can only be core counts; anything larger is MiB
    pub fn infer(value: u32) -> Self {
        if value < 16 {
            ResourceKind::Cpu
        } else {
            ResourceKind::Memory
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Cpu => write!(f, "CPU"),
            ResourceKind::Memory => write!(f, "Memory"),
        }
    }
}

/// CPU (whole cores) and memory (MiB) limits of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpu: u32,
    pub memory_mib: u32,
}

impl ResourceSpec {
    pub fn new(cpu: u32, memory_mib: u32) -> Self {
        Self { cpu, memory_mib }
    }

    pub fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Memory => self.memory_mib,
        }
    }

    pub fn with(mut self, kind: ResourceKind, value: u32) -> Self {
        match kind {
            ResourceKind::Cpu => self.cpu = value,
            ResourceKind::Memory => self.memory_mib = value,
        }
        self
    }
}
