//! Error types for the autoscaling core

use crate::models::ServiceRef;
use std::fmt;
use thiserror::Error;

/// Why a CPU/memory pair was rejected by the hard bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    CpuTooSmall { cpu: u32, min: u32 },
    CpuTooLarge { cpu: u32, max: u32 },
    MemoryTooSmall { memory_mib: u32, min: u32 },
    MemoryTooLarge { memory_mib: u32, max: u32 },
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintViolation::CpuTooSmall { cpu, min } => {
                write!(f, "cpu {} is below the minimum of {} cores", cpu, min)
            }
            ConstraintViolation::CpuTooLarge { cpu, max } => {
                write!(f, "cpu {} exceeds the maximum of {} cores", cpu, max)
            }
            ConstraintViolation::MemoryTooSmall { memory_mib, min } => {
                write!(f, "memory {}Mi is below the minimum of {}Mi", memory_mib, min)
            }
            ConstraintViolation::MemoryTooLarge { memory_mib, max } => {
                write!(f, "memory {}Mi exceeds the maximum of {}Mi", memory_mib, max)
            }
        }
    }
}

/// A single metric that could not be fetched during a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFetchFailure {
    pub metric_type: String,
    pub reason: String,
}

/// Errors raised by the monitoring and scaling pipeline
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid resource quantity: {0:?}")]
    InvalidQuantity(String),

    #[error("resource constraint violated: {0}")]
    ResourceConstraintViolation(ConstraintViolation),

    #[error("metric fetch failed: {}", describe_failures(.failures))]
    MetricFetch { failures: Vec<MetricFetchFailure> },

    #[error("log fetch failed: {0}")]
    LogFetch(String),

    #[error("control plane error: {0}")]
    ControlPlane(String),

    #[error("notifier error: {0}")]
    Notifier(String),

    #[error("summarizer error: {0}")]
    Summarizer(String),

    #[error("service already registered: {0}")]
    AlreadyRegistered(ServiceRef),

    #[error("service not found: {0}")]
    NotFound(ServiceRef),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),
}

impl From<ConstraintViolation> for MonitorError {
    fn from(violation: ConstraintViolation) -> Self {
        MonitorError::ResourceConstraintViolation(violation)
    }
}

fn describe_failures(failures: &[MetricFetchFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.metric_type, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type MonitorResult<T> = Result<T, MonitorError>;
