//! Agent library for Cloud Run resource autoscaling
//!
//! This crate provides the core functionality for:
//! - Metric polling and minute alignment
//! - Anomaly detection with summary cooldown
//! - Per-axis scaling votes and constrained resource updates
//! - Registration-driven monitor loops
//! - Health checks and observability

pub mod anomaly;
pub mod decision;
pub mod error;
pub mod gcp;
pub mod health;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod observability;
pub mod resources;

pub use error::{MonitorError, MonitorResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
