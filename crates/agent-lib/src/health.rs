//! Component health for liveness and readiness endpoints
//!
//! Each external dependency the monitors talk to is a component. A failed
//! call marks it degraded; repeated failures without a success in between
//! escalate it to unhealthy, which also takes the agent out of readiness.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failures after which a degraded component turns unhealthy
pub const UNHEALTHY_AFTER: u32 = 3;

/// Component names for health tracking
pub mod components {
    pub const MONITOR: &str = "monitor";
    pub const METRIC_BACKEND: &str = "metric_backend";
    pub const CONTROL_PLANE: &str = "control_plane";
    pub const NOTIFIER: &str = "notifier";

    /// Every component the agent reports on
    pub const ALL: &[&str] = &[MONITOR, METRIC_BACKEND, CONTROL_PLANE, NOTIFIER];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Last call failed, monitors keep going
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    /// Last failure message, cleared on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn ok() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    fn failed(&self, message: String) -> Self {
        let consecutive_failures = self.consecutive_failures.saturating_add(1);
        let status = if consecutive_failures >= UNHEALTHY_AFTER {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        Self {
            status,
            message: Some(message),
            consecutive_failures,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status among the components; no components is healthy
    fn overall(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .max_by_key(|status| match status {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared, cloneable view of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every known component as healthy
    pub async fn register_all(&self) {
        let mut state = self.state.write().await;
        for name in components::ALL {
            state.components.insert(name.to_string(), ComponentHealth::ok());
        }
    }

    /// A call to the component succeeded
    pub async fn record_success(&self, name: &str) {
        let mut state = self.state.write().await;
        state.components.insert(name.to_string(), ComponentHealth::ok());
    }

    /// A call to the component failed
    pub async fn record_failure(&self, name: &str, message: impl Into<String>) {
        let mut state = self.state.write().await;
        let next = match state.components.get(name) {
            Some(current) => current.failed(message.into()),
            None => ComponentHealth::ok().failed(message.into()),
        };
        state.components.insert(name.to_string(), next);
    }

    /// Mark a component unhealthy regardless of its failure count
    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        let mut state = self.state.write().await;
        let mut health = ComponentHealth::ok();
        health.status = ComponentStatus::Unhealthy;
        health.message = Some(message.into());
        state.components.insert(name.to_string(), health);
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: HealthResponse::overall(&state.components),
            components: state.components.clone(),
        }
    }

    /// Ready once started, as long as no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("agent is not serving".to_string()),
            };
        }

        let mut failing: Vec<&str> = state
            .components
            .iter()
            .filter(|(_, c)| c.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect();
        if failing.is_empty() {
            return ReadinessResponse {
                ready: true,
                reason: None,
            };
        }

        failing.sort_unstable();
        ReadinessResponse {
            ready: false,
            reason: Some(format!("unhealthy: {}", failing.join(", "))),
        }
    }
}
