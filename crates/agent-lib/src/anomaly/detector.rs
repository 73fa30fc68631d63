//! Hysteresis-based anomaly classification
//!
//! The latest snapshot is checked against hard triggers first (cold
//! starts, instance fan-out, error bursts). Utilization only counts as
//! anomalous after two consecutive breaches.

use crate::metrics::columns;
use crate::models::AlignedSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Thresholds used by [`AnomalyDetector`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    /// Any startup latency above this is a cold start
    pub startup_latency_ms: f64,
    pub active_instances: f64,
    pub client_errors: f64,
    pub server_errors: f64,
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
    /// Consecutive breaches needed before utilization is anomalous
    pub breach_streak: u32,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            startup_latency_ms: 0.0,
            active_instances: 2.0,
            client_errors: 5.0,
            server_errors: 5.0,
            cpu_utilization: 60.0,
            memory_utilization: 60.0,
            breach_streak: 2,
        }
    }
}

/// Consecutive utilization breaches for one service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyState {
    pub cpu_breach_streak: u32,
    pub mem_breach_streak: u32,
}

impl AnomalyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Why a history was classified as anomalous
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "value", rename_all = "snake_case")]
pub enum AnomalyReason {
    ColdStart(f64),
    ActiveInstances(f64),
    ClientErrors(f64),
    ServerErrors(f64),
    SustainedCpu(f64),
    SustainedMemory(f64),
}

impl fmt::Display for AnomalyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyReason::ColdStart(ms) => write!(f, "container cold start ({:.0}ms)", ms),
            AnomalyReason::ActiveInstances(n) => write!(f, "{:.0} active instances", n),
            AnomalyReason::ClientErrors(n) => write!(f, "{:.0} 4xx responses", n),
            AnomalyReason::ServerErrors(n) => write!(f, "{:.0} 5xx responses", n),
            AnomalyReason::SustainedCpu(pct) => write!(f, "sustained CPU utilization ({:.1}%)", pct),
            AnomalyReason::SustainedMemory(pct) => {
                write!(f, "sustained memory utilization ({:.1}%)", pct)
            }
        }
    }
}

/// Classifies aligned metric history
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    /// Whether the history is anomalous
    pub fn classify(&self, history: &[AlignedSnapshot], state: &mut AnomalyState) -> bool {
        self.evaluate(history, state).is_some()
    }

    /// Classify the history and report the first reason found.
    ///
    /// `state` is recomputed over the two most recent snapshots on every call.
    pub fn evaluate(
        &self,
        history: &[AlignedSnapshot],
        state: &mut AnomalyState,
    ) -> Option<AnomalyReason> {
        let latest = history.last()?;
        let t = &self.thresholds;

        let startup = latest.value_or(columns::STARTUP_LATENCY, 0.0);
        if startup > t.startup_latency_ms {
            return Some(AnomalyReason::ColdStart(startup));
        }
        let active = latest.value_or(columns::INSTANCE_COUNT_ACTIVE, 0.0);
        if active > t.active_instances {
            return Some(AnomalyReason::ActiveInstances(active));
        }
        let client_errors = latest.value_or(columns::REQUEST_COUNT_4XX, 0.0);
        if client_errors > t.client_errors {
            return Some(AnomalyReason::ClientErrors(client_errors));
        }
        let server_errors = latest.value_or(columns::REQUEST_COUNT_5XX, 0.0);
        if server_errors > t.server_errors {
            return Some(AnomalyReason::ServerErrors(server_errors));
        }

        if history.len() < 2 {
            return None;
        }

        state.reset();
        for snapshot in &history[history.len() - 2..] {
            let cpu = snapshot.value_or(columns::CPU_UTILIZATION, 0.0);
            let memory = snapshot.value_or(columns::MEMORY_UTILIZATION, 0.0);
            state.cpu_breach_streak = bump(state.cpu_breach_streak, cpu > t.cpu_utilization);
            state.mem_breach_streak = bump(state.mem_breach_streak, memory > t.memory_utilization);
        }

        if state.cpu_breach_streak >= t.breach_streak {
            return Some(AnomalyReason::SustainedCpu(
                latest.value_or(columns::CPU_UTILIZATION, 0.0),
            ));
        }
        if state.mem_breach_streak >= t.breach_streak {
            return Some(AnomalyReason::SustainedMemory(
                latest.value_or(columns::MEMORY_UTILIZATION, 0.0),
            ));
        }
        None
    }
}

fn bump(streak: u32, breached: bool) -> u32 {
    if breached {
        streak + 1
    } else {
        0
    }
}
