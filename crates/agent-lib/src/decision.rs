//! Scaling votes from the latest metric snapshot
//!
//! Every signal adds -1, 0 or +1 to one or both axes. Votes are summed
//! without clamping and only their sign matters.

use crate::metrics::columns;
use crate::models::{AlignedSnapshot, ResourceKind};
use crate::resources::ScaleDirection;
use serde::{Deserialize, Serialize};

/// A high/low threshold pair; values strictly outside the band vote
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub high: f64,
    pub low: f64,
}

impl Band {
    pub const fn new(high: f64, low: f64) -> Self {
        Self { high, low }
    }

    fn vote(&self, value: f64) -> i32 {
        if value > self.high {
            1
        } else if value < self.low {
            -1
        } else {
            0
        }
    }
}

/// Thresholds and defaults used by [`ScalingDecider`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoteThresholds {
    pub cpu_utilization: Band,
    pub memory_utilization: Band,
    pub request_count: Band,
    pub request_latency_ms: Band,
    pub active_instances: Band,
    /// Startup latency above this votes up on both axes; exactly zero votes down
    pub startup_latency_ms: f64,
    /// Used when the snapshot has no request count columns
    pub default_request_count: f64,
    /// Used when the snapshot has no active instance column
    pub default_active_instances: f64,
}

impl Default for VoteThresholds {
    fn default() -> Self {
        Self {
            cpu_utilization: Band::new(50.0, 30.0),
            memory_utilization: Band::new(50.0, 30.0),
            request_count: Band::new(100.0, 50.0),
            request_latency_ms: Band::new(100.0, 50.0),
            active_instances: Band::new(2.0, 1.0),
            startup_latency_ms: 100.0,
            default_request_count: 50.0,
            default_active_instances: 1.0,
        }
    }
}

/// Signed per-axis vote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleVote {
    pub cpu: i32,
    pub memory: i32,
}

impl ScaleVote {
    pub fn get(&self, kind: ResourceKind) -> i32 {
        match kind {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Memory => self.memory,
        }
    }

    /// Direction per axis; axes with a zero vote are left out
    pub fn directions(&self) -> Vec<(ResourceKind, ScaleDirection)> {
        [ResourceKind::Cpu, ResourceKind::Memory]
            .into_iter()
            .filter_map(|kind| ScaleDirection::from_vote(self.get(kind)).map(|d| (kind, d)))
            .collect()
    }

    fn add_both(&mut self, vote: i32) {
        self.cpu += vote;
        self.memory += vote;
    }
}

/// Turns a snapshot into a scaling vote
#[derive(Debug, Clone, Default)]
pub struct ScalingDecider {
    thresholds: VoteThresholds,
}

impl ScalingDecider {
    pub fn new(thresholds: VoteThresholds) -> Self {
        Self { thresholds }
    }

    pub fn vote(&self, snapshot: &AlignedSnapshot) -> ScaleVote {
        let t = &self.thresholds;
        let mut vote = ScaleVote::default();

        if let Some(cpu) = snapshot.get(columns::CPU_UTILIZATION) {
            vote.cpu += t.cpu_utilization.vote(cpu);
        }
        if let Some(memory) = snapshot.get(columns::MEMORY_UTILIZATION) {
            vote.memory += t.memory_utilization.vote(memory);
        }

        let requests = snapshot
            .sum_labeled(columns::REQUEST_COUNT)
            .unwrap_or(t.default_request_count);
        vote.add_both(t.request_count.vote(requests));

        let latency = snapshot.value_or(columns::REQUEST_LATENCY, 0.0);
        vote.cpu += t.request_latency_ms.vote(latency);

        let instances = snapshot.value_or(
            columns::INSTANCE_COUNT_ACTIVE,
            t.default_active_instances,
        );
        vote.add_both(t.active_instances.vote(instances));

        let startup = snapshot.value_or(columns::STARTUP_LATENCY, 0.0);
        if startup > t.startup_latency_ms {
            vote.add_both(1);
        } else if startup == 0.0 {
            vote.add_both(-1);
        }

        vote
    }
}
