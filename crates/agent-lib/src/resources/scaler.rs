//! Per-cycle resource scaling
//!
//! A `ResourceScaler` lives for one evaluation cycle. It reads the current
//! limits from the control plane at most once, then applies doubling or
//! halving steps per axis. A failed step restores the cached value so the
//! other axis starts from the real state. A step that the coupling rules
//! correct back to the current limits is dropped without touching the
//! control plane.

use super::{ConstraintValidator, ControlPlane};
use crate::error::MonitorResult;
use crate::models::{ResourceKind, ResourceSpec, ServiceRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Direction of a scaling step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    /// Direction implied by the sign of a vote; zero means no action
    pub fn from_vote(vote: i32) -> Option<Self> {
        match vote.signum() {
            1 => Some(ScaleDirection::Up),
            -1 => Some(ScaleDirection::Down),
            _ => None,
        }
    }

    fn apply(self, value: u32) -> u32 {
        match self {
            ScaleDirection::Up => value.saturating_mul(2),
            ScaleDirection::Down => value / 2,
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleDirection::Up => write!(f, "up"),
            ScaleDirection::Down => write!(f, "down"),
        }
    }
}

/// A scaling step that reached the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleOutcome {
    pub kind: ResourceKind,
    pub direction: ScaleDirection,
    pub previous: ResourceSpec,
    pub applied: ResourceSpec,
}

/// Applies scale steps for one service within one evaluation cycle
pub struct ResourceScaler {
    control_plane: Arc<dyn ControlPlane>,
    validator: ConstraintValidator,
    service: ServiceRef,
    current: Option<ResourceSpec>,
}

impl ResourceScaler {
    pub fn new(control_plane: Arc<dyn ControlPlane>, service: ServiceRef) -> Self {
        Self {
            control_plane,
            validator: ConstraintValidator::new(),
            service,
            current: None,
        }
    }

    /// Cached limits for this cycle, if already loaded
    pub fn current(&self) -> Option<ResourceSpec> {
        self.current
    }

    /// Load the limits from the control plane unless already loaded this cycle
    async fn ensure_loaded(&mut self) -> MonitorResult<ResourceSpec> {
        if let Some(spec) = self.current {
            return Ok(spec);
        }
        let spec = self.control_plane.get_resource_spec(&self.service).await?;
        debug!(
            service = %self.service,
            cpu = spec.cpu,
            memory_mib = spec.memory_mib,
            "Loaded current resource limits"
        );
        self.current = Some(spec);
        Ok(spec)
    }

    pub async fn scale_up(&mut self, kind: ResourceKind) -> MonitorResult<Option<ScaleOutcome>> {
        self.scale(kind, ScaleDirection::Up).await
    }

    pub async fn scale_down(&mut self, kind: ResourceKind) -> MonitorResult<Option<ScaleOutcome>> {
        self.scale(kind, ScaleDirection::Down).await
    }

    /// Double or halve one axis and push the result to the control plane.
    ///
    /// Returns `Ok(None)` when the corrected limits equal the current ones.
    pub async fn scale(
        &mut self,
        kind: ResourceKind,
        direction: ScaleDirection,
    ) -> MonitorResult<Option<ScaleOutcome>> {
        let origin = self.ensure_loaded().await?;
        let requested = origin.with(kind, direction.apply(origin.get(kind)));
        self.current = Some(requested);

        match self.apply(origin, requested).await {
            Ok(None) => {
                self.current = Some(origin);
                debug!(
                    service = %self.service,
                    resource = %kind,
                    direction = %direction,
                    "Scaling step corrected back to current limits, nothing to apply"
                );
                Ok(None)
            }
            Ok(Some(applied)) => {
                self.current = Some(applied);
                info!(
                    service = %self.service,
                    resource = %kind,
                    direction = %direction,
                    cpu = applied.cpu,
                    memory_mib = applied.memory_mib,
                    "Applied resource scaling step"
                );
                Ok(Some(ScaleOutcome {
                    kind,
                    direction,
                    previous: origin,
                    applied,
                }))
            }
            Err(e) => {
                self.current = Some(origin);
                warn!(
                    service = %self.service,
                    resource = %kind,
                    direction = %direction,
                    error = %e,
                    "Scaling step rejected, keeping previous limits"
                );
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        origin: ResourceSpec,
        requested: ResourceSpec,
    ) -> MonitorResult<Option<ResourceSpec>> {
        self.validator.check(requested.cpu, requested.memory_mib)?;
        let (cpu, memory_mib) = self
            .validator
            .auto_correct(requested.cpu, requested.memory_mib);
        let corrected = ResourceSpec::new(cpu, memory_mib);
        if corrected == origin {
            return Ok(None);
        }

        self.control_plane
            .update_resource_spec(&self.service, corrected)
            .await?;
        Ok(Some(corrected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConstraintViolation, MonitorError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock control plane recording every update
    struct MockControlPlane {
        spec: Mutex<ResourceSpec>,
        reads: AtomicUsize,
        fail_updates: AtomicBool,
        updates: Mutex<Vec<ResourceSpec>>,
    }

    impl MockControlPlane {
        fn new(spec: ResourceSpec) -> Self {
            Self {
                spec: Mutex::new(spec),
                reads: AtomicUsize::new(0),
                fail_updates: AtomicBool::new(false),
                updates: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ControlPlane for MockControlPlane {
        async fn get_resource_spec(&self, _service: &ServiceRef) -> MonitorResult<ResourceSpec> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(*self.spec.lock().unwrap())
        }

        async fn update_resource_spec(
            &self,
            _service: &ServiceRef,
            spec: ResourceSpec,
        ) -> MonitorResult<()> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(MonitorError::ControlPlane("update rejected".to_string()));
            }
            *self.spec.lock().unwrap() = spec;
            self.updates.lock().unwrap().push(spec);
            Ok(())
        }
    }

    fn service() -> ServiceRef {
        ServiceRef::new("us-central1", "demo", "api")
    }

    #[tokio::test]
    async fn test_scale_up_doubles_cpu() {
        let cp = Arc::new(MockControlPlane::new(ResourceSpec::new(1, 1024)));
        let mut scaler = ResourceScaler::new(cp.clone(), service());

        let outcome = scaler.scale_up(ResourceKind::Cpu).await.unwrap().unwrap();

        assert_eq!(outcome.previous, ResourceSpec::new(1, 1024));
        assert_eq!(outcome.applied, ResourceSpec::new(2, 1024));
        assert_eq!(cp.updates.lock().unwrap().as_slice(), &[ResourceSpec::new(2, 1024)]);
    }

    #[tokio::test]
    async fn test_scale_down_halves_memory() {
        let cp = Arc::new(MockControlPlane::new(ResourceSpec::new(1, 2048)));
        let mut scaler = ResourceScaler::new(cp.clone(), service());

        let outcome = scaler.scale_down(ResourceKind::Memory).await.unwrap().unwrap();
        assert_eq!(outcome.applied, ResourceSpec::new(1, 1024));
    }

    #[tokio::test]
    async fn test_scale_applies_coupling_correction() {
        // 2 -> 4 cores needs at least 2048Mi
        let cp = Arc::new(MockControlPlane::new(ResourceSpec::new(2, 1024)));
        let mut scaler = ResourceScaler::new(cp.clone(), service());

        let outcome = scaler.scale_up(ResourceKind::Cpu).await.unwrap().unwrap();
        assert_eq!(outcome.applied, ResourceSpec::new(4, 2048));
        assert_eq!(scaler.current(), Some(ResourceSpec::new(4, 2048)));
    }

    #[tokio::test]
    async fn test_control_plane_error_rolls_back() {
        let cp = Arc::new(MockControlPlane::new(ResourceSpec::new(2, 1024)));
        cp.fail_updates.store(true, Ordering::SeqCst);
        let mut scaler = ResourceScaler::new(cp.clone(), service());

        let err = scaler.scale_up(ResourceKind::Cpu).await.unwrap_err();

        assert!(matches!(err, MonitorError::ControlPlane(_)));
        assert_eq!(scaler.current(), Some(ResourceSpec::new(2, 1024)));
        assert!(cp.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_constraint_violation_rolls_back() {
        let cp = Arc::new(MockControlPlane::new(ResourceSpec::new(8, 4096)));
        let mut scaler = ResourceScaler::new(cp.clone(), service());

        let err = scaler.scale_up(ResourceKind::Cpu).await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::ResourceConstraintViolation(ConstraintViolation::CpuTooLarge { .. })
        ));
        assert_eq!(scaler.current(), Some(ResourceSpec::new(8, 4096)));
        assert!(cp.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_step_corrected_to_current_limits_is_skipped() {
        let cp = Arc::new(MockControlPlane::new(ResourceSpec::new(8, 4096)));
        let mut scaler = ResourceScaler::new(cp.clone(), service());

        // 8 cores keep a 4096Mi floor, so halving memory changes nothing
        let outcome = scaler.scale_down(ResourceKind::Memory).await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(scaler.current(), Some(ResourceSpec::new(8, 4096)));
        assert!(cp.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_axis_does_not_affect_other_axis() {
        let cp = Arc::new(MockControlPlane::new(ResourceSpec::new(1, 512)));
        let mut scaler = ResourceScaler::new(cp.clone(), service());

        // 1 core cannot be halved
        assert!(scaler.scale_down(ResourceKind::Cpu).await.is_err());
        let outcome = scaler.scale_up(ResourceKind::Memory).await.unwrap().unwrap();

        assert_eq!(outcome.previous, ResourceSpec::new(1, 512));
        assert_eq!(outcome.applied, ResourceSpec::new(1, 1024));
    }

    #[tokio::test]
    async fn test_limits_read_once_per_cycle() {
        let cp = Arc::new(MockControlPlane::new(ResourceSpec::new(2, 1024)));
        let mut scaler = ResourceScaler::new(cp.clone(), service());

        scaler.scale_up(ResourceKind::Cpu).await.unwrap();
        scaler.scale_up(ResourceKind::Memory).await.unwrap();
        assert_eq!(cp.reads.load(Ordering::SeqCst), 1);

        // A new cycle reads fresh limits
        let mut next_cycle = ResourceScaler::new(cp.clone(), service());
        next_cycle.scale_down(ResourceKind::Cpu).await.unwrap();
        assert_eq!(cp.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_direction_from_vote() {
        assert_eq!(ScaleDirection::from_vote(3), Some(ScaleDirection::Up));
        assert_eq!(ScaleDirection::from_vote(-2), Some(ScaleDirection::Down));
        assert_eq!(ScaleDirection::from_vote(0), None);
    }
}
