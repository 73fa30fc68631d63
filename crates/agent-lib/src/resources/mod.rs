//! Resource limits of a Cloud Run service
//!
//! This module provides:
//! - Parsing and formatting of resource quantities ("4000m", "2Gi")
//! - Hard bounds and coupling rules for CPU/memory pairs
//! - A per-cycle scaler that applies doubling/halving steps with rollback

mod codec;
mod constraints;
mod scaler;

pub use codec::ResourceCodec;
pub use constraints::{
    ConstraintValidator, CPU_TO_MIN_MEMORY, MAX_CPU, MAX_MEMORY_MIB, MEMORY_TO_MIN_CPU, MIN_CPU,
    MIN_MEMORY_MIB,
};
pub use scaler::{ResourceScaler, ScaleDirection, ScaleOutcome};

use crate::error::MonitorResult;
use crate::models::{ResourceSpec, ServiceRef};
use async_trait::async_trait;

/// Control plane that owns a service's resource limits
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Read the current limits of the service's first container
    async fn get_resource_spec(&self, service: &ServiceRef) -> MonitorResult<ResourceSpec>;

    /// Replace the limits of the service's first container
    async fn update_resource_spec(
        &self,
        service: &ServiceRef,
        spec: ResourceSpec,
    ) -> MonitorResult<()>;
}
