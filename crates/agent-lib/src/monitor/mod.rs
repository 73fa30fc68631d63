//! Service monitoring
//!
//! This module ties the pipeline together: a registry of monitored
//! services, one cancellable loop per service, and a supervisor that owns
//! those loops.

mod r#loop;
mod registry;
mod supervisor;


pub use r#loop::{
    LoopPhase, MonitorConfig, MonitorContext, RejectedStep, ServiceMonitor, TickReport,
};
pub use registry::{Registry, ServiceRegistry};
pub use supervisor::{MonitorSupervisor, MonitorSupervisorBuilder};
