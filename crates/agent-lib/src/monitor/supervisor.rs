//! Ownership of the per-service monitor tasks

use super::{LoopPhase, MonitorConfig, MonitorContext, Registry, ServiceMonitor};
use crate::error::MonitorResult;
use crate::health::HealthRegistry;
use crate::metrics::{LogBackend, MetricBackend};
use crate::models::{ChannelRef, Registration, ServiceRef};
use crate::notify::{Notifier, Summarizer};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::resources::ControlPlane;
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct MonitorHandle {
    cancel: watch::Sender<bool>,
    phase: watch::Receiver<LoopPhase>,
    task: JoinHandle<()>,
}

/// Starts, tracks and stops one monitor loop per registered service
pub struct MonitorSupervisor {
    ctx: MonitorContext,
    config: MonitorConfig,
    handles: DashMap<ServiceRef, MonitorHandle>,
}

impl MonitorSupervisor {
    pub fn new(ctx: MonitorContext, config: MonitorConfig) -> Self {
        Self {
            ctx,
            config,
            handles: DashMap::new(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Register a service for a channel.
    ///
    /// Starts a loop, whose first tick runs immediately, unless another
    /// channel already has the service monitored.
    pub async fn register(&self, registration: Registration) -> MonitorResult<()> {
        self.ctx.registry.insert(registration.clone()).await?;
        self.ctx.logger.log_service_registered(&registration);
        if !self.is_running(&registration.service) {
            self.spawn(registration.service);
        }
        Ok(())
    }

    /// Unregister a service owned by `channel`.
    ///
    /// The loop is signalled to stop once no channel owns the service. A
    /// tick already in progress completes; no further tick is scheduled.
    pub async fn unregister(
        &self,
        channel: &ChannelRef,
        service: &ServiceRef,
    ) -> MonitorResult<Registration> {
        let removed = self.ctx.registry.remove(channel, service).await?;
        self.ctx
            .logger
            .log_service_unregistered(service, &channel.channel_id);

        // On a registry error the loop stops by itself once it sees no owner
        if !self.ctx.registry.is_registered(service).await.unwrap_or(true) {
            if let Some((_, handle)) = self.handles.remove(service) {
                handle.cancel.send_replace(true);
            }
        }
        self.update_gauge();
        Ok(removed)
    }

    /// Start a loop for every stored service without one; returns how many started
    pub async fn resume(&self) -> MonitorResult<usize> {
        let mut started = 0;
        for registration in self.ctx.registry.list().await? {
            if self.is_running(&registration.service) {
                continue;
            }
            self.spawn(registration.service);
            started += 1;
        }
        info!(started = started, "Resumed registered services");
        Ok(started)
    }

    /// Registrations owned by a channel
    pub async fn list_for_channel(&self, channel: &ChannelRef) -> MonitorResult<Vec<Registration>> {
        Ok(self
            .ctx
            .registry
            .list()
            .await?
            .into_iter()
            .filter(|r| r.channel == *channel)
            .collect())
    }

    /// Services with a loop that has not terminated
    pub fn monitored(&self) -> Vec<ServiceRef> {
        let mut services: Vec<ServiceRef> = self
            .handles
            .iter()
            .filter(|e| *e.value().phase.borrow() != LoopPhase::Terminated)
            .map(|e| e.key().clone())
            .collect();
        services.sort();
        services
    }

    pub fn phase(&self, service: &ServiceRef) -> Option<LoopPhase> {
        self.handles.get(service).map(|h| *h.phase.borrow())
    }

    /// Receiver following a service's loop phase
    pub fn watch_phase(&self, service: &ServiceRef) -> Option<watch::Receiver<LoopPhase>> {
        self.handles.get(service).map(|h| h.phase.clone())
    }

    /// Cancel every loop and wait for them to finish
    pub async fn shutdown(&self) {
        let services: Vec<ServiceRef> = self.handles.iter().map(|e| e.key().clone()).collect();
        let mut tasks = Vec::with_capacity(services.len());

        for service in services {
            if let Some((_, handle)) = self.handles.remove(&service) {
                handle.cancel.send_replace(true);
                tasks.push((service, handle.task));
            }
        }
        for (service, task) in tasks {
            if let Err(e) = task.await {
                debug!(service = %service, error = %e, "Monitor task ended abnormally");
            }
        }
        self.update_gauge();
        info!("All service monitors stopped");
    }

    fn is_running(&self, service: &ServiceRef) -> bool {
        self.handles
            .get(service)
            .map(|h| *h.phase.borrow() != LoopPhase::Terminated)
            .unwrap_or(false)
    }

    fn spawn(&self, service: ServiceRef) {
        let monitor = ServiceMonitor::new(service.clone(), self.ctx.clone(), self.config.clone());
        let phase = monitor.subscribe();
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(monitor.run(cancel_rx));

        if let Some(previous) = self.handles.insert(
            service,
            MonitorHandle {
                cancel,
                phase,
                task,
            },
        ) {
            previous.cancel.send_replace(true);
        }
        self.update_gauge();
    }

    fn update_gauge(&self) {
        self.ctx.metrics.set_services_monitored(self.monitored().len() as i64);
    }
}

/// Builder for the supervisor and its collaborators
pub struct MonitorSupervisorBuilder {
    metric_backend: Option<Arc<dyn MetricBackend>>,
    log_backend: Option<Arc<dyn LogBackend>>,
    control_plane: Option<Arc<dyn ControlPlane>>,
    notifier: Option<Arc<dyn Notifier>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    registry: Option<Arc<dyn Registry>>,
    health: Option<HealthRegistry>,
    logger: StructuredLogger,
    config: MonitorConfig,
}

impl MonitorSupervisorBuilder {
    pub fn new() -> Self {
        Self {
            metric_backend: None,
            log_backend: None,
            control_plane: None,
            notifier: None,
            summarizer: None,
            registry: None,
            health: None,
            logger: StructuredLogger::new("autoscale-agent"),
            config: MonitorConfig::default(),
        }
    }

    pub fn metric_backend(mut self, backend: Arc<dyn MetricBackend>) -> Self {
        self.metric_backend = Some(backend);
        self
    }

    pub fn log_backend(mut self, backend: Arc<dyn LogBackend>) -> Self {
        self.log_backend = Some(backend);
        self
    }

    pub fn control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the delay between ticks
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the minimum spacing between summaries
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    pub fn build(self) -> Result<MonitorSupervisor> {
        let ctx = MonitorContext {
            metric_backend: self
                .metric_backend
                .ok_or_else(|| anyhow::anyhow!("Metric backend is required"))?,
            log_backend: self
                .log_backend
                .ok_or_else(|| anyhow::anyhow!("Log backend is required"))?,
            control_plane: self
                .control_plane
                .ok_or_else(|| anyhow::anyhow!("Control plane is required"))?,
            notifier: self
                .notifier
                .ok_or_else(|| anyhow::anyhow!("Notifier is required"))?,
            summarizer: self
                .summarizer
                .ok_or_else(|| anyhow::anyhow!("Summarizer is required"))?,
            registry: self
                .registry
                .ok_or_else(|| anyhow::anyhow!("Registry is required"))?,
            health: self.health,
            metrics: AgentMetrics::new(),
            logger: self.logger,
        };
        Ok(MonitorSupervisor::new(ctx, self.config))
    }
}

impl Default for MonitorSupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
