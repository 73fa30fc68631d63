//! Per-service monitor loop
//!
//! Each registered service gets one task running this loop, however many
//! channels own it. A tick polls the metrics, classifies them, asks for a
//! summary when anomalous (at most once per cooldown window) and applies
//! the scaling vote. Messages go to every owning channel. The loop sleeps
//! `poll_interval` between ticks and stops once no channel owns the
//! service or cancellation is signalled.

use super::Registry;
use crate::anomaly::{
    AnomalyDetector, AnomalyReason, AnomalyState, AnomalyThresholds, CooldownRecord,
    DEFAULT_COOLDOWN,
};
use crate::decision::{ScaleVote, ScalingDecider, VoteThresholds};
use crate::error::MonitorError;
use crate::health::{components, HealthRegistry};
use crate::metrics::{LogBackend, MetricBackend, MetricPoller, PollerConfig, DEFAULT_FETCH_TIMEOUT};
use crate::models::{AlignedSnapshot, Registration, ResourceKind, ServiceRef, TimeRange};
use crate::notify::{self, Notifier, Summarizer};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::resources::{ControlPlane, ResourceScaler, ScaleDirection, ScaleOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration shared by every service monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between the end of one tick and the start of the next (default: 30 seconds)
    pub poll_interval: Duration,
    /// Metric history evaluated per tick (default: 5 minutes)
    pub window_minutes: u32,
    /// Upper bound for each metric query (default: 20 seconds)
    pub fetch_timeout: Duration,
    /// Minimum spacing between anomaly summaries (default: 10 minutes)
    pub cooldown: Duration,
    pub anomaly_thresholds: AnomalyThresholds,
    pub vote_thresholds: VoteThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            window_minutes: 5,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cooldown: DEFAULT_COOLDOWN,
            anomaly_thresholds: AnomalyThresholds::default(),
            vote_thresholds: VoteThresholds::default(),
        }
    }
}

/// External collaborators of the monitor loops
#[derive(Clone)]
pub struct MonitorContext {
    pub metric_backend: Arc<dyn MetricBackend>,
    pub log_backend: Arc<dyn LogBackend>,
    pub control_plane: Arc<dyn ControlPlane>,
    pub notifier: Arc<dyn Notifier>,
    pub summarizer: Arc<dyn Summarizer>,
    pub registry: Arc<dyn Registry>,
    pub health: Option<HealthRegistry>,
    pub metrics: AgentMetrics,
    pub logger: StructuredLogger,
}

/// Where a monitor loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Scheduled,
    Evaluating,
    Terminated,
}

/// A scaling step that was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedStep {
    pub kind: ResourceKind,
    pub direction: ScaleDirection,
    pub error: String,
}

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// The service was no longer registered; nothing else was done
    pub terminated: bool,
    pub poll_error: Option<String>,
    pub rows: usize,
    pub anomaly: Option<AnomalyReason>,
    pub summarized: bool,
    pub vote: Option<ScaleVote>,
    pub applied: Vec<ScaleOutcome>,
    /// Axes whose step was corrected back to the current limits
    pub unchanged: Vec<ResourceKind>,
    pub rejected: Vec<RejectedStep>,
}

/// Monitor loop for a single registered service
pub struct ServiceMonitor {
    service: ServiceRef,
    /// Owning channels as of the latest registry check
    owners: Vec<Registration>,
    ctx: MonitorContext,
    config: MonitorConfig,
    poller: MetricPoller,
    detector: AnomalyDetector,
    decider: ScalingDecider,
    state: AnomalyState,
    cooldown: CooldownRecord,
    phase: watch::Sender<LoopPhase>,
}

impl ServiceMonitor {
    pub fn new(service: ServiceRef, ctx: MonitorContext, config: MonitorConfig) -> Self {
        let poller = MetricPoller::new(
            ctx.metric_backend.clone(),
            PollerConfig {
                fetch_timeout: config.fetch_timeout,
                ..PollerConfig::default()
            },
        );
        let (phase, _) = watch::channel(LoopPhase::Scheduled);

        Self {
            service,
            owners: Vec::new(),
            poller,
            detector: AnomalyDetector::new(config.anomaly_thresholds),
            decider: ScalingDecider::new(config.vote_thresholds),
            state: AnomalyState::new(),
            cooldown: CooldownRecord::new(config.cooldown),
            phase,
            ctx,
            config,
        }
    }

    pub fn service(&self) -> &ServiceRef {
        &self.service
    }

    /// Receiver observing this loop's phase
    pub fn subscribe(&self) -> watch::Receiver<LoopPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: LoopPhase) {
        self.phase.send_replace(phase);
    }

    /// Run ticks until unregistered or cancelled.
    ///
    /// Cancellation never interrupts a tick in progress; the loop exits
    /// after it instead of sleeping again.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        let service = self.service.clone();
        info!(
            service = %service,
            interval_secs = self.config.poll_interval.as_secs(),
            "Starting service monitor"
        );

        loop {
            if *cancel.borrow_and_update() {
                break;
            }

            let report = self.evaluate().await;
            if report.terminated || *cancel.borrow() {
                break;
            }

            self.set_phase(LoopPhase::Scheduled);
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.changed() => {
                    debug!(service = %service, "Monitor cancelled while waiting");
                    break;
                }
            }
        }

        self.set_phase(LoopPhase::Terminated);
        info!(service = %service, "Service monitor stopped");
    }

    /// Perform one tick
    pub async fn evaluate(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let service = self.service.clone();

        match self.ctx.registry.owners(&service).await {
            Ok(owners) if owners.is_empty() => {
                report.terminated = true;
                return report;
            }
            Ok(owners) => self.owners = owners,
            Err(e) => {
                warn!(service = %service, error = %e, "Registry check failed, evaluating anyway");
            }
        }

        self.set_phase(LoopPhase::Evaluating);
        let started = Instant::now();

        let window = TimeRange::last_minutes(self.config.window_minutes);
        let rows = match self.poller.poll(&service, &window).await {
            Ok(rows) => {
                self.set_health(components::METRIC_BACKEND, None).await;
                rows
            }
            Err(e) => {
                let error = e.to_string();
                self.ctx.logger.log_metric_fetch_failed(&service, &error);
                self.ctx.metrics.inc_poll_failures();
                self.set_health(components::METRIC_BACKEND, Some(&error)).await;
                report.poll_error = Some(error);
                self.ctx.metrics.observe_evaluation(started.elapsed().as_secs_f64());
                return report;
            }
        };
        report.rows = rows.len();

        let Some(latest) = rows.last() else {
            debug!(service = %service, "No complete metric rows in window");
            self.ctx.metrics.observe_evaluation(started.elapsed().as_secs_f64());
            return report;
        };

        report.anomaly = self.detector.evaluate(&rows, &mut self.state);
        if let Some(reason) = report.anomaly {
            self.ctx.metrics.inc_anomalies_detected();
            if self.cooldown.is_ready() {
                report.summarized = self.summarize(&reason, &rows).await;
            } else {
                debug!(
                    service = %service,
                    remaining_secs = self.cooldown.remaining().as_secs(),
                    "Summary suppressed by cooldown"
                );
            }
            self.ctx.logger.log_anomaly(&service, &reason, report.summarized);
        }

        let vote = self.decider.vote(latest);
        report.vote = Some(vote);
        self.apply_vote(vote, &mut report).await;

        self.ctx.metrics.observe_evaluation(started.elapsed().as_secs_f64());
        report
    }

    /// Collect logs, summarize and notify; true if a summary was delivered to the notifier
    async fn summarize(&mut self, reason: &AnomalyReason, rows: &[AlignedSnapshot]) -> bool {
        let service = &self.service;

        let logs = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => match TimeRange::covering(first.timestamp, last.timestamp)
            {
                Ok(range) => self
                    .ctx
                    .log_backend
                    .query(service, &range)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(service = %service, error = %e, "Log fetch failed, summarizing without logs");
                        Vec::new()
                    }),
                Err(e) => {
                    warn!(service = %service, error = %e, "Invalid log window");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let context = notify::summary_context(service, reason, rows, &logs);
        match self.ctx.summarizer.generate(&context).await {
            Ok(summary) => {
                self.cooldown.stamp();
                self.ctx.metrics.inc_summaries_generated();
                let message = notify::anomaly_message(service, reason, &summary);
                self.notify(&message).await;
                true
            }
            Err(e) => {
                warn!(service = %service, error = %e, "Summary generation failed");
                false
            }
        }
    }

    async fn apply_vote(&self, vote: ScaleVote, report: &mut TickReport) {
        let service = &self.service;
        let mut scaler = ResourceScaler::new(self.ctx.control_plane.clone(), service.clone());

        for (kind, direction) in vote.directions() {
            match scaler.scale(kind, direction).await {
                Ok(None) => {
                    self.set_health(components::CONTROL_PLANE, None).await;
                    report.unchanged.push(kind);
                }
                Ok(Some(outcome)) => {
                    self.ctx.metrics.inc_scale_action(kind, direction, true);
                    self.ctx
                        .logger
                        .log_scale_action(service, kind, direction, vote.get(kind), None);
                    self.set_health(components::CONTROL_PLANE, None).await;
                    self.notify(&notify::scale_message(service, &outcome)).await;
                    report.applied.push(outcome);
                }
                Err(e) => {
                    let error = e.to_string();
                    self.ctx.metrics.inc_scale_action(kind, direction, false);
                    self.ctx.logger.log_scale_action(
                        service,
                        kind,
                        direction,
                        vote.get(kind),
                        Some(&error),
                    );
                    if matches!(e, MonitorError::ControlPlane(_)) {
                        self.set_health(components::CONTROL_PLANE, Some(&error)).await;
                    }
                    self.notify(&notify::scale_failure_message(service, kind, direction, &e))
                        .await;
                    report.rejected.push(RejectedStep {
                        kind,
                        direction,
                        error,
                    });
                }
            }
        }
    }

    /// Deliver a message to every owner; failures are logged and never abort the tick
    async fn notify(&self, message: &str) {
        for owner in &self.owners {
            match self.ctx.notifier.send(owner, message).await {
                Ok(()) => self.set_health(components::NOTIFIER, None).await,
                Err(e) => {
                    warn!(
                        service = %self.service,
                        channel_id = %owner.channel.channel_id,
                        error = %e,
                        "Failed to deliver notification"
                    );
                    self.ctx.metrics.inc_notify_failures();
                    self.set_health(components::NOTIFIER, Some(&e.to_string()))
                        .await;
                }
            }
        }
    }

    async fn set_health(&self, component: &str, problem: Option<&str>) {
        if let Some(health) = &self.ctx.health {
            match problem {
                None => health.record_success(component).await,
                Some(message) => health.record_failure(component, message).await,
            }
        }
    }
}
