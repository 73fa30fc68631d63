//! Concurrent polling of every tracked metric

use super::{columns, standard_definitions, MetricAligner, MetricBackend, MetricDefinition};
use crate::error::{MetricFetchFailure, MonitorError, MonitorResult};
use crate::models::{AlignedSnapshot, MetricSeries, ServiceRef, TimeRange};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Per-query timeout used when none is configured
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Poller configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Upper bound for each individual query
    pub fetch_timeout: Duration,
    /// Columns allowed to be missing from an aligned row
    pub tolerated_columns: Vec<&'static str>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            tolerated_columns: vec![columns::STARTUP_LATENCY],
        }
    }
}

/// Fetches all metric definitions for a service and aligns the results
pub struct MetricPoller {
    backend: Arc<dyn MetricBackend>,
    definitions: Vec<MetricDefinition>,
    config: PollerConfig,
}

impl MetricPoller {
    pub fn new(backend: Arc<dyn MetricBackend>, config: PollerConfig) -> Self {
        Self {
            backend,
            definitions: standard_definitions(),
            config,
        }
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    /// Query every metric concurrently and merge them into complete rows.
    ///
    /// Waits for all queries. Fails if any of them failed or timed out,
    /// naming each failed metric.
    pub async fn poll(
        &self,
        service: &ServiceRef,
        window: &TimeRange,
    ) -> MonitorResult<Vec<AlignedSnapshot>> {
        let mut tasks = JoinSet::new();

        for (index, definition) in self.definitions.iter().enumerate() {
            let backend = self.backend.clone();
            let service = service.clone();
            let window = *window;
            let metric_type = definition.metric_type;
            let aggregation = definition.aggregation();
            let timeout = self.config.fetch_timeout;

            tasks.spawn(async move {
                let result = tokio::time::timeout(
                    timeout,
                    backend.query(&service, metric_type, &window, &aggregation),
                )
                .await;
                let outcome = match result {
                    Ok(Ok(series)) => Ok(series),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
                };
                (index, outcome)
            });
        }

        let mut results: Vec<Option<Result<MetricSeries, String>>> =
            vec![None; self.definitions.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => results[index] = Some(outcome),
                Err(e) => warn!(error = %e, "Metric query task aborted"),
            }
        }

        let mut inputs = Vec::with_capacity(self.definitions.len());
        let mut failures = Vec::new();
        for (definition, result) in self.definitions.iter().zip(results) {
            match result {
                Some(Ok(series)) => inputs.push((definition.clone(), series)),
                Some(Err(reason)) => failures.push(MetricFetchFailure {
                    metric_type: definition.metric_type.to_string(),
                    reason,
                }),
                None => failures.push(MetricFetchFailure {
                    metric_type: definition.metric_type.to_string(),
                    reason: "query task did not complete".to_string(),
                }),
            }
        }

        if !failures.is_empty() {
            return Err(MonitorError::MetricFetch { failures });
        }

        let rows = MetricAligner::align(&inputs);
        let total = rows.len();
        let rows = MetricAligner::drop_incomplete(rows, &self.config.tolerated_columns);
        debug!(
            service = %service,
            window_minutes = window.minutes(),
            rows = rows.len(),
            dropped = total - rows.len(),
            "Polled service metrics"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Aggregation, CPU_UTILIZATION, MEMORY_UTILIZATION, STARTUP_LATENCIES};
    use crate::models::MetricSample;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend returning one sample per minute for every metric
    struct MockBackend {
        calls: AtomicUsize,
        failing: HashSet<&'static str>,
        slow: HashSet<&'static str>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: HashSet::new(),
                slow: HashSet::new(),
            }
        }
    }

    #[async_trait]
    impl MetricBackend for MockBackend {
        async fn query(
            &self,
            _service: &ServiceRef,
            metric_type: &str,
            window: &TimeRange,
            _aggregation: &Aggregation,
        ) -> MonitorResult<MetricSeries> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.slow.contains(metric_type) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.failing.contains(metric_type) {
                return Err(MonitorError::MetricFetch {
                    failures: vec![MetricFetchFailure {
                        metric_type: metric_type.to_string(),
                        reason: "HTTP 503".to_string(),
                    }],
                });
            }

            let label = match metric_type {
                crate::metrics::REQUEST_COUNT => Some("2xx".to_string()),
                crate::metrics::INSTANCE_COUNT => Some("active".to_string()),
                _ => None,
            };
            let samples = (0..window.minutes())
                .filter(|m| metric_type != STARTUP_LATENCIES || *m == 0)
                .map(|m| MetricSample {
                    timestamp: window.start() + ChronoDuration::minutes(m),
                    metric_name: metric_type.to_string(),
                    label: label.clone(),
                    value: 0.5,
                })
                .collect();
            Ok(MetricSeries::new(metric_type, samples))
        }
    }

    fn window() -> TimeRange {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        TimeRange::absolute(start, start + ChronoDuration::minutes(5)).unwrap()
    }

    fn service() -> ServiceRef {
        ServiceRef::new("us-central1", "demo", "api")
    }

    #[tokio::test]
    async fn test_poll_queries_all_metrics() {
        let backend = Arc::new(MockBackend::new());
        let poller = MetricPoller::new(backend.clone(), PollerConfig::default());

        let rows = poller.poll(&service(), &window()).await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
        assert_eq!(rows.len(), 5);
        // Startup latency only reported in the first minute
        assert!(rows[0].get(columns::STARTUP_LATENCY).is_some());
        assert!(rows[4].get(columns::STARTUP_LATENCY).is_none());
        assert_eq!(rows[4].get(columns::CPU_UTILIZATION), Some(50.0));
        assert_eq!(rows[4].get(columns::INSTANCE_COUNT_ACTIVE), Some(0.5));
    }

    #[tokio::test]
    async fn test_poll_names_every_failed_metric() {
        let mut backend = MockBackend::new();
        backend.failing.insert(CPU_UTILIZATION);
        backend.failing.insert(MEMORY_UTILIZATION);
        let poller = MetricPoller::new(Arc::new(backend), PollerConfig::default());

        let err = poller.poll(&service(), &window()).await.unwrap_err();

        match err {
            MonitorError::MetricFetch { failures } => {
                let names: Vec<_> = failures.iter().map(|f| f.metric_type.as_str()).collect();
                assert_eq!(names, vec![CPU_UTILIZATION, MEMORY_UTILIZATION]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_slow_query() {
        let mut backend = MockBackend::new();
        backend.slow.insert(STARTUP_LATENCIES);
        let backend = Arc::new(backend);
        let poller = MetricPoller::new(
            backend.clone(),
            PollerConfig {
                fetch_timeout: Duration::from_secs(5),
                ..PollerConfig::default()
            },
        );

        let err = poller.poll(&service(), &window()).await.unwrap_err();

        match err {
            MonitorError::MetricFetch { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].metric_type, STARTUP_LATENCIES);
                assert!(failures[0].reason.contains("timed out"));
            }
            other => panic!("unexpected error: {}", other),
        }
        // Every other query still ran to completion
        assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
    }
}
