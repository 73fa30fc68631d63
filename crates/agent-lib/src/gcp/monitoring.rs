//! Cloud Monitoring v3 `timeSeries.list`

use super::{ensure_success, trim_base, TokenSource};
use crate::error::{MetricFetchFailure, MonitorError, MonitorResult};
use crate::metrics::{Aggregation, MetricBackend};
use crate::models::{MetricSample, MetricSeries, ServiceRef, TimeRange};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Pages fetched per query at most
const MAX_PAGES: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTimeSeriesResponse {
    #[serde(default)]
    time_series: Vec<TimeSeries>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(default)]
    metric: Metric,
    #[serde(default)]
    points: Vec<Point>,
}

#[derive(Debug, Default, Deserialize)]
struct Metric {
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Point {
    interval: Interval,
    value: TypedValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Interval {
    end_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypedValue {
    double_value: Option<f64>,
    /// int64 values are JSON strings
    int64_value: Option<String>,
}

impl TypedValue {
    fn as_f64(&self) -> Option<f64> {
        self.double_value
            .or_else(|| self.int64_value.as_deref().and_then(|v| v.parse().ok()))
    }
}

/// Metric backend backed by the Cloud Monitoring REST API
pub struct CloudMonitoring {
    client: Client,
    base_url: String,
    tokens: Arc<TokenSource>,
}

impl CloudMonitoring {
    pub fn new(client: Client, base_url: &str, tokens: Arc<TokenSource>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
            tokens,
        }
    }

    async fn list(
        &self,
        service: &ServiceRef,
        metric_type: &str,
        window: &TimeRange,
        aggregation: &Aggregation,
    ) -> Result<MetricSeries> {
        let url = format!("{}/v3/projects/{}/timeSeries", self.base_url, service.project_id);
        let params = query_params(service, metric_type, window, aggregation);
        let label_key = aggregation
            .group_by
            .first()
            .map(|field| field.trim_start_matches("metric.label.").to_string());

        let mut samples = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let token = self.tokens.token().await?;
            let mut request = self.client.get(&url).bearer_auth(token);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }
            let response = request
                .query(&params)
                .send()
                .await
                .context("Failed to send timeSeries.list request")?;
            let page: ListTimeSeriesResponse = ensure_success(response)
                .await?
                .json()
                .await
                .context("Failed to parse timeSeries.list response")?;

            for series in page.time_series {
                let label = label_key
                    .as_ref()
                    .and_then(|key| series.metric.labels.get(key).cloned());
                samples.extend(series.points.into_iter().filter_map(|point| {
                    point.value.as_f64().map(|value| MetricSample {
                        timestamp: point.interval.end_time,
                        metric_name: metric_type.to_string(),
                        label: label.clone(),
                        value,
                    })
                }));
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(MetricSeries::new(metric_type, samples))
    }
}

fn query_params(
    service: &ServiceRef,
    metric_type: &str,
    window: &TimeRange,
    aggregation: &Aggregation,
) -> Vec<(&'static str, String)> {
    let filter = format!(
        "metric.type=\"{}\" AND resource.type=\"cloud_run_revision\" \
         AND resource.labels.service_name=\"{}\" AND resource.labels.location=\"{}\"",
        metric_type, service.service_name, service.region
    );

    let mut params = vec![
        ("filter", filter),
        ("interval.startTime", rfc3339(window.start())),
        ("interval.endTime", rfc3339(window.end())),
        (
            "aggregation.alignmentPeriod",
            format!("{}s", aggregation.alignment_period.as_secs()),
        ),
        (
            "aggregation.perSeriesAligner",
            aggregation.aligner.api_name().to_string(),
        ),
        (
            "aggregation.crossSeriesReducer",
            aggregation.reducer.api_name().to_string(),
        ),
    ];
    for field in &aggregation.group_by {
        params.push(("aggregation.groupByFields", field.clone()));
    }
    params
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl MetricBackend for CloudMonitoring {
    async fn query(
        &self,
        service: &ServiceRef,
        metric_type: &str,
        window: &TimeRange,
        aggregation: &Aggregation,
    ) -> MonitorResult<MetricSeries> {
        self.list(service, metric_type, window, aggregation)
            .await
            .map_err(|e| MonitorError::MetricFetch {
                failures: vec![MetricFetchFailure {
                    metric_type: metric_type.to_string(),
                    reason: format!("{:#}", e),
                }],
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{standard_definitions, CPU_UTILIZATION, REQUEST_COUNT};
    use chrono::{Duration, TimeZone};
    use mockito::Matcher;

    fn window() -> TimeRange {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        TimeRange::absolute(start, start + Duration::minutes(5)).unwrap()
    }

    fn service() -> ServiceRef {
        ServiceRef::new("us-central1", "demo", "api")
    }

    fn aggregation(metric_type: &str) -> Aggregation {
        standard_definitions()
            .into_iter()
            .find(|d| d.metric_type == metric_type)
            .unwrap()
            .aggregation()
    }

    fn backend(server: &mockito::Server) -> CloudMonitoring {
        CloudMonitoring::new(
            Client::new(),
            &server.url(),
            Arc::new(TokenSource::fixed("test-token")),
        )
    }

    #[tokio::test]
    async fn test_distribution_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "aggregation.perSeriesAligner".into(),
                    "ALIGN_PERCENTILE_50".into(),
                ),
                Matcher::UrlEncoded("aggregation.crossSeriesReducer".into(), "REDUCE_MEAN".into()),
                Matcher::UrlEncoded("aggregation.alignmentPeriod".into(), "10s".into()),
                Matcher::UrlEncoded("interval.startTime".into(), "2024-03-01T12:00:00Z".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"timeSeries":[{"metric":{"type":"run.googleapis.com/container/cpu/utilizations"},
                    "points":[
                      {"interval":{"startTime":"2024-03-01T12:01:00Z","endTime":"2024-03-01T12:01:10Z"},"value":{"doubleValue":0.61}},
                      {"interval":{"startTime":"2024-03-01T12:00:00Z","endTime":"2024-03-01T12:00:10Z"},"value":{"doubleValue":0.42}}
                    ]}]}"#,
            )
            .create_async()
            .await;

        let series = backend(&server)
            .query(&service(), CPU_UTILIZATION, &window(), &aggregation(CPU_UTILIZATION))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(series.samples.len(), 2);
        assert_eq!(series.samples[0].value, 0.42);
        assert!(series.samples[0].label.is_none());
    }

    #[tokio::test]
    async fn test_scalar_query_follows_pages_and_labels() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_query(Matcher::Regex("^filter=".into()))
            .with_status(200)
            .with_body(
                r#"{"timeSeries":[{"metric":{"labels":{"response_code_class":"2xx"}},
                    "points":[{"interval":{"endTime":"2024-03-01T12:00:10Z"},"value":{"int64Value":"40"}}]}],
                    "nextPageToken":"p2"}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_query(Matcher::Regex("^pageToken=p2&".into()))
            .with_status(200)
            .with_body(
                r#"{"timeSeries":[{"metric":{"labels":{"response_code_class":"5xx"}},
                    "points":[{"interval":{"endTime":"2024-03-01T12:00:10Z"},"value":{"int64Value":"3"}}]}]}"#,
            )
            .create_async()
            .await;

        let series = backend(&server)
            .query(&service(), REQUEST_COUNT, &window(), &aggregation(REQUEST_COUNT))
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        let labels: Vec<_> = series.samples.iter().map(|s| s.label.clone().unwrap()).collect();
        assert_eq!(labels, vec!["2xx", "5xx"]);
        assert_eq!(series.samples[1].value, 3.0);
    }

    #[tokio::test]
    async fn test_api_error_becomes_metric_fetch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("permission denied")
            .create_async()
            .await;

        let err = backend(&server)
            .query(&service(), CPU_UTILIZATION, &window(), &aggregation(CPU_UTILIZATION))
            .await
            .unwrap_err();

        match err {
            MonitorError::MetricFetch { failures } => {
                assert_eq!(failures[0].metric_type, CPU_UTILIZATION);
                assert!(failures[0].reason.contains("permission denied"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_query_params_group_by() {
        let params = query_params(
            &service(),
            REQUEST_COUNT,
            &window(),
            &aggregation(REQUEST_COUNT),
        );
        assert!(params.contains(&(
            "aggregation.groupByFields",
            "metric.label.response_code_class".to_string()
        )));
        assert!(params[0].1.contains("resource.labels.service_name=\"api\""));
    }
}
