//! Cloud Logging v2 `entries:list`

use super::{ensure_success, trim_base, TokenSource};
use crate::error::{MonitorError, MonitorResult};
use crate::metrics::LogBackend;
use crate::models::{ServiceRef, TimeRange};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const PAGE_SIZE: u32 = 200;
const MAX_PAGES: usize = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesRequest<'a> {
    resource_names: Vec<String>,
    filter: &'a str,
    order_by: &'static str,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesResponse {
    #[serde(default)]
    entries: Vec<LogEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry {
    text_payload: Option<String>,
    json_payload: Option<Value>,
    proto_payload: Option<Value>,
}

impl LogEntry {
    fn into_line(self) -> Option<String> {
        self.text_payload
            .or_else(|| self.json_payload.map(|v| v.to_string()))
            .or_else(|| self.proto_payload.map(|v| v.to_string()))
    }
}

/// Log backend backed by the Cloud Logging REST API
pub struct CloudLogging {
    client: Client,
    base_url: String,
    tokens: Arc<TokenSource>,
}

impl CloudLogging {
    pub fn new(client: Client, base_url: &str, tokens: Arc<TokenSource>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
            tokens,
        }
    }

    async fn list(&self, service: &ServiceRef, window: &TimeRange) -> Result<Vec<String>> {
        let url = format!("{}/v2/entries:list", self.base_url);
        let filter = error_filter(service, window);
        let mut lines = Vec::new();
        let mut page_token = None;

        for _ in 0..MAX_PAGES {
            let body = ListEntriesRequest {
                resource_names: vec![format!("projects/{}", service.project_id)],
                filter: &filter,
                order_by: "timestamp asc",
                page_size: PAGE_SIZE,
                page_token: page_token.take(),
            };
            let token = self.tokens.token().await?;
            let response = self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .context("Failed to send entries:list request")?;
            let page: ListEntriesResponse = ensure_success(response)
                .await?
                .json()
                .await
                .context("Failed to parse entries:list response")?;

            lines.extend(page.entries.into_iter().filter_map(LogEntry::into_line));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(lines)
    }
}

/// Error-level entries, plus stdout lines mentioning ERROR, of one service
fn error_filter(service: &ServiceRef, window: &TimeRange) -> String {
    format!(
        "resource.type=\"cloud_run_revision\"\n\
         resource.labels.service_name=\"{}\"\n\
         timestamp>=\"{}\"\n\
         timestamp<\"{}\"\n\
         (severity>=ERROR OR \"ERROR\")",
        service.service_name,
        window.start().to_rfc3339_opts(SecondsFormat::Secs, true),
        window.end().to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

#[async_trait]
impl LogBackend for CloudLogging {
    async fn query(&self, service: &ServiceRef, window: &TimeRange) -> MonitorResult<Vec<String>> {
        self.list(service, window)
            .await
            .map_err(|e| MonitorError::LogFetch(format!("{:#}", e)))
    }
}
