//! Vertex AI text prediction

use super::{ensure_success, trim_base, TokenSource};
use crate::error::{MonitorError, MonitorResult};
use crate::notify::Summarizer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Wait before the single retry of a failed prediction
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(50);

/// Sampling parameters sent with every prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexParameters {
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for VertexParameters {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 1024,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    content: String,
}

/// Summarizer calling a Vertex AI text model
pub struct VertexSummarizer {
    client: Client,
    base_url: String,
    project_id: String,
    region: String,
    model: String,
    parameters: VertexParameters,
    retry_delay: Duration,
    tokens: Arc<TokenSource>,
}

impl VertexSummarizer {
    pub fn new(
        client: Client,
        base_url: &str,
        project_id: impl Into<String>,
        region: impl Into<String>,
        model: impl Into<String>,
        tokens: Arc<TokenSource>,
    ) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
            project_id: project_id.into(),
            region: region.into(),
            model: model.into(),
            parameters: VertexParameters::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
            tokens,
        }
    }

    pub fn with_parameters(mut self, parameters: VertexParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn predict(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            self.base_url, self.project_id, self.region, self.model
        );
        let body = json!({
            "instances": [{"prompt": prompt}],
            "parameters": self.parameters,
        });

        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("Failed to send predict request")?;
        let parsed: PredictResponse = ensure_success(response)
            .await?
            .json()
            .await
            .context("Failed to parse predict response")?;

        parsed
            .predictions
            .into_iter()
            .next()
            .map(|p| p.content)
            .context("Prediction response was empty")
    }
}

#[async_trait]
impl Summarizer for VertexSummarizer {
    async fn generate(&self, context: &str) -> MonitorResult<String> {
        match self.predict(context).await {
            Ok(text) => Ok(text),
            Err(first) => {
                warn!(
                    error = %format!("{:#}", first),
                    retry_in_secs = self.retry_delay.as_secs(),
                    "Prediction failed, retrying once"
                );
                tokio::time::sleep(self.retry_delay).await;
                self.predict(context)
                    .await
                    .map_err(|e| MonitorError::Summarizer(format!("{:#}", e)))
            }
        }
    }
}
