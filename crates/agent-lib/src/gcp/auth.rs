//! OAuth access tokens for Google APIs

use super::ensure_success;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Where bearer tokens come from
pub enum TokenSource {
    /// A fixed token, e.g. from `gcloud auth print-access-token`
    Static(String),
    /// The instance metadata server, cached until shortly before expiry
    Metadata {
        client: Client,
        url: String,
        cached: Mutex<Option<(String, Instant)>>,
    },
}

impl TokenSource {
    pub fn fixed(token: impl Into<String>) -> Self {
        TokenSource::Static(token.into())
    }

    pub fn metadata(client: Client, url: impl Into<String>) -> Self {
        TokenSource::Metadata {
            client,
            url: url.into(),
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata {
                client,
                url,
                cached,
            } => {
                let mut cached = cached.lock().await;
                if let Some((token, expires_at)) = cached.as_ref() {
                    if Instant::now() + REFRESH_MARGIN < *expires_at {
                        return Ok(token.clone());
                    }
                }

                let response = client
                    .get(url.as_str())
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .context("Failed to reach metadata server")?;
                let response = ensure_success(response).await?;
                let body: TokenResponse = response
                    .json()
                    .await
                    .context("Failed to parse metadata token")?;

                debug!(expires_in = body.expires_in, "Refreshed access token");
                let expires_at = Instant::now() + Duration::from_secs(body.expires_in);
                *cached = Some((body.access_token.clone(), expires_at));
                Ok(body.access_token)
            }
        }
    }
}
