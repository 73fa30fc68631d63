//! Cloud Run Admin v2 resource limits

use super::{ensure_success, trim_base, TokenSource};
use crate::error::{MonitorError, MonitorResult};
use crate::models::{ResourceKind, ResourceSpec, ServiceRef};
use crate::resources::{ControlPlane, ResourceCodec};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Control plane backed by the Cloud Run Admin REST API
pub struct CloudRunAdmin {
    client: Client,
    base_url: String,
    tokens: Arc<TokenSource>,
}

impl CloudRunAdmin {
    pub fn new(client: Client, base_url: &str, tokens: Arc<TokenSource>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
            tokens,
        }
    }

    fn service_url(&self, service: &ServiceRef) -> String {
        format!("{}/v2/{}", self.base_url, service.full_name())
    }

    async fn fetch_service(&self, service: &ServiceRef) -> Result<Value> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(self.service_url(service))
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send services.get request")?;
        ensure_success(response)
            .await?
            .json()
            .await
            .context("Failed to parse service")
    }

    async fn patch_limits(&self, service: &ServiceRef, spec: ResourceSpec) -> Result<()> {
        let mut body = self.fetch_service(service).await?;
        let container = body
            .pointer_mut("/template/containers/0")
            .ok_or_else(|| anyhow!("service {} has no containers", service))?;
        container["resources"]["limits"] = json!({
            "cpu": ResourceCodec::format(spec.cpu, ResourceKind::Cpu),
            "memory": ResourceCodec::format(spec.memory_mib, ResourceKind::Memory),
        });

        let token = self.tokens.token().await?;
        let response = self
            .client
            .patch(self.service_url(service))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("Failed to send services.patch request")?;
        ensure_success(response).await?;

        info!(
            service = %service,
            cpu = spec.cpu,
            memory_mib = spec.memory_mib,
            "Submitted resource limit update"
        );
        Ok(())
    }
}

/// Read `template.containers[0].resources.limits` from a service
fn limits_of(service: &Value) -> MonitorResult<ResourceSpec> {
    let limits = service
        .pointer("/template/containers/0/resources/limits")
        .ok_or_else(|| MonitorError::ControlPlane("service has no resource limits".to_string()))?;
    let quantity = |key: &str| -> MonitorResult<u32> {
        let raw = limits
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| MonitorError::ControlPlane(format!("missing {} limit", key)))?;
        ResourceCodec::parse(raw)
    };
    Ok(ResourceSpec::new(quantity("cpu")?, quantity("memory")?))
}

#[async_trait]
impl ControlPlane for CloudRunAdmin {
    async fn get_resource_spec(&self, service: &ServiceRef) -> MonitorResult<ResourceSpec> {
        let body = self
            .fetch_service(service)
            .await
            .map_err(|e| MonitorError::ControlPlane(format!("{:#}", e)))?;
        limits_of(&body)
    }

    async fn update_resource_spec(
        &self,
        service: &ServiceRef,
        spec: ResourceSpec,
    ) -> MonitorResult<()> {
        self.patch_limits(service, spec)
            .await
            .map_err(|e| MonitorError::ControlPlane(format!("{:#}", e)))
    }
}
