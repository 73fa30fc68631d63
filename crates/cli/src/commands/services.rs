//! Service registration commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{service_path, services_path, ApiClient, Registration, ServiceRef};
use crate::output::{print_json, print_success, print_table, OutputFormat};

/// Row for the registered services table
#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Registered")]
    registered_at: String,
}

impl From<&Registration> for ServiceRow {
    fn from(r: &Registration) -> Self {
        Self {
            service: r.service.service_name.clone(),
            project: r.service.project_id.clone(),
            region: r.service.region.clone(),
            registered_at: r.registered_at.clone(),
        }
    }
}

/// Start monitoring a service from a channel
pub async fn register(
    client: &ApiClient,
    guild: &str,
    channel: &str,
    service: &ServiceRef,
    format: OutputFormat,
) -> Result<()> {
    let registration: Registration = client
        .post(&service_path(guild, channel, service), &serde_json::json!({}))
        .await?;

    match format {
        OutputFormat::Json => print_json(&registration)?,
        OutputFormat::Table => print_success(&format!(
            "Monitoring {} ({}, {}) for channel {}",
            registration.service.service_name,
            registration.service.project_id,
            registration.service.region,
            registration.channel.channel_id
        )),
    }
    Ok(())
}

/// Stop monitoring a service owned by a channel
pub async fn unregister(
    client: &ApiClient,
    guild: &str,
    channel: &str,
    service: &ServiceRef,
    format: OutputFormat,
) -> Result<()> {
    let removed: Registration = client.delete(&service_path(guild, channel, service)).await?;

    match format {
        OutputFormat::Json => print_json(&removed)?,
        OutputFormat::Table => print_success(&format!(
            "Stopped monitoring {}",
            removed.service.service_name
        )),
    }
    Ok(())
}

/// List the services a channel monitors
pub async fn list(client: &ApiClient, guild: &str, channel: &str, format: OutputFormat) -> Result<()> {
    let registrations: Vec<Registration> = client.get(&services_path(guild, channel)).await?;

    match format {
        OutputFormat::Json => print_json(&registrations)?,
        OutputFormat::Table => {
            let rows: Vec<ServiceRow> = registrations.iter().map(ServiceRow::from).collect();
            print_table(&rows, "No services registered for this channel");
        }
    }
    Ok(())
}
