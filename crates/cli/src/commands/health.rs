//! Agent health command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Failures")]
    failures: u32,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show the agent's component health
pub async fn show(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{} {}", "Agent:".bold(), color_status(&health.status));

            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&component.status),
                    failures: component.consecutive_failures,
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            print_table(&rows, "No components reported");
        }
    }
    Ok(())
}
