//! Cloud Run Autoscaler CLI
//!
//! A command-line tool for registering services with the autoscale agent,
//! checking its health and scanning recorded metric history for anomalies.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{health, report, services};
use std::path::PathBuf;

/// Cloud Run Autoscaler CLI
#[derive(Parser)]
#[command(name = "cra")]
#[command(author, version, about = "CLI for the Cloud Run Autoscaler agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via CRA_API_URL env var)
    #[arg(long, env = "CRA_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage monitored services
    #[command(subcommand)]
    Services(ServicesCommands),

    /// Show agent health
    Health,

    /// Reports over recorded metric history
    #[command(subcommand)]
    Report(ReportCommands),
}

/// Channel that owns registrations
#[derive(Args)]
pub struct ChannelArgs {
    /// Guild ID (falls back to default_guild in the config file)
    #[arg(long, env = "CRA_GUILD")]
    pub guild: Option<String>,

    /// Channel ID (falls back to default_channel in the config file)
    #[arg(long, env = "CRA_CHANNEL")]
    pub channel: Option<String>,
}

/// A Cloud Run service
#[derive(Args)]
pub struct ServiceArgs {
    /// Service name
    pub service: String,

    /// Google Cloud project ID
    #[arg(long, short)]
    pub project: String,

    /// Cloud Run region
    #[arg(long, short, default_value = "us-central1")]
    pub region: String,
}

impl ServiceArgs {
    fn service_ref(&self) -> client::ServiceRef {
        client::ServiceRef {
            region: self.region.clone(),
            project_id: self.project.clone(),
            service_name: self.service.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum ServicesCommands {
    /// Start monitoring a service
    Register {
        #[command(flatten)]
        target: ServiceArgs,

        #[command(flatten)]
        channel: ChannelArgs,
    },

    /// Stop monitoring a service
    Unregister {
        #[command(flatten)]
        target: ServiceArgs,

        #[command(flatten)]
        channel: ChannelArgs,
    },

    /// List services monitored for a channel
    List {
        #[command(flatten)]
        channel: ChannelArgs,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Scan a JSON history file for anomalous windows
    Scan {
        /// History file: a list of snapshots or {"snapshots": [...]}
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;

    // Initialize client
    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    // Execute command
    match cli.command {
        Commands::Services(services_cmd) => match services_cmd {
            ServicesCommands::Register { target, channel } => {
                let (guild, channel) = config.resolve_channel(channel.guild, channel.channel)?;
                services::register(&client, &guild, &channel, &target.service_ref(), cli.format)
                    .await?;
            }
            ServicesCommands::Unregister { target, channel } => {
                let (guild, channel) = config.resolve_channel(channel.guild, channel.channel)?;
                services::unregister(&client, &guild, &channel, &target.service_ref(), cli.format)
                    .await?;
            }
            ServicesCommands::List { channel } => {
                let (guild, channel) = config.resolve_channel(channel.guild, channel.channel)?;
                services::list(&client, &guild, &channel, cli.format).await?;
            }
        },
        Commands::Health => {
            health::show(&client, cli.format).await?;
        }
        Commands::Report(report_cmd) => match report_cmd {
            ReportCommands::Scan { file } => {
                report::scan(&client, &file, cli.format).await?;
            }
        },
    }

    Ok(())
}
