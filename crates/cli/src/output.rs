//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: &[T], empty_message: &str) {
    if rows.is_empty() {
        println!("{}", empty_message.yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "up" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "down" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Render an optional scaling advice
pub fn format_advice(advice: Option<&str>) -> String {
    match advice {
        Some(direction) => color_status(direction),
        None => "-".to_string(),
    }
}
