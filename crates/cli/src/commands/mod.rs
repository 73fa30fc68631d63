//! CLI subcommands

pub mod health;
pub mod report;
pub mod services;
