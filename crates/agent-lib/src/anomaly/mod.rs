//! Anomaly detection for Cloud Run services
//!
//! This module provides:
//! - Hysteresis classification of aligned metric history
//! - A per-service cooldown gating summaries
//! - An offline scan of recorded history for anomalous windows

mod cooldown;
mod detector;
mod scan;

pub use cooldown::{CooldownRecord, DEFAULT_COOLDOWN};
pub use detector::{AnomalyDetector, AnomalyReason, AnomalyState, AnomalyThresholds};
pub use scan::{AnomalyWindow, HistoryScanner};
