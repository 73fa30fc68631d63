//! Offline scan of recorded metric history

use super::{AnomalyDetector, AnomalyReason, AnomalyState};
use crate::metrics::columns;
use crate::models::AlignedSnapshot;
use crate::resources::ScaleDirection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Windows skipped after a hit so one incident is reported once
const SKIP_AFTER_HIT: usize = 10;

/// Utilization above which scaling up is advised
const ADVISE_UP_ABOVE: f64 = 50.0;

/// Utilization below which scaling down is advised
const ADVISE_DOWN_BELOW: f64 = 30.0;

/// An anomalous window found in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyWindow {
    /// Timestamp of the last row of the window
    pub timestamp: DateTime<Utc>,
    pub reason: AnomalyReason,
    pub cpu_advice: Option<ScaleDirection>,
    pub memory_advice: Option<ScaleDirection>,
    /// The rows the window was classified on
    pub snapshots: Vec<AlignedSnapshot>,
}

/// Walks aligned history in two-row windows looking for anomalies
#[derive(Debug, Clone, Default)]
pub struct HistoryScanner {
    detector: AnomalyDetector,
}

impl HistoryScanner {
    pub fn new(detector: AnomalyDetector) -> Self {
        Self { detector }
    }

    pub fn scan(&self, rows: &[AlignedSnapshot]) -> Vec<AnomalyWindow> {
        let mut found = Vec::new();
        let mut end = 2;

        while end < rows.len() {
            let window = &rows[end - 2..end];
            let mut state = AnomalyState::new();

            if let Some(reason) = self.detector.evaluate(window, &mut state) {
                let last = &window[1];
                found.push(AnomalyWindow {
                    timestamp: last.timestamp,
                    reason,
                    cpu_advice: advise(last.value_or(columns::CPU_UTILIZATION, 0.0)),
                    memory_advice: advise(last.value_or(columns::MEMORY_UTILIZATION, 0.0)),
                    snapshots: window.to_vec(),
                });
                end += SKIP_AFTER_HIT;
            }
            end += 1;
        }

        found
    }
}

fn advise(utilization: f64) -> Option<ScaleDirection> {
    if utilization > ADVISE_UP_ABOVE {
        Some(ScaleDirection::Up)
    } else if utilization < ADVISE_DOWN_BELOW {
        Some(ScaleDirection::Down)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn history(cpu: &[f64]) -> Vec<AlignedSnapshot> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        cpu.iter()
            .enumerate()
            .map(|(i, value)| {
                AlignedSnapshot::new(start + Duration::minutes(i as i64))
                    .with(columns::CPU_UTILIZATION, *value)
                    .with(columns::MEMORY_UTILIZATION, 40.0)
            })
            .collect()
    }

    #[test]
    fn test_scan_reports_window_end_and_advice() {
        let rows = history(&[10.0, 10.0, 70.0, 80.0, 10.0]);
        let found = HistoryScanner::default().scan(&rows);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].timestamp, rows[3].timestamp);
        assert_eq!(found[0].reason, AnomalyReason::SustainedCpu(80.0));
        assert_eq!(found[0].cpu_advice, Some(ScaleDirection::Up));
        assert_eq!(found[0].memory_advice, None);
        assert_eq!(found[0].snapshots.len(), 2);
    }

    #[test]
    fn test_scan_skips_after_hit() {
        let mut cpu = vec![10.0, 10.0];
        cpu.extend(std::iter::repeat(90.0).take(20));
        let rows = history(&cpu);

        let found = HistoryScanner::default().scan(&rows);

        // Hits at windows ending on rows 3 and 14
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].timestamp, rows[3].timestamp);
        assert_eq!(found[1].timestamp, rows[14].timestamp);
    }

    #[test]
    fn test_scan_short_history() {
        let scanner = HistoryScanner::default();
        assert!(scanner.scan(&[]).is_empty());
        assert!(scanner.scan(&history(&[90.0, 90.0])).is_empty());
    }

    #[test]
    fn test_advice_bands() {
        assert_eq!(advise(51.0), Some(ScaleDirection::Up));
        assert_eq!(advise(29.0), Some(ScaleDirection::Down));
        assert_eq!(advise(40.0), None);
    }
}
