//! Offline anomaly report over recorded metric history

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, ScanRequest, ScanResponse, Snapshot};
use crate::output::{format_advice, print_info, print_json, print_table, OutputFormat};

/// A history file is either a bare list of snapshots or a scan request
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryFile {
    Snapshots(Vec<Snapshot>),
    Request(ScanRequest),
}

#[derive(Tabled)]
struct WindowRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

/// Read snapshots from a JSON history file
pub fn read_history(path: &Path) -> Result<Vec<Snapshot>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let history: HistoryFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(match history {
        HistoryFile::Snapshots(snapshots) => snapshots,
        HistoryFile::Request(request) => request.snapshots,
    })
}

/// Scan a history file for anomalous windows
pub async fn scan(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let snapshots = read_history(file)?;
    let count = snapshots.len();
    let response: ScanResponse = client
        .post("api/v1/reports/scan", &ScanRequest { snapshots })
        .await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_info(&format!(
                "Scanned {} snapshots, {} anomalous windows",
                count,
                response.windows.len()
            ));
            let rows: Vec<WindowRow> = response
                .windows
                .iter()
                .map(|w| WindowRow {
                    timestamp: w.timestamp.clone(),
                    reason: w.reason.reason.replace('_', " "),
                    value: format!("{:.1}", w.reason.value),
                    cpu: format_advice(w.cpu_advice.as_deref()),
                    memory: format_advice(w.memory_advice.as_deref()),
                })
                .collect();
            print_table(&rows, "No anomalies found");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_bare_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"timestamp":"2024-03-01T12:00:00Z","values":{"Instance Count (active)":1.0}}]"#,
        )
        .unwrap();

        let snapshots = read_history(&path).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].values["Instance Count (active)"], 1.0);
    }

    #[test]
    fn test_read_request_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"{"snapshots":[{"timestamp":"2024-03-01T12:00:00Z","values":{}},
                             {"timestamp":"2024-03-01T12:01:00Z","values":{}}]}"#,
        )
        .unwrap();

        assert_eq!(read_history(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(read_history(&path).is_err());
    }
}
