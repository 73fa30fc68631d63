//! Merge of several metric series into per-minute snapshots

use super::MetricDefinition;
use crate::models::{floor_to_minute, AlignedSnapshot, MetricSeries};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Outer-joins metric series on minute timestamps
pub struct MetricAligner;

impl MetricAligner {
    /// Align every series into rows ascending by minute.
    ///
    /// Several samples of one column inside the same minute are averaged.
    /// A column missing from a minute is simply absent from that row.
    pub fn align(inputs: &[(MetricDefinition, MetricSeries)]) -> Vec<AlignedSnapshot> {
        let mut buckets: BTreeMap<DateTime<Utc>, BTreeMap<String, (f64, u32)>> = BTreeMap::new();

        for (definition, series) in inputs {
            for sample in &series.samples {
                let column = definition.column_for(sample.label.as_deref());
                let minute = floor_to_minute(sample.timestamp);
                let entry = buckets
                    .entry(minute)
                    .or_default()
                    .entry(column)
                    .or_insert((0.0, 0));
                entry.0 += sample.value * definition.scale_factor;
                entry.1 += 1;
            }
        }

        buckets
            .into_iter()
            .map(|(timestamp, columns)| AlignedSnapshot {
                timestamp,
                values: columns
                    .into_iter()
                    .map(|(column, (sum, count))| (column, sum / f64::from(count)))
                    .collect(),
            })
            .collect()
    }

    /// Remove rows lacking any column seen anywhere in the table.
    ///
    /// Columns named in `tolerated` may be missing without dropping the row.
    pub fn drop_incomplete(rows: Vec<AlignedSnapshot>, tolerated: &[&str]) -> Vec<AlignedSnapshot> {
        let required: BTreeSet<String> = rows
            .iter()
            .flat_map(|row| row.values.keys())
            .filter(|column| !tolerated.contains(&column.as_str()))
            .cloned()
            .collect();

        rows.into_iter()
            .filter(|row| required.iter().all(|column| row.values.contains_key(column)))
            .collect()
    }
}
