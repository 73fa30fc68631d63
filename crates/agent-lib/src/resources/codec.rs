//! Resource quantity parsing
//!
//! Cloud Run reports limits as Kubernetes-style quantities. CPU is carried
//! in millicores and normalized to whole cores, memory in `Gi` or `Mi` and
//! normalized to MiB.

use crate::error::{MonitorError, MonitorResult};
use crate::models::ResourceKind;

/// Converts between quantity strings and normalized integer units
pub struct ResourceCodec;

impl ResourceCodec {
    /// Parse a quantity into whole cores (`m`) or MiB (`Gi`, `Mi`)
    pub fn parse(quantity: &str) -> MonitorResult<u32> {
        let quantity = quantity.trim();

        if let Some(millis) = quantity.strip_suffix('m') {
            return Ok(parse_number(millis, quantity)? / 1000);
        }
        if let Some(gib) = quantity.strip_suffix("Gi") {
            return parse_number(gib, quantity)?
                .checked_mul(1024)
                .ok_or_else(|| MonitorError::InvalidQuantity(quantity.to_string()));
        }
        if let Some(mib) = quantity.strip_suffix("Mi") {
            return parse_number(mib, quantity);
        }

        Err(MonitorError::InvalidQuantity(quantity.to_string()))
    }

    /// Render a normalized value back into a quantity string
    pub fn format(value: u32, kind: ResourceKind) -> String {
        match kind {
            ResourceKind::Cpu => format!("{}m", u64::from(value) * 1000),
            ResourceKind::Memory if value % 1024 == 0 => format!("{}Gi", value / 1024),
            ResourceKind::Memory => format!("{}Mi", value),
        }
    }
}

fn parse_number(digits: &str, quantity: &str) -> MonitorResult<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MonitorError::InvalidQuantity(quantity.to_string()));
    }
    digits
        .parse::<u32>()
        .map_err(|_| MonitorError::InvalidQuantity(quantity.to_string()))
}
