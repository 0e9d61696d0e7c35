//! Per-check outage aggregation and SLO error budgets.

use crate::model::{Check, OutageInterval};

/// Prefix of tags carrying a per-check uptime SLO (`uptime_slo_999` = 99.9%).
pub const SLO_TAG_PREFIX: &str = "uptime_slo_";

/// Figures derived from one check's outage summary.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregation {
    pub outages: f64,
    pub uptime_seconds: f64,
    pub downtime_seconds: f64,
    /// Maximum downtime the SLO allows over the window.
    pub error_budget_seconds: f64,
    /// Budget minus actual downtime. Negative once the SLO is breached.
    pub available_error_budget_seconds: f64,
}

/// Decodes one SLO tag name. The digits carry one implied decimal place.
fn decode_slo_tag(name: &str) -> Option<f64> {
    let digits = name.strip_prefix(SLO_TAG_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let slo = digits.parse::<u64>().ok()? as f64 / 10.0;
    (slo <= 100.0).then_some(slo)
}

impl Check {
    /// SLO from the first well-formed `uptime_slo_*` tag, else `default_slo`.
    pub fn uptime_slo(&self, default_slo: f64) -> f64 {
        self.all_tags()
            .find_map(|t| decode_slo_tag(&t.name))
            .unwrap_or(default_slo)
    }
}

/// Maximum tolerated downtime over `window_seconds` at `slo` percent.
pub fn error_budget(window_seconds: f64, slo: f64) -> f64 {
    window_seconds * (100.0 - slo) / 100.0
}

/// Sums the outage summary of one check.
///
/// Intervals are taken in the order received. `down` spans count as an
/// outage and add to downtime, `up` spans add to uptime, anything else is
/// skipped.
pub fn aggregate(
    check: &Check,
    intervals: &[OutageInterval],
    window_seconds: f64,
    default_slo: f64,
) -> Aggregation {
    let budget = error_budget(window_seconds, check.uptime_slo(default_slo));

    let mut agg = Aggregation {
        error_budget_seconds: budget,
        ..Default::default()
    };
    for interval in intervals {
        match interval.status.as_str() {
            "down" => {
                agg.outages += 1.0;
                agg.downtime_seconds += interval.duration_seconds();
            }
            "up" => agg.uptime_seconds += interval.duration_seconds(),
            _ => {}
        }
    }
    agg.available_error_budget_seconds = budget - agg.downtime_seconds;
    agg
}
