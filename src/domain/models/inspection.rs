//! Exporter Inspection entities (spec.md §3, §4.8 C8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-tenant exporter-inspection schedule configuration (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionConfig {
    pub tenant_id: String,
    pub enabled: bool,
    pub datasource_ids: Vec<String>,
    /// `HH:MM` times of day the inspection runs.
    pub inspection_times: Vec<String>,
    pub history_retention_days: i64,
    pub auto_refresh: bool,
}

/// One batch inspection roll-up over a datasource's targets (spec §4.8 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub batch_id: String,
    pub tenant_id: String,
    pub datasource_id: String,
    pub total: u32,
    pub up: u32,
    pub down: u32,
    pub unknown: u32,
    /// `round(up / total * 100, 2)` per spec §8.
    pub availability: f64,
    /// Up to 10 down-target summaries.
    pub down_summary: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Inspection {
    /// Invariant: `up + down + unknown == total` and availability rounds to 2dp.
    #[must_use]
    pub fn invariant_holds(&self) -> bool {
        self.up + self.down + self.unknown == self.total
    }
}

/// One target's classification within an inspection batch (spec §4.8 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionDetail {
    pub batch_id: String,
    pub instance: String,
    pub job: String,
    pub health: super::datasource::TargetHealthState,
    pub last_error: String,
}

/// Round to 2 decimal places (spec §8 "availability ... round(..., 2)").
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_matches_spec_example() {
        // spec §8 scenario 5: 8/10 -> 80.00
        assert!((round2(8.0 / 10.0 * 100.0) - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invariant_sum_equals_total() {
        let insp = Inspection {
            batch_id: "b1".into(),
            tenant_id: "t1".into(),
            datasource_id: "d1".into(),
            total: 10,
            up: 8,
            down: 1,
            unknown: 1,
            availability: 80.0,
            down_summary: vec![],
            created_at: Utc::now(),
        };
        assert!(insp.invariant_holds());
    }
}
