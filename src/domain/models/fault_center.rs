//! FaultCenter entity (spec.md §3 "FaultCenter").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    Rule,
    None,
}

/// A fault center: identity `(tenant_id, fault_center_id)`. Owns a rule set,
/// an aggregation mode, and the runtime parameters that drive its recovery
/// loop (spec §3, Open Question 3 in SPEC_FULL.md §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultCenter {
    pub tenant_id: String,
    pub fault_center_id: String,
    pub name: String,
    pub aggregation_mode: AggregationMode,
    /// Idle window on `last_eval_time` after which an Alerting event flips
    /// to Recovered (glossary: `silenceGap`). `None` means "unset"; the
    /// topology loader resolves it via [`FaultCenter::default_silence_gap`]
    /// against the center's fastest enabled rule (SPEC_FULL.md §7.3).
    #[serde(default)]
    pub recovery_silence_gap: Option<chrono::Duration>,
    /// How often the recovery loop scans this center's events.
    pub recovery_scan_interval: chrono::Duration,
    /// Floor under the dispatcher's cycle period (spec §4.6: "bounded below by a floor").
    pub dispatch_floor: chrono::Duration,
}

impl FaultCenter {
    /// Default `silenceGap` when unset: `3 * evalInterval` of the center's
    /// fastest rule, per SPEC_FULL.md §7.3.
    #[must_use]
    pub fn default_silence_gap(fastest_eval_interval: chrono::Duration) -> chrono::Duration {
        fastest_eval_interval * 3
    }

    /// Resolve the effective silence gap: the explicit value if set,
    /// otherwise [`Self::default_silence_gap`] against `fastest_eval_interval`
    /// (the center's fastest enabled rule, or a conservative fallback if it
    /// has none yet).
    #[must_use]
    pub fn effective_silence_gap(&self, fastest_eval_interval: chrono::Duration) -> chrono::Duration {
        self.recovery_silence_gap.unwrap_or_else(|| Self::default_silence_gap(fastest_eval_interval))
    }
}
