//! AlertEvent entity and state machine (spec.md §3 "AlertEvent", §4.4 state transitions).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of an alert episode. Monotonic within an episode:
/// `PreAlert -> Alerting -> Recovered -> (deleted)` (spec invariant ii).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    PreAlert,
    Alerting,
    Recovered,
}

/// User confirmation/close state attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmState {
    pub confirmed_by: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Link to the silence currently suppressing dispatch of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilenceInfo {
    pub silence_id: String,
}

/// Fields enriched from external sources (duty roster, CMDB) during dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedFields {
    pub duty_users: Vec<String>,
    pub cmdb_owners: Vec<String>,
}

/// The event store's unique identity: `(tenant_id, fault_center_id, fingerprint)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub tenant_id: String,
    pub fault_center_id: String,
    pub fingerprint: String,
}

/// An alert episode tracked by the Event Store (spec §3 "AlertEvent").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub key: EventKey,
    pub event_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: super::rule::Severity,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub first_trigger_time: DateTime<Utc>,
    pub last_eval_time: DateTime<Utc>,
    /// `0` (represented as `None`) until first dispatch (invariant iii).
    pub last_send_time: Option<DateTime<Utc>>,
    pub recover_time: Option<DateTime<Utc>>,
    pub status: EventStatus,
    pub is_recovered: bool,
    pub confirm: Option<ConfirmState>,
    pub silence: Option<SilenceInfo>,
    pub enriched: EnrichedFields,
    /// Set when produced by the rule evaluator, `None` for third-party events.
    pub value: Option<f64>,
}

impl AlertEvent {
    /// Invariant (iv): `recover_time > 0 <=> is_recovered`.
    #[must_use]
    pub fn invariant_holds(&self) -> bool {
        self.recover_time.is_some() == self.is_recovered
            && (self.recover_time.is_some() == (self.status == EventStatus::Recovered))
    }

    pub fn mark_recovered(&mut self, now: DateTime<Utc>) {
        self.is_recovered = true;
        self.recover_time = Some(now);
        self.status = EventStatus::Recovered;
    }

    pub fn promote_to_alerting(&mut self) {
        self.status = EventStatus::Alerting;
    }
}
