//! Rule entity (spec.md §3 "Rule").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity levels ordered low to high; `Ord` derives the natural ordering
/// used when the dispatcher groups events by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    P3,
    P2,
    P1,
}

/// Comparison operator for a rule's threshold predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparator {
    /// Evaluate `sample <comparator> threshold`. NaN never violates
    /// (spec §4.4 "Numeric comparison ... NaN treated as non-violating").
    #[must_use]
    pub fn violates(self, sample: f64, threshold: f64) -> bool {
        if sample.is_nan() {
            return false;
        }
        match self {
            Comparator::Gt => sample > threshold,
            Comparator::Ge => sample >= threshold,
            Comparator::Lt => sample < threshold,
            Comparator::Le => sample <= threshold,
            Comparator::Eq => (sample - threshold).abs() < f64::EPSILON,
            Comparator::Ne => (sample - threshold).abs() >= f64::EPSILON,
        }
    }
}

/// A daily/weekly window during which a rule is allowed to fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveTimeWindow {
    /// Minutes since midnight, inclusive.
    pub start_minute: u32,
    /// Minutes since midnight, exclusive.
    pub end_minute: u32,
    /// ISO weekday numbers (1=Mon..7=Sun) this window applies to; empty = every day.
    pub weekdays: Vec<u8>,
}

impl EffectiveTimeWindow {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        use chrono::{Datelike, Timelike};
        if !self.weekdays.is_empty() {
            let iso_weekday = at.weekday().number_from_monday() as u8;
            if !self.weekdays.contains(&iso_weekday) {
                return false;
            }
        }
        let minute_of_day = at.hour() * 60 + at.minute();
        minute_of_day >= self.start_minute && minute_of_day < self.end_minute
    }
}

/// A calendar of effective-time windows; empty means "always effective".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectiveCalendar {
    pub windows: Vec<EffectiveTimeWindow>,
}

impl EffectiveCalendar {
    #[must_use]
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        self.windows.is_empty() || self.windows.iter().any(|w| w.contains(at))
    }
}

/// A rule: identity `(tenant_id, rule_id)` per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub tenant_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub fault_center_id: String,
    pub datasource_ids: Vec<String>,
    pub eval_interval: chrono::Duration,
    pub for_duration: chrono::Duration,
    pub repeat_notice_interval: chrono::Duration,
    pub severity: Severity,
    pub effective_calendar: EffectiveCalendar,
    /// Query expression passed verbatim to the datasource.
    pub query: String,
    pub comparator: Comparator,
    pub threshold: f64,
    /// Label keys from the sample used to build the fingerprint/labels,
    /// e.g. `["instance", "job"]`. Order is insignificant (canonicalized).
    pub label_template: Vec<String>,
    /// Static annotations merged into every event this rule produces.
    pub annotations: BTreeMap<String, String>,
    /// Notice (notification target) this rule's events are routed to.
    pub notice_id: Option<String>,
    pub enabled: bool,
}

impl Rule {
    #[must_use]
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        self.enabled && self.effective_calendar.is_effective_at(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_never_violates() {
        assert!(!Comparator::Gt.violates(f64::NAN, 10.0));
        assert!(!Comparator::Ne.violates(f64::NAN, 10.0));
    }

    #[test]
    fn severity_orders_p1_highest() {
        assert!(Severity::P1 > Severity::P2);
        assert!(Severity::P2 > Severity::P3);
    }

    #[test]
    fn empty_calendar_is_always_effective() {
        let cal = EffectiveCalendar::default();
        assert!(cal.is_effective_at(Utc::now()));
    }
}
