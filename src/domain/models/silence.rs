//! Silence entity and selector matching (spec.md §3 "Silence", §4.5 C5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One label-selector predicate within a silence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSelector {
    pub key: String,
    pub op: SelectorOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOp {
    /// `=` exact match.
    Eq,
    /// `!=` negation.
    Ne,
    /// `=~` regex match.
    RegexMatch,
    /// `!~` negated regex match.
    RegexNotMatch,
}

impl LabelSelector {
    /// Evaluate this selector against an event's label map.
    ///
    /// # Errors
    /// Returns an error if `op` is a regex variant and `value` fails to compile.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool, regex::Error> {
        let actual = labels.get(&self.key).map(String::as_str).unwrap_or("");
        Ok(match self.op {
            SelectorOp::Eq => actual == self.value,
            SelectorOp::Ne => actual != self.value,
            SelectorOp::RegexMatch => regex::Regex::new(&self.value)?.is_match(actual),
            SelectorOp::RegexNotMatch => !regex::Regex::new(&self.value)?.is_match(actual),
        })
    }
}

/// A silence: identity `(tenant_id, silence_id)` per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Silence {
    pub tenant_id: String,
    pub silence_id: String,
    pub selectors: Vec<LabelSelector>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub comment: String,
}

impl Silence {
    /// Active set membership: `start <= t < end`.
    #[must_use]
    pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// A silence matches an event iff every selector is satisfied
    /// (spec §4.5: "every selector predicate is satisfied").
    ///
    /// # Errors
    /// Propagates a selector's regex compile error.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool, regex::Error> {
        for selector in &self.selectors {
            if !selector.matches(labels)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
