//! Fingerprint computation shared by the rule evaluator and third-party
//! ingest (spec.md §3 "Fingerprint", §8 "Fingerprint stability").

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// `H(ruleId, canonicalizedLabels)`. `BTreeMap` already iterates in sorted
/// key order, so hashing it is invariant under the original map's
/// insertion/key order (spec §8 "Fingerprint stability").
#[must_use]
pub fn rule_fingerprint(rule_id: &str, labels: &BTreeMap<String, String>) -> String {
    let mut hasher = DefaultHasher::new();
    rule_id.hash(&mut hasher);
    for (k, v) in labels {
        k.hash(&mut hasher);
        v.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}
