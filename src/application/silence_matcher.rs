//! Silence Matcher (spec.md §4.5 C5).
//!
//! Holds the set of silences currently active for a tenant and answers
//! "does this label set match an active silence at time t". Refreshed
//! periodically from `SilenceRepository` rather than queried per-event,
//! so a dispatch tick never blocks on the silence store.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::domain::models::silence::Silence;
use crate::domain::ports::repository::SilenceRepository;

/// In-memory index of active silences, keyed by tenant. Cheap to query;
/// rebuilt wholesale on refresh rather than patched incrementally.
#[derive(Default)]
pub struct SilenceMatcher {
    by_tenant: RwLock<HashMap<String, Vec<Silence>>>,
}

impl SilenceMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload every tenant's active-at-`at` silence list from the repository.
    pub async fn refresh(&self, tenant_ids: &[String], repo: &dyn SilenceRepository, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut next = HashMap::with_capacity(tenant_ids.len());
        for tenant_id in tenant_ids {
            let silences = repo.list_active(tenant_id, at).await?;
            next.insert(tenant_id.clone(), silences);
        }
        let mut guard = self.by_tenant.write().expect("silence index lock poisoned");
        *guard = next;
        Ok(())
    }

    /// The id of the first active silence matching `labels` at `at`, if any.
    /// First-match order follows the repository's listing order.
    #[must_use]
    pub fn matching_silence(&self, tenant_id: &str, labels: &std::collections::BTreeMap<String, String>, at: DateTime<Utc>) -> Option<String> {
        let guard = self.by_tenant.read().expect("silence index lock poisoned");
        let silences = guard.get(tenant_id)?;
        silences
            .iter()
            .find(|s| s.is_active_at(at) && s.matches(labels).unwrap_or(false))
            .map(|s| s.silence_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::silence::{LabelSelector, SelectorOp};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct FixedRepo {
        silences: Vec<Silence>,
    }

    #[async_trait]
    impl SilenceRepository for FixedRepo {
        async fn list_active(&self, _tenant_id: &str, at: DateTime<Utc>) -> anyhow::Result<Vec<Silence>> {
            Ok(self.silences.iter().filter(|s| s.is_active_at(at)).cloned().collect())
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[tokio::test]
    async fn matches_active_silence_by_selector() {
        let now = Utc::now();
        let silence = Silence {
            tenant_id: "t1".into(),
            silence_id: "sil-1".into(),
            selectors: vec![LabelSelector { key: "job".into(), op: SelectorOp::Eq, value: "node".into() }],
            start: now - chrono::Duration::minutes(1),
            end: now + chrono::Duration::minutes(1),
            comment: String::new(),
        };
        let repo = FixedRepo { silences: vec![silence] };
        let matcher = SilenceMatcher::new();
        matcher.refresh(&["t1".to_string()], &repo, now).await.unwrap();

        let found = matcher.matching_silence("t1", &labels(&[("job", "node")]), now);
        assert_eq!(found.as_deref(), Some("sil-1"));

        let not_found = matcher.matching_silence("t1", &labels(&[("job", "other")]), now);
        assert_eq!(not_found, None);
    }

    #[tokio::test]
    async fn ignores_expired_silence() {
        let now = Utc::now();
        let silence = Silence {
            tenant_id: "t1".into(),
            silence_id: "sil-2".into(),
            selectors: vec![LabelSelector { key: "job".into(), op: SelectorOp::Eq, value: "node".into() }],
            start: now - chrono::Duration::hours(2),
            end: now - chrono::Duration::hours(1),
            comment: String::new(),
        };
        let repo = FixedRepo { silences: vec![silence] };
        let matcher = SilenceMatcher::new();
        matcher.refresh(&["t1".to_string()], &repo, now).await.unwrap();

        assert_eq!(matcher.matching_silence("t1", &labels(&[("job", "node")]), now), None);
    }

    #[tokio::test]
    async fn unknown_tenant_has_no_silences() {
        let now = Utc::now();
        let repo = FixedRepo { silences: vec![] };
        let matcher = SilenceMatcher::new();
        matcher.refresh(&["t1".to_string()], &repo, now).await.unwrap();
        assert_eq!(matcher.matching_silence("unknown", &labels(&[]), now), None);
    }
}
