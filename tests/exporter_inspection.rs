//! Exporter inspection roll-up: availability rounding and the down-target
//! summary cap (spec.md §4.8/§8 scenario 5).

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use alerthub::application::inspector::{inspect_datasource, run_tenant_inspection};
use alerthub::domain::models::{Inspection, InspectionConfig, InspectionDetail, Sample, TargetHealth, TargetHealthState};
use alerthub::domain::ports::datasource::DataSourcePort;
use alerthub::domain::ports::sink::InspectionSink;

fn target(instance: &str, health: TargetHealthState, last_error: &str) -> TargetHealth {
    TargetHealth {
        instance: instance.to_string(),
        job: "node".to_string(),
        labels: BTreeMap::new(),
        scrape_url: format!("http://{instance}/metrics"),
        health,
        last_scrape: Utc::now(),
        last_error: last_error.to_string(),
    }
}

struct FixedTargets(Vec<TargetHealth>);
#[async_trait]
impl DataSourcePort for FixedTargets {
    async fn query(&self, _expr: &str, _at: chrono::DateTime<Utc>) -> anyhow::Result<Vec<Sample>> {
        Ok(vec![])
    }
    async fn query_range(&self, _expr: &str, _start: chrono::DateTime<Utc>, _end: chrono::DateTime<Utc>, _step: chrono::Duration) -> anyhow::Result<Vec<Sample>> {
        Ok(vec![])
    }
    async fn get_targets(&self) -> anyhow::Result<Vec<TargetHealth>> {
        Ok(self.0.clone())
    }
    async fn check(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<(Inspection, Vec<InspectionDetail>)>>,
    retention_calls: Mutex<Vec<(String, i64)>>,
}
#[async_trait]
impl InspectionSink for RecordingSink {
    async fn write_batch(&self, inspection: Inspection, details: Vec<InspectionDetail>) -> anyhow::Result<()> {
        self.batches.lock().unwrap().push((inspection, details));
        Ok(())
    }
    async fn apply_retention(&self, tenant_id: &str, retention_days: i64) -> anyhow::Result<u64> {
        self.retention_calls.lock().unwrap().push((tenant_id.to_string(), retention_days));
        Ok(0)
    }
    async fn latest_for_tenant(&self, _tenant_id: &str, _datasource_ids: &[String]) -> anyhow::Result<Vec<Inspection>> {
        Ok(self.batches.lock().unwrap().iter().map(|(i, _)| i.clone()).collect())
    }
}

/// 2 of 3 targets up rounds to 66.67, matching spec's `round(up/total*100, 2)`.
#[tokio::test]
async fn availability_rounds_to_two_decimal_places() {
    let targets = vec![
        target("h1:9100", TargetHealthState::Up, ""),
        target("h2:9100", TargetHealthState::Up, ""),
        target("h3:9100", TargetHealthState::Down, "connection refused"),
    ];
    let ds = FixedTargets(targets);
    let sink = RecordingSink::default();

    let inspection = inspect_datasource("t1", "ds1", &ds, &sink).await.unwrap();
    assert_eq!(inspection.total, 3);
    assert_eq!(inspection.up, 2);
    assert_eq!(inspection.down, 1);
    assert!((inspection.availability - 66.67).abs() < 1e-9);
    assert_eq!(inspection.down_summary.len(), 1);
}

/// The down-target summary caps at 10 entries even when more targets are
/// down, so the stored roll-up never grows unbounded.
#[tokio::test]
async fn down_summary_caps_at_ten_entries() {
    let targets: Vec<TargetHealth> = (0..15).map(|i| target(&format!("h{i}:9100"), TargetHealthState::Down, "timeout")).collect();
    let ds = FixedTargets(targets);
    let sink = RecordingSink::default();

    let inspection = inspect_datasource("t1", "ds1", &ds, &sink).await.unwrap();
    assert_eq!(inspection.down, 15);
    assert_eq!(inspection.down_summary.len(), 10, "summary caps at MAX_DOWN_SUMMARY");
}

/// `run_tenant_inspection` skips datasources missing from the registry,
/// inspects the rest, and always applies retention afterward.
#[tokio::test]
async fn tenant_inspection_skips_missing_datasource_and_applies_retention() {
    let mut datasources: std::collections::BTreeMap<String, Box<dyn DataSourcePort>> = std::collections::BTreeMap::new();
    datasources.insert("ds1".to_string(), Box::new(FixedTargets(vec![target("h1:9100", TargetHealthState::Up, "")])));
    let sink = RecordingSink::default();
    let config = InspectionConfig { tenant_id: "t1".into(), enabled: true, datasource_ids: vec!["ds1".into(), "ds-missing".into()], inspection_times: vec![], history_retention_days: 30, auto_refresh: true };

    let results = run_tenant_inspection(&config, &datasources, &sink).await.unwrap();
    assert_eq!(results.len(), 1, "missing datasource is skipped, not an error");
    assert_eq!(sink.retention_calls.lock().unwrap().len(), 1);
    assert_eq!(sink.retention_calls.lock().unwrap()[0], ("t1".to_string(), 30));
}

#[tokio::test]
async fn disabled_inspection_config_runs_nothing() {
    let datasources: std::collections::BTreeMap<String, Box<dyn DataSourcePort>> = std::collections::BTreeMap::new();
    let sink = RecordingSink::default();
    let config = InspectionConfig { tenant_id: "t1".into(), enabled: false, datasource_ids: vec![], inspection_times: vec![], history_retention_days: 30, auto_refresh: false };

    let results = run_tenant_inspection(&config, &datasources, &sink).await.unwrap();
    assert!(results.is_empty());
    assert!(sink.retention_calls.lock().unwrap().is_empty());
}
