//! Prometheus/VictoriaMetrics HTTP datasource (spec.md §4.2 C2), grounded on
//! the teacher's `infrastructure::claude::client::ClaudeClientImpl` idiom:
//! a `reqwest::Client` built once with timeout/pool tuning, composed with
//! the unified `RetryPolicy` (infrastructure::retry) around each call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::models::datasource::{DatasourceConfig, Sample, TargetHealth, TargetHealthState};
use crate::domain::ports::datasource::DataSourcePort;
use crate::infrastructure::retry::RetryPolicy;

/// Talks to the Prometheus HTTP API (`/api/v1/query`, `/api/v1/query_range`,
/// `/api/v1/targets`). VictoriaMetrics speaks the same wire protocol, so one
/// client serves both `DatasourceKind` variants.
pub struct PrometheusDataSource {
    client: Client,
    config: DatasourceConfig,
    retry: RetryPolicy,
}

impl PrometheusDataSource {
    /// # Errors
    /// Returns an error if the underlying `reqwest::Client` fails to build.
    pub fn new(config: DatasourceConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout).pool_max_idle_per_host(10).tcp_nodelay(true);
        if let Some(token) = &config.bearer_token {
            let mut headers = reqwest::header::HeaderMap::new();
            let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }
        let client = builder.build()?;
        Ok(Self { client, config, retry })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(format!("{}{path}", self.config.url));
        if let (Some(user), Some(pass)) = (&self.config.basic_auth_user, &self.config.basic_auth_password) {
            req = req.basic_auth(user, Some(pass));
        }
        req
    }

    async fn get_json(&self, path: String, query: Vec<(&'static str, String)>) -> anyhow::Result<serde_json::Value> {
        self.retry
            .execute(
                || async {
                    let response = self.request(&path).query(&query).send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        anyhow::bail!("{} returned {status}: {body}", self.config.url);
                    }
                    response.json::<serde_json::Value>().await.map_err(anyhow::Error::from)
                },
                |_err: &anyhow::Error| true,
            )
            .await
    }
}

fn parse_vector(body: &serde_json::Value) -> anyhow::Result<Vec<Sample>> {
    let result = body
        .get("data")
        .and_then(|d| d.get("result"))
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("malformed prometheus response: missing data.result"))?;

    result
        .iter()
        .map(|entry| {
            let labels: BTreeMap<String, String> = entry
                .get("metric")
                .and_then(|m| m.as_object())
                .into_iter()
                .flatten()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect();
            let (timestamp, value) = entry
                .get("value")
                .and_then(|v| v.as_array())
                .and_then(|pair| Some((pair.first()?.as_f64()?, pair.get(1)?.as_str()?)))
                .ok_or_else(|| anyhow::anyhow!("malformed prometheus sample: missing [ts, value]"))?;
            Ok(Sample {
                labels,
                value: value.parse::<f64>().unwrap_or(f64::NAN),
                timestamp: DateTime::from_timestamp(timestamp as i64, 0).unwrap_or_else(Utc::now),
            })
        })
        .collect()
}

fn parse_matrix(body: &serde_json::Value) -> anyhow::Result<Vec<Sample>> {
    let result = body
        .get("data")
        .and_then(|d| d.get("result"))
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("malformed prometheus response: missing data.result"))?;

    let mut samples = Vec::new();
    for entry in result {
        let labels: BTreeMap<String, String> = entry
            .get("metric")
            .and_then(|m| m.as_object())
            .into_iter()
            .flatten()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        let values = entry.get("values").and_then(|v| v.as_array()).into_iter().flatten();
        for pair in values {
            let arr = pair.as_array().ok_or_else(|| anyhow::anyhow!("malformed prometheus matrix point"))?;
            let ts = arr.first().and_then(serde_json::Value::as_f64).unwrap_or_default();
            let value = arr.get(1).and_then(|v| v.as_str()).unwrap_or("NaN");
            samples.push(Sample {
                labels: labels.clone(),
                value: value.parse::<f64>().unwrap_or(f64::NAN),
                timestamp: DateTime::from_timestamp(ts as i64, 0).unwrap_or_else(Utc::now),
            });
        }
    }
    Ok(samples)
}

#[async_trait]
impl DataSourcePort for PrometheusDataSource {
    async fn query(&self, expr: &str, at: DateTime<Utc>) -> anyhow::Result<Vec<Sample>> {
        let body = self
            .get_json("/api/v1/query".to_string(), vec![("query", expr.to_string()), ("time", at.timestamp().to_string())])
            .await?;
        parse_vector(&body)
    }

    async fn query_range(&self, expr: &str, start: DateTime<Utc>, end: DateTime<Utc>, step: chrono::Duration) -> anyhow::Result<Vec<Sample>> {
        let step_secs = step.num_seconds().max(1);
        let body = self
            .get_json(
                "/api/v1/query_range".to_string(),
                vec![
                    ("query", expr.to_string()),
                    ("start", start.timestamp().to_string()),
                    ("end", end.timestamp().to_string()),
                    ("step", format!("{step_secs}s")),
                ],
            )
            .await?;
        parse_matrix(&body)
    }

    async fn get_targets(&self) -> anyhow::Result<Vec<TargetHealth>> {
        let body = self.get_json("/api/v1/targets".to_string(), Vec::new()).await?;
        let active = body
            .get("data")
            .and_then(|d| d.get("activeTargets"))
            .and_then(|t| t.as_array())
            .ok_or_else(|| anyhow::anyhow!("malformed prometheus targets response: missing data.activeTargets"))?;

        active
            .iter()
            .map(|t| {
                let labels: BTreeMap<String, String> = t
                    .get("labels")
                    .and_then(|l| l.as_object())
                    .into_iter()
                    .flatten()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect();
                let health = match t.get("health").and_then(|h| h.as_str()) {
                    Some("up") => TargetHealthState::Up,
                    Some("down") => TargetHealthState::Down,
                    _ => TargetHealthState::Unknown,
                };
                Ok(TargetHealth {
                    instance: labels.get("instance").cloned().unwrap_or_default(),
                    job: labels.get("job").cloned().unwrap_or_default(),
                    labels,
                    scrape_url: t.get("scrapeUrl").and_then(|u| u.as_str()).unwrap_or_default().to_string(),
                    health,
                    last_scrape: t
                        .get("lastScrape")
                        .and_then(|s| s.as_str())
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now),
                    last_error: t.get("lastError").and_then(|e| e.as_str()).unwrap_or_default().to_string(),
                })
            })
            .collect()
    }

    async fn check(&self) -> anyhow::Result<bool> {
        let response = self.request("/-/healthy").timeout(Duration::from_secs(5)).send().await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> DatasourceConfig {
        DatasourceConfig {
            tenant_id: "t1".into(),
            datasource_id: "ds1".into(),
            name: "prom".into(),
            kind: crate::domain::models::datasource::DatasourceKind::Prometheus,
            url: "http://localhost:9090".into(),
            basic_auth_user: None,
            basic_auth_password: None,
            bearer_token: None,
            timeout: Duration::from_secs(10),
            enabled: true,
        }
    }

    #[test]
    fn parses_instant_vector() {
        let body = json!({
            "status": "success",
            "data": {"resultType": "vector", "result": [
                {"metric": {"instance": "h1:9100", "job": "node"}, "value": [1_700_000_000.0, "0.87"]}
            ]}
        });
        let samples = parse_vector(&body).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels.get("instance").unwrap(), "h1:9100");
        assert!((samples[0].value - 0.87).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_range_matrix_with_multiple_points() {
        let body = json!({
            "status": "success",
            "data": {"resultType": "matrix", "result": [
                {"metric": {"instance": "h1"}, "values": [[1.0, "1"], [2.0, "2"]]}
            ]}
        });
        let samples = parse_matrix(&body).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].value, 2.0);
    }

    #[test]
    fn rejects_malformed_response() {
        let body = json!({"status": "success", "data": {}});
        assert!(parse_vector(&body).is_err());
    }

    #[test]
    fn builds_client_with_bearer_token() {
        let mut cfg = config();
        cfg.bearer_token = Some("secret".into());
        let ds = PrometheusDataSource::new(cfg, RetryPolicy::default());
        assert!(ds.is_ok());
    }
}
