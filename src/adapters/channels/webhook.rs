//! HTTP webhook channel drivers: generic JSON POST, FeiShu, DingDing,
//! WeChat Work, Slack (spec.md §4.7 C7), grounded on the same
//! `reqwest::Client` idiom as `adapters::datasources::prometheus`.

use async_trait::async_trait;
use chrono::Utc;
use md5::{Digest, Md5};
use reqwest::Client;
use std::time::Duration;

use crate::domain::models::ChannelKind;
use crate::domain::ports::channel::{Channel, SendParams};
use crate::infrastructure::retry::RetryPolicy;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which vendor envelope to build/parse. Generic webhooks have no success
/// envelope convention, so they're treated as "2xx is success".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vendor {
    Generic,
    FeiShu,
    DingDing,
    WeChat,
    Slack,
}

pub struct WebhookChannel {
    kind: ChannelKind,
    vendor: Vendor,
    client: Client,
    retry: RetryPolicy,
}

impl WebhookChannel {
    #[must_use]
    pub fn generic(retry: RetryPolicy) -> Self {
        Self::new(ChannelKind::Webhook, Vendor::Generic, retry)
    }
    #[must_use]
    pub fn feishu(retry: RetryPolicy) -> Self {
        Self::new(ChannelKind::FeiShu, Vendor::FeiShu, retry)
    }
    #[must_use]
    pub fn dingding(retry: RetryPolicy) -> Self {
        Self::new(ChannelKind::DingDing, Vendor::DingDing, retry)
    }
    #[must_use]
    pub fn wechat(retry: RetryPolicy) -> Self {
        Self::new(ChannelKind::WeChat, Vendor::WeChat, retry)
    }
    #[must_use]
    pub fn slack(retry: RetryPolicy) -> Self {
        Self::new(ChannelKind::Slack, Vendor::Slack, retry)
    }

    fn new(kind: ChannelKind, vendor: Vendor, retry: RetryPolicy) -> Self {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).pool_max_idle_per_host(10).tcp_nodelay(true).build().expect("default webhook client config is always valid");
        Self { kind, vendor, client, retry }
    }

    fn envelope(&self, params: &SendParams) -> serde_json::Value {
        match self.vendor {
            Vendor::Generic => serde_json::json!({
                "event_id": params.event_id,
                "rule_name": params.rule_name,
                "severity": params.severity,
                "is_recovered": params.is_recovered,
                "content": params.content,
            }),
            Vendor::FeiShu | Vendor::DingDing | Vendor::WeChat => {
                serde_json::json!({"msgtype": "text", "text": {"content": params.content}})
            }
            Vendor::Slack => serde_json::json!({"text": params.content}),
        }
    }

    /// Vendors that report failure as `errcode != 0` inside a 2xx body
    /// (spec §4.7: "parse vendor error envelope").
    fn check_vendor_envelope(&self, body: &serde_json::Value) -> anyhow::Result<()> {
        if matches!(self.vendor, Vendor::FeiShu | Vendor::DingDing | Vendor::WeChat) {
            let errcode = body.get("errcode").and_then(serde_json::Value::as_i64).unwrap_or(0);
            if errcode != 0 {
                let msg = body.get("errmsg").and_then(|m| m.as_str()).unwrap_or("unknown vendor error");
                anyhow::bail!("{:?} rejected message: errcode={errcode} errmsg={msg}", self.vendor);
            }
        }
        Ok(())
    }

    async fn post_group(&self, hook: &str, params: &SendParams) -> anyhow::Result<()> {
        let body = self.envelope(params);
        self.retry
            .execute(
                || async {
                    let response = self.client.post(hook).timeout(DEFAULT_TIMEOUT).json(&body).send().await?;
                    let status = response.status();
                    let parsed: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
                    if !status.is_success() {
                        anyhow::bail!("webhook POST returned {status}");
                    }
                    self.check_vendor_envelope(&parsed)
                },
                |_: &anyhow::Error| true,
            )
            .await
    }

    /// DingDing's optional "enterprise internal API" personal-message path:
    /// send to each `to` recipient individually, signed with MD5 of
    /// `clientId+timestamp+requestId+accessToken+clientSecret`, uppercased
    /// (spec §4.7).
    async fn send_dingding_personal(&self, params: &SendParams) -> anyhow::Result<()> {
        let Some(cfg) = params.provider_config.as_ref().and_then(|v| v.get("dingding_enterprise")) else {
            return Ok(());
        };
        let client_id = cfg.get("client_id").and_then(|v| v.as_str()).unwrap_or_default();
        let client_secret = cfg.get("client_secret").and_then(|v| v.as_str()).unwrap_or_default();
        let access_token = cfg.get("access_token").and_then(|v| v.as_str()).unwrap_or_default();
        if client_id.is_empty() || client_secret.is_empty() || access_token.is_empty() {
            anyhow::bail!("dingding enterprise config incomplete");
        }

        let timestamp = Utc::now().timestamp_millis();
        let mut last_err = None;
        for recipient in &params.to {
            let request_id = uuid::Uuid::new_v4().to_string();
            let raw = format!("{client_id}{timestamp}{request_id}{access_token}{client_secret}");
            let mut hasher = Md5::new();
            hasher.update(raw.as_bytes());
            let signature = format!("{:X}", hasher.finalize());

            let result = self
                .client
                .post("https://api.dingtalk.com/v1.0/robot/oToMessages/batchSend")
                .header("x-acs-dingtalk-access-token", access_token)
                .header("x-acs-dingtalk-signature", &signature)
                .header("x-acs-dingtalk-timestamp", timestamp.to_string())
                .header("x-acs-dingtalk-request-id", &request_id)
                .json(&serde_json::json!({"robotCode": client_id, "userIds": [recipient], "msgKey": "sampleText", "msgParam": format!("{{\"content\":{:?}}}", params.content)}))
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => last_err = Some(anyhow::anyhow!("dingding personal message to {recipient} returned {}", resp.status())),
                Err(err) => last_err = Some(err.into()),
            }
        }
        last_err.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn validate(&self, params: &SendParams) -> anyhow::Result<()> {
        if params.hook.is_none() && params.to.is_empty() {
            anyhow::bail!(crate::domain::errors::DomainError::EmptyRecipients);
        }
        Ok(())
    }

    async fn send(&self, params: &SendParams) -> anyhow::Result<()> {
        let group_result = match &params.hook {
            Some(hook) => self.post_group(hook, params).await,
            None => Ok(()),
        };

        if self.kind != ChannelKind::DingDing {
            return group_result;
        }

        // DingDing: group webhook and personal-message path race independently;
        // success of either is a successful send (spec §4.7).
        let personal_result = self.send_dingding_personal(params).await;
        match (group_result, personal_result) {
            (Ok(()), _) | (_, Ok(())) => Ok(()),
            (Err(group_err), Err(_)) => Err(group_err),
        }
    }

    async fn test(&self, params: &SendParams) -> anyhow::Result<()> {
        self.send(params).await
    }
}
