//! SMS channel drivers: external provider factory (Tencent/Aliyun) and the
//! internal HTTP gateway (spec.md §4.7 C7), composed with the shared
//! `RetryPolicy` and `SmsRateLimiter` (governor-backed token bucket).

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::domain::models::ChannelKind;
use crate::domain::ports::channel::{Channel, SendParams};
use crate::infrastructure::rate_limiter::SmsRateLimiter;
use crate::infrastructure::retry::RetryPolicy;

fn cn_mobile_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^1[3-9]\d{9}$").expect("CN mobile regex is a fixed valid pattern"))
}

/// Retain only recipients that look like CN mobile numbers
/// (spec §4.7: "phone-number regex for CN mobiles").
fn valid_phones(to: &[String]) -> Vec<String> {
    to.iter().filter(|p| cn_mobile_regex().is_match(p)).cloned().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SmsProvider {
    Tencent,
    Aliyun,
}

/// External SMS provider driver. One instance per provider name
/// (spec §4.7: "provider factory by name").
pub struct SmsProviderChannel {
    provider: SmsProvider,
    client: Client,
    retry: RetryPolicy,
    limiter: Arc<SmsRateLimiter>,
    endpoint: String,
}

impl SmsProviderChannel {
    #[must_use]
    pub fn tencent(endpoint: String, retry: RetryPolicy, limiter: Arc<SmsRateLimiter>) -> Self {
        Self::new(SmsProvider::Tencent, endpoint, retry, limiter)
    }

    #[must_use]
    pub fn aliyun(endpoint: String, retry: RetryPolicy, limiter: Arc<SmsRateLimiter>) -> Self {
        Self::new(SmsProvider::Aliyun, endpoint, retry, limiter)
    }

    fn new(provider: SmsProvider, endpoint: String, retry: RetryPolicy, limiter: Arc<SmsRateLimiter>) -> Self {
        let client = Client::builder().timeout(Duration::from_secs(10)).pool_max_idle_per_host(10).tcp_nodelay(true).build().expect("default SMS client config is always valid");
        Self { provider, client, retry, limiter, endpoint }
    }

    fn kind(&self) -> ChannelKind {
        match self.provider {
            SmsProvider::Tencent => ChannelKind::SmsTencent,
            SmsProvider::Aliyun => ChannelKind::SmsAliyun,
        }
    }

    fn envelope(&self, phones: &[String], content: &str, provider_config: Option<&serde_json::Value>) -> serde_json::Value {
        let provider_name = match self.provider {
            SmsProvider::Tencent => "tencent",
            SmsProvider::Aliyun => "aliyun",
        };
        serde_json::json!({
            "provider": provider_name,
            "phones": phones,
            "content": content,
            "template_id": provider_config.and_then(|c| c.get("template_id")),
            "sign_name": provider_config.and_then(|c| c.get("sign_name")),
        })
    }
}

#[async_trait]
impl Channel for SmsProviderChannel {
    fn kind(&self) -> ChannelKind {
        self.kind()
    }

    fn validate(&self, params: &SendParams) -> anyhow::Result<()> {
        if valid_phones(&params.to).is_empty() {
            anyhow::bail!(crate::domain::errors::DomainError::EmptyRecipients);
        }
        Ok(())
    }

    async fn send(&self, params: &SendParams) -> anyhow::Result<()> {
        let phones = valid_phones(&params.to);
        let body = self.envelope(&phones, &params.content, params.provider_config.as_ref());

        self.limiter.acquire(Duration::from_secs(5)).await.map_err(|e| anyhow::anyhow!(e))?;

        let result = self
            .retry
            .execute(
                || async {
                    let response = self.client.post(&self.endpoint).json(&body).send().await?;
                    if !response.status().is_success() {
                        anyhow::bail!("{:?} SMS gateway returned {}", self.provider, response.status());
                    }
                    Ok(())
                },
                |_: &anyhow::Error| true,
            )
            .await;

        match &result {
            Ok(()) => self.limiter.record_success(),
            Err(_) => self.limiter.record_failure(),
        }
        result
    }

    async fn test(&self, params: &SendParams) -> anyhow::Result<()> {
        self.send(params).await
    }
}

/// Internal SMS gateway: form-encoded POST with priority + receivePhones
/// (spec §4.7: "SMS (internal gateway)").
pub struct SmsInternalChannel {
    client: Client,
    retry: RetryPolicy,
    limiter: Arc<SmsRateLimiter>,
    endpoint: String,
}

impl SmsInternalChannel {
    #[must_use]
    pub fn new(endpoint: String, retry: RetryPolicy, limiter: Arc<SmsRateLimiter>) -> Self {
        let client = Client::builder().timeout(Duration::from_secs(10)).pool_max_idle_per_host(10).tcp_nodelay(true).build().expect("default SMS client config is always valid");
        Self { client, retry, limiter, endpoint }
    }
}

#[async_trait]
impl Channel for SmsInternalChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::SmsInternal
    }

    fn validate(&self, params: &SendParams) -> anyhow::Result<()> {
        if valid_phones(&params.to).is_empty() {
            anyhow::bail!(crate::domain::errors::DomainError::EmptyRecipients);
        }
        Ok(())
    }

    async fn send(&self, params: &SendParams) -> anyhow::Result<()> {
        let phones = valid_phones(&params.to);
        let priority = if matches!(params.severity, crate::domain::models::Severity::P1) { "high" } else { "normal" };
        let form = [("priority", priority.to_string()), ("receivePhones", phones.join(",")), ("content", params.content.clone())];

        self.limiter.acquire(Duration::from_secs(5)).await.map_err(|e| anyhow::anyhow!(e))?;

        let result = self
            .retry
            .execute(
                || async {
                    let response = self.client.post(&self.endpoint).form(&form).send().await?;
                    if !response.status().is_success() {
                        anyhow::bail!("internal SMS gateway returned {}", response.status());
                    }
                    Ok(())
                },
                |_: &anyhow::Error| true,
            )
            .await;

        match &result {
            Ok(()) => self.limiter.record_success(),
            Err(_) => self.limiter.record_failure(),
        }
        result
    }

    async fn test(&self, params: &SendParams) -> anyhow::Result<()> {
        self.send(params).await
    }
}
