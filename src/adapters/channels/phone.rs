//! Phone-call channel driver: synthesizes TTS content and dispatches a
//! provider-specific call code (spec.md §4.7 C7: "Phone call: synthesize
//! content, provider-specific TTS code").

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::domain::models::ChannelKind;
use crate::domain::ports::channel::{Channel, SendParams};
use crate::infrastructure::retry::RetryPolicy;

const MAX_TTS_CHARS: usize = 200;

pub struct PhoneCallChannel {
    client: Client,
    retry: RetryPolicy,
    endpoint: String,
}

impl PhoneCallChannel {
    #[must_use]
    pub fn new(endpoint: String, retry: RetryPolicy) -> Self {
        let client = Client::builder().timeout(Duration::from_secs(15)).pool_max_idle_per_host(10).tcp_nodelay(true).build().expect("default phone-call client config is always valid");
        Self { client, retry, endpoint }
    }

    /// TTS providers cap utterance length; truncate rather than reject.
    fn synthesize(params: &SendParams) -> String {
        let prefix = if params.is_recovered { "Recovered: " } else { "Alert: " };
        let mut text = format!("{prefix}{} {}", params.rule_name, params.content);
        if text.chars().count() > MAX_TTS_CHARS {
            text = text.chars().take(MAX_TTS_CHARS).collect();
        }
        text
    }
}

#[async_trait]
impl Channel for PhoneCallChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::PhoneCall
    }

    fn validate(&self, params: &SendParams) -> anyhow::Result<()> {
        if params.to.is_empty() {
            anyhow::bail!(crate::domain::errors::DomainError::EmptyRecipients);
        }
        Ok(())
    }

    async fn send(&self, params: &SendParams) -> anyhow::Result<()> {
        let tts_code = params.provider_config.as_ref().and_then(|c| c.get("tts_code")).and_then(|c| c.as_str()).unwrap_or("default");
        let text = Self::synthesize(params);
        let body = serde_json::json!({"phones": params.to, "ttsCode": tts_code, "text": text});

        self.retry
            .execute(
                || async {
                    let response = self.client.post(&self.endpoint).json(&body).send().await?;
                    if !response.status().is_success() {
                        anyhow::bail!("phone-call gateway returned {}", response.status());
                    }
                    Ok(())
                },
                |_: &anyhow::Error| true,
            )
            .await
    }

    async fn test(&self, params: &SendParams) -> anyhow::Result<()> {
        self.send(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;

    fn params() -> SendParams {
        SendParams {
            tenant_id: "t1".into(),
            event_id: "e1".into(),
            rule_name: "cpu_high".into(),
            severity: Severity::P1,
            notice_id: "n1".into(),
            notice_name: "oncall".into(),
            is_recovered: false,
            hook: None,
            content: "x".repeat(250),
            to: vec!["13800001111".into()],
            cc: vec![],
            signature: None,
            provider_config: None,
        }
    }

    #[test]
    fn truncates_long_content_to_tts_limit() {
        let text = PhoneCallChannel::synthesize(&params());
        assert!(text.chars().count() <= MAX_TTS_CHARS);
    }

    #[test]
    fn recovered_uses_recovered_prefix() {
        let mut p = params();
        p.is_recovered = true;
        p.content = "ok".into();
        assert!(PhoneCallChannel::synthesize(&p).starts_with("Recovered:"));
    }
}
