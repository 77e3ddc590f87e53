//! Concrete `Channel` drivers and the registry the Dispatcher sends through
//! (spec.md §4.7 C7).

pub mod email;
pub mod phone;
pub mod sms;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::config::Config;
use crate::domain::models::ChannelKind;
use crate::domain::ports::channel::Channel;
use crate::infrastructure::rate_limiter::SmsRateLimiter;
use crate::infrastructure::retry::RetryPolicy;

pub type ChannelRegistry = HashMap<ChannelKind, Arc<dyn Channel>>;

/// Build every channel driver and register it under its `ChannelKind`
/// (`Engine`/`EngineDeps` expect a fully populated registry), plus the
/// shared SMS rate limiter so the caller can expose its stats elsewhere
/// (the diagnostics endpoint, spec §5/§7).
///
/// # Errors
/// Returns an error if the SMTP transport fails to build from `config.smtp`.
pub fn build_registry(config: &Config) -> anyhow::Result<(ChannelRegistry, Arc<SmsRateLimiter>)> {
    let sms_limiter = Arc::new(SmsRateLimiter::new(&config.sms_rate_limit));
    let retry = || RetryPolicy::from(&config.retry);

    let mut registry: HashMap<ChannelKind, Arc<dyn Channel>> = HashMap::new();
    registry.insert(ChannelKind::Webhook, Arc::new(webhook::WebhookChannel::generic(retry())));
    registry.insert(ChannelKind::FeiShu, Arc::new(webhook::WebhookChannel::feishu(retry())));
    registry.insert(ChannelKind::DingDing, Arc::new(webhook::WebhookChannel::dingding(retry())));
    registry.insert(ChannelKind::WeChat, Arc::new(webhook::WebhookChannel::wechat(retry())));
    registry.insert(ChannelKind::Slack, Arc::new(webhook::WebhookChannel::slack(retry())));
    registry.insert(ChannelKind::Email, Arc::new(email::EmailChannel::new(&config.smtp)?));
    registry.insert(
        ChannelKind::SmsTencent,
        Arc::new(sms::SmsProviderChannel::tencent("https://sms.tencentcloudapi.com".to_string(), retry(), Arc::clone(&sms_limiter))),
    );
    registry.insert(
        ChannelKind::SmsAliyun,
        Arc::new(sms::SmsProviderChannel::aliyun("https://dysmsapi.aliyuncs.com".to_string(), retry(), Arc::clone(&sms_limiter))),
    );
    registry.insert(
        ChannelKind::SmsInternal,
        Arc::new(sms::SmsInternalChannel::new("http://localhost/internal/sms/send".to_string(), retry(), Arc::clone(&sms_limiter))),
    );
    registry.insert(ChannelKind::PhoneCall, Arc::new(phone::PhoneCallChannel::new("http://localhost/internal/phone/call".to_string(), retry())));
    Ok((registry, sms_limiter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_channel_kind() {
        let config = Config::default();
        let (registry, _sms_limiter) = build_registry(&config).unwrap();
        for kind in [
            ChannelKind::Webhook,
            ChannelKind::FeiShu,
            ChannelKind::DingDing,
            ChannelKind::WeChat,
            ChannelKind::Slack,
            ChannelKind::Email,
            ChannelKind::SmsTencent,
            ChannelKind::SmsAliyun,
            ChannelKind::SmsInternal,
            ChannelKind::PhoneCall,
        ] {
            assert!(registry.contains_key(&kind), "missing channel driver for {kind:?}");
        }
    }
}
