//! Channel capability port (spec.md §4.7 C7; SPEC_FULL.md §9 "inheritance across
//! channel drivers" redesigned as a capability interface).

use async_trait::async_trait;

use crate::domain::models::{ChannelKind, Severity};

/// Shared parameters passed to every channel driver (spec §4.7).
#[derive(Debug, Clone)]
pub struct SendParams {
    pub tenant_id: String,
    pub event_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub notice_id: String,
    pub notice_name: String,
    pub is_recovered: bool,
    pub hook: Option<String>,
    pub content: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub signature: Option<String>,
    pub provider_config: Option<serde_json::Value>,
}

/// A channel capability: send, health-test, and pre-flight validation.
#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Refuse to send when the recipient list reduces to empty after
    /// validation (spec §4.7).
    fn validate(&self, params: &SendParams) -> anyhow::Result<()>;

    async fn send(&self, params: &SendParams) -> anyhow::Result<()>;

    async fn test(&self, params: &SendParams) -> anyhow::Result<()>;
}
