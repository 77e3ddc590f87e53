//! Notice (notification target) entity (spec.md §3 "Notice", §4.7 C7).

use serde::{Deserialize, Serialize};

use super::rule::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Webhook,
    FeiShu,
    DingDing,
    WeChat,
    Slack,
    SmsTencent,
    SmsAliyun,
    SmsInternal,
    PhoneCall,
}

/// Concrete send parameters resolved for one severity (spec §4.6.d).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteTarget {
    pub hook: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub signature: Option<String>,
    /// Provider-specific config (SMS template id, sign name, etc.) as opaque JSON.
    pub provider_config: Option<serde_json::Value>,
}

/// A per-severity route: severity -> concrete route target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityRoute {
    pub severity: Severity,
    pub target: RouteTarget,
}

/// DingDing "enterprise internal API" personal-message config (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DingDingEnterpriseConfig {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
}

/// A notice: identity `(tenant_id, notice_id)` per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub tenant_id: String,
    pub notice_id: String,
    pub name: String,
    pub channel: ChannelKind,
    pub default_target: RouteTarget,
    pub severity_routes: Vec<SeverityRoute>,
    pub duty_calendar_id: Option<String>,
    pub dingding_enterprise: Option<DingDingEnterpriseConfig>,
}

impl Notice {
    /// Resolve `(hook, to, cc, signature, provider_config)` for a severity,
    /// falling back to the notice defaults when no per-severity route
    /// matches (spec §4.6.d).
    #[must_use]
    pub fn resolve_route(&self, severity: Severity) -> RouteTarget {
        self.severity_routes
            .iter()
            .find(|r| r.severity == severity)
            .map(|r| r.target.clone())
            .unwrap_or_else(|| self.default_target.clone())
    }
}
