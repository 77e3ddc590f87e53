//! NoticeRecord entity — append-only send audit trail (spec.md §3 "NoticeRecord").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeStatus {
    Ok,
    Fail,
}

/// One channel-send attempt. Append-only: written exactly once per attempt,
/// never mutated (spec §3, §4.6.f).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeRecord {
    pub event_id: String,
    pub date: DateTime<Utc>,
    pub tenant_id: String,
    pub rule_name: String,
    pub channel: super::notice::ChannelKind,
    pub notice_name: String,
    pub severity: super::rule::Severity,
    pub status: NoticeStatus,
    pub content: String,
    pub error: Option<String>,
}
