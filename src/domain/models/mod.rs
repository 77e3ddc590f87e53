//! Domain entities (spec.md §3).

pub mod config;
pub mod datasource;
pub mod duty_calendar;
pub mod event;
pub mod fault_center;
pub mod inspection;
pub mod notice;
pub mod notice_record;
pub mod rule;
pub mod silence;
pub mod third_party;

pub use config::Config;
pub use datasource::{DatasourceConfig, DatasourceKind, Sample, TargetHealth, TargetHealthState};
pub use duty_calendar::{DutyCalendar, DutyCalendarEntry};
pub use event::{AlertEvent, ConfirmState, EnrichedFields, EventKey, EventStatus, SilenceInfo};
pub use fault_center::{AggregationMode, FaultCenter};
pub use inspection::{Inspection, InspectionConfig, InspectionDetail};
pub use notice::{ChannelKind, DingDingEnterpriseConfig, Notice, RouteTarget, SeverityRoute};
pub use notice_record::{NoticeRecord, NoticeStatus};
pub use rule::{Comparator, EffectiveCalendar, EffectiveTimeWindow, Rule, Severity};
pub use silence::{LabelSelector, SelectorOp, Silence};
pub use third_party::{
    EventLifecycleStatus, FieldMapping, NormalizedEvent, ProcessStatus, ThirdPartyAlert,
    ThirdPartyWebhook,
};
