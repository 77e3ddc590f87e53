//! Ports (hexagonal boundary traits) per spec.md §4 and §9 "replace inheritance
//! with a capability interface"/"flatten cyclic references to identifier
//! references resolved via services".

pub mod channel;
pub mod datasource;
pub mod event_store;
pub mod repository;
pub mod sink;
pub mod template;

pub use channel::{Channel, SendParams};
pub use datasource::DataSourcePort;
pub use event_store::{EventHistorySink, EventStore};
pub use repository::{
    CmdbOwnerLookup, DatasourceRepository, DutyCalendarRepository, FaultCenterRepository,
    NoticeRepository, RuleRepository, SilenceRepository, ThirdPartyWebhookRepository,
};
pub use sink::{InspectionSink, NoticeRecordSink, ThirdPartyAlertSink};
pub use template::{PlainTextRenderer, TemplateRenderer};
