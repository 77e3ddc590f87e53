//! Domain errors for the AlertHub alerting engine.

use thiserror::Error;

/// Domain-level errors: invariant violations and not-found lookups.
///
/// Mirrors the shape of spec §7's "Invariant violation" and the subset of
/// "Config" errors that surface to a caller rather than aborting a tick.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("datasource not found: {0}")]
    DatasourceNotFound(String),

    #[error("unknown datasource kind: {0}")]
    UnknownDatasourceKind(String),

    #[error("fault center not found: {0}")]
    FaultCenterNotFound(String),

    #[error("notice not found: {0}")]
    NoticeNotFound(String),

    #[error("webhook not found or disabled: {0}")]
    WebhookNotFound(String),

    #[error("event not found for fingerprint: {0}")]
    EventNotFound(String),

    #[error("corrupt stored event: {0}")]
    CorruptEvent(String),

    #[error("recipient list is empty after validation")]
    EmptyRecipients,

    #[error("invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("store error: {0}")]
    StoreError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::StoreError(err.to_string())
    }
}
