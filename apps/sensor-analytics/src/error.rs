use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// Unknown range token. Callers passing user input get this back instead of a default window.
    #[error("invalid range token {0:?} (expected one of 1h, 6h, 24h, 7d, 30d)")]
    InvalidRangeToken(String),
    #[error("reading query failed: {0}")]
    QueryFailure(#[from] StoreError),
    #[error("analytics session is closed")]
    SessionClosed,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("reading store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid query range: from {from} is after to {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("deviceId is required")]
    MissingDeviceId,
}
