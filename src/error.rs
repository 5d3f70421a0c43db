use thiserror::Error;

/// Failures surfaced by the bot core. Each variant maps to one user-facing reply.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("metadata provider unavailable")]
    UpstreamUnavailable,
    #[error("no results for {0:?}")]
    NotFound(String),
    /// Carries the i18n key of the usage hint to show.
    #[error("invalid argument ({0})")]
    InvalidArgument(&'static str),
    #[error("user {0} is not authorized")]
    Unauthorized(i64),
    #[error("delivery failed: {0}")]
    DeliveryFailure(String),
    #[error("selection session expired")]
    SessionExpired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised inside provider adapters. They never leave the adapter:
/// every public adapter call turns them into an empty result.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}
