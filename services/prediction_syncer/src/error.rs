use thiserror::Error;

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Provider throttled {endpoint} after {attempts} attempts")]
    Throttled { endpoint: String, attempts: u32 },
    #[error("Unexpected status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },
    #[error("Image preview failed with status {0}")]
    ImagePreview(u16),
    #[error("Notifier error: {0}")]
    Notifier(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("No active season found")]
    NoActiveSeason,
    #[error("Shutdown requested while waiting")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is not set.
    #[error("Missing required environment variable: {0}")]
    Missing(String),
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
}
