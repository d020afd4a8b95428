use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpyError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Listing decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: &'static str, millis: u128 },

    #[error("{0} cancelled")]
    Cancelled(&'static str),

    #[error("Delivery to {destination} failed: {reason}")]
    Delivery { destination: String, reason: String },

    #[error("Unknown target field: {0}")]
    UnknownTargetField(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(i64),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Discord gateway error: {0}")]
    Gateway(#[from] serenity::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl SpyError {
    /// Whether this error came from the store or network layer rather than
    /// from the data being processed.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            SpyError::Database(_)
                | SpyError::Migration(_)
                | SpyError::Http(_)
                | SpyError::Gateway(_)
                | SpyError::Io(_)
                | SpyError::Timeout { .. }
                | SpyError::Cancelled(_)
                | SpyError::Join(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SpyError>;

impl From<crate::config::ConfigError> for SpyError {
    fn from(e: crate::config::ConfigError) -> Self {
        SpyError::Config(e.to_string())
    }
}
