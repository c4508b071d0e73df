//! Error types for warpgen

use thiserror::Error;

/// Result type alias using warpgen Error
pub type Result<T> = std::result::Result<T, Error>;

/// warpgen error types
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing request fields, raised before any network call.
    #[error("{0}")]
    Validation(String),

    /// A remote response did not match the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network failure, timeout or non-success HTTP status.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures caused while talking to the provider or creating
    /// key material. These are reported to callers with a generic message.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_) | Error::Transport(_) | Error::Crypto(_)
        )
    }

    /// Check if the error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Short machine-readable kind, used in logs and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Protocol(_) => "protocol",
            Error::Transport(_) => "transport",
            Error::Crypto(_) => "crypto",
            Error::InvalidConfig(_) => "config",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Toml(_) => "toml",
            Error::Internal(_) => "internal",
        }
    }
}
