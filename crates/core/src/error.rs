use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("invalid event pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("strategy already registered: {0}")]
    DuplicateStrategy(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("invalid parameters for {strategy}: {reason}")]
    InvalidParams { strategy: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not allowed: {0}")]
    Unauthorized(String),
}
