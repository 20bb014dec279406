use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("transport closed: {0}")]
    Closed(String),

    #[error("core error: {0}")]
    Core(#[from] pomolog_core::CoreError),
}
