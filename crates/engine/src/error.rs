use pomolog_core::CoreError;
use pomolog_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("strategies must go in sequence: expected {expected}, received {received}")]
    SequenceViolation { expected: u64, received: u64 },

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("transport error: {0}")]
    Transport(#[from] StorageError),

    #[error("source type {0} is not supported")]
    UnknownSourceType(String),

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("settings unavailable: {0}")]
    Settings(String),

    #[error("strategy failed: {0}")]
    Strategy(CoreError),

    #[error("event source is not started")]
    NotStarted,

    #[error("event source is already started")]
    AlreadyStarted,

    #[error("event source is disconnected")]
    Disconnected,
}

impl From<CoreError> for EngineError {
    /// Codec, crypto and settings failures keep their own variant; everything else failed inside a
    /// strategy.
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Decode(msg) => Self::Decode(msg),
            CoreError::UnknownStrategy(name) => Self::Decode(format!("unknown strategy {name}")),
            CoreError::Crypto(msg) => Self::Crypto(msg),
            CoreError::Settings(msg) => Self::Settings(msg),
            other => Self::Strategy(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_onto_the_taxonomy() {
        assert!(matches!(
            EngineError::from(CoreError::Decode("x".into())),
            EngineError::Decode(_)
        ));
        assert!(matches!(
            EngineError::from(CoreError::UnknownStrategy("Foo".into())),
            EngineError::Decode(_)
        ));
        assert!(matches!(
            EngineError::from(CoreError::Crypto("bad tag".into())),
            EngineError::Crypto(_)
        ));
        assert!(matches!(
            EngineError::from(CoreError::Settings("disk gone".into())),
            EngineError::Settings(_)
        ));
        assert!(matches!(
            EngineError::from(CoreError::NotFound("workitem w1".into())),
            EngineError::Strategy(CoreError::NotFound(_))
        ));
    }
}
