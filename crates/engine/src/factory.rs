use std::collections::BTreeMap;

use tracing::debug;

use pomolog_core::Settings;
use pomolog_core::settings::{FILE_SOURCE_FILENAME, SOURCE_TYPE, SQLITE_SOURCE_FILENAME};
use pomolog_storage::{
    EPHEMERAL_SOURCE, FileLog, LOCAL_SOURCE, LogTransport, MemoryLog, SQLITE_SOURCE, SqliteLog,
};

use crate::error::EngineError;

pub type Producer =
    Box<dyn Fn(&dyn Settings) -> Result<Box<dyn LogTransport>, EngineError> + Send + Sync>;

/// Builds transports by source type name.
pub struct SourceFactory {
    producers: BTreeMap<String, Producer>,
}

impl Default for SourceFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SourceFactory {
    pub fn new() -> Self {
        Self {
            producers: BTreeMap::new(),
        }
    }

    /// `local` (text file), `ephemeral` (memory) and `sqlite`.
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register(LOCAL_SOURCE, Box::new(local_file));
        factory.register(EPHEMERAL_SOURCE, Box::new(ephemeral));
        factory.register(SQLITE_SOURCE, Box::new(sqlite));
        factory
    }

    /// Replaces any producer already registered under `name`.
    pub fn register(&mut self, name: &str, producer: Producer) {
        if self.producers.insert(name.to_string(), producer).is_some() {
            debug!(name, "replaced source producer");
        }
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.producers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.producers.keys().map(String::as_str).collect()
    }

    /// Builds the transport selected by `Source.type`.
    pub fn build(&self, settings: &dyn Settings) -> Result<Box<dyn LogTransport>, EngineError> {
        let source_type = settings.get(SOURCE_TYPE)?.unwrap_or_default();
        let producer = self
            .producers
            .get(&source_type)
            .ok_or_else(|| EngineError::UnknownSourceType(source_type.clone()))?;
        debug!(source_type, "building transport");
        producer(settings)
    }
}

fn local_file(settings: &dyn Settings) -> Result<Box<dyn LogTransport>, EngineError> {
    let filename = required(settings, FILE_SOURCE_FILENAME)?;
    Ok(Box::new(FileLog::open(filename)?))
}

fn ephemeral(_: &dyn Settings) -> Result<Box<dyn LogTransport>, EngineError> {
    Ok(Box::new(MemoryLog::new()))
}

fn sqlite(settings: &dyn Settings) -> Result<Box<dyn LogTransport>, EngineError> {
    let filename = required(settings, SQLITE_SOURCE_FILENAME)?;
    Ok(Box::new(SqliteLog::open(filename)?))
}

fn required(settings: &dyn Settings, key: &str) -> Result<String, EngineError> {
    settings
        .get(key)?
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EngineError::UnsupportedConfiguration(format!("{key} is not set")))
}
