use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use pomolog_core::events::{AFTER_SOURCE_CHANGED, BEFORE_SOURCE_CHANGED, HOLDER_EVENTS};
use pomolog_core::settings::SOURCE_TYPE;
use pomolog_core::{Codec, Cryptograph, EventEmitter, EventParams, Settings, StrategyRegistry};

use crate::clock::Clock;
use crate::error::EngineError;
use crate::factory::SourceFactory;
use crate::source::EventSource;

/// Keeps the current event source and swaps it when the configuration changes.
pub struct EventSourceHolder {
    settings: Arc<dyn Settings>,
    factory: SourceFactory,
    codec: Codec,
    clock: Arc<dyn Clock>,
    emitter: EventEmitter,
    source: RwLock<Option<Arc<EventSource>>>,
}

impl EventSourceHolder {
    pub fn new(
        settings: Arc<dyn Settings>,
        factory: SourceFactory,
        registry: Arc<StrategyRegistry>,
        crypto: Arc<dyn Cryptograph>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            factory,
            codec: Codec::new(registry, crypto),
            clock,
            emitter: EventEmitter::new(HOLDER_EVENTS),
            source: RwLock::new(None),
        }
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn settings(&self) -> &Arc<dyn Settings> {
        &self.settings
    }

    pub fn source(&self) -> Option<Arc<EventSource>> {
        self.source.read().clone()
    }

    /// Replaces the current source with a new, not yet started one built from the settings.
    ///
    /// The transport is built before anything is torn down, so an unknown source type or a bad
    /// configuration leaves the current source working. Otherwise the old source loses all its
    /// subscribers and its transport, and the new one gets a fresh model.
    pub fn recreate(&self) -> Result<Arc<EventSource>, EngineError> {
        let source_type = self.settings.get(SOURCE_TYPE)?.unwrap_or_default();
        debug!(source_type, "recreating event source");
        let transport = self.factory.build(self.settings.as_ref())?;

        let old = self.source.read().clone();
        let old_id = old.as_ref().map(|s| s.id());
        self.emitter.emit(
            BEFORE_SOURCE_CHANGED,
            EventParams::new().with("source", old_id.clone()),
            None,
        )?;
        if let Some(old) = old {
            old.cancel("*")?;
            old.disconnect()?;
        }

        let source = Arc::new(EventSource::new(
            transport,
            Arc::clone(&self.settings),
            self.codec.clone(),
            Arc::clone(&self.clock),
        ));
        *self.source.write() = Some(Arc::clone(&source));
        info!(source_type, id = %source.id(), "event source replaced, start it to load data");

        self.emitter.emit(
            AFTER_SOURCE_CHANGED,
            EventParams::new()
                .with("source", source.id())
                .with("previous", old_id),
            None,
        )?;
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use pomolog_core::settings::FILE_SOURCE_FILENAME;
    use pomolog_core::{MemorySettings, NoCryptograph, StrategyKind, callback};

    use super::*;
    use crate::clock::ManualClock;
    use crate::source::SourceState;

    fn holder(settings: Arc<MemorySettings>) -> EventSourceHolder {
        EventSourceHolder::new(
            settings,
            SourceFactory::with_defaults(),
            Arc::new(StrategyRegistry::with_defaults()),
            Arc::new(NoCryptograph),
            Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap())),
        )
    }

    #[test]
    fn recreate_disconnects_the_old_source() {
        let settings = Arc::new(MemorySettings::with_values(&[(SOURCE_TYPE, "ephemeral")]));
        let holder = holder(Arc::clone(&settings));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        holder
            .emitter()
            .subscribe(
                "*SourceChanged",
                callback(move |p| {
                    sink.lock().push(p.event().to_string());
                    Ok(())
                }),
                false,
            )
            .unwrap();

        let first = holder.recreate().unwrap();
        first.start().unwrap();
        first.emitter().subscribe("*", callback(|_| Ok(())), false).unwrap();

        let second = holder.recreate().unwrap();
        assert_eq!(first.state(), SourceState::Disconnected);
        assert_eq!(first.emitter().subscriber_count("AfterBacklogCreate"), 0);
        assert_eq!(second.state(), SourceState::NotStarted);
        assert!(Arc::ptr_eq(&holder.source().unwrap(), &second));
        assert!(matches!(
            first.execute(StrategyKind::CreateBacklog, &["b1", "x"]),
            Err(EngineError::Disconnected)
        ));
        assert_eq!(
            *seen.lock(),
            vec![
                "BeforeSourceChanged",
                "AfterSourceChanged",
                "BeforeSourceChanged",
                "AfterSourceChanged"
            ]
        );
    }

    #[test]
    fn bad_configuration_keeps_the_current_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let settings = Arc::new(MemorySettings::with_values(&[
            (SOURCE_TYPE, "local"),
            (FILE_SOURCE_FILENAME, path.to_str().unwrap()),
        ]));
        let holder = holder(Arc::clone(&settings));
        let current = holder.recreate().unwrap();
        current.start().unwrap();

        settings.set(&[(SOURCE_TYPE, "carrier-pigeon")]).unwrap();
        assert!(matches!(holder.recreate(), Err(EngineError::UnknownSourceType(_))));
        assert_eq!(current.state(), SourceState::Running);
        assert!(Arc::ptr_eq(&holder.source().unwrap(), &current));
    }
}
