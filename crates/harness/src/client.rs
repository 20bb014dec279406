use std::path::Path;
use std::sync::Arc;

use pomolog_core::settings::{
    ENCRYPTION_ENABLED, ENCRYPTION_KEY, SOURCE_FULLNAME, SOURCE_USERNAME,
};
use pomolog_core::{
    AeadCryptograph, Codec, MemorySettings, Outcome, Settings, StrategyKind, StrategyRegistry,
};
use pomolog_engine::{Clock, EngineError, EventSource, ManualClock};
use pomolog_storage::{FileLog, LogTransport, MemoryLog, SqliteLog};

use crate::{ALICE, epoch};

/// One device: an event source over some log, driven by a manual clock.
pub struct TestClient {
    pub source: EventSource,
    pub settings: Arc<MemorySettings>,
    pub clock: Arc<ManualClock>,
}

impl TestClient {
    /// A client over `transport`, not yet started. `values` override the default settings.
    pub fn over(
        transport: Box<dyn LogTransport>,
        clock: Arc<ManualClock>,
        values: &[(&str, &str)],
    ) -> Result<Self, EngineError> {
        let mut all = vec![(SOURCE_USERNAME, ALICE), (SOURCE_FULLNAME, "Alice")];
        all.extend_from_slice(values);
        let settings = Arc::new(MemorySettings::with_values(&all));
        let registry = Arc::new(StrategyRegistry::with_defaults());
        let codec = if settings.is_enabled(ENCRYPTION_ENABLED)? {
            let crypto = AeadCryptograph::new(Arc::clone(&settings) as Arc<dyn Settings>)?;
            Codec::new(registry, Arc::new(crypto))
        } else {
            Codec::plain(registry)
        };
        let source = EventSource::new(
            transport,
            Arc::clone(&settings) as Arc<dyn Settings>,
            codec,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Ok(Self {
            source,
            settings,
            clock,
        })
    }

    /// Started over a fresh in-memory log.
    pub fn new() -> Result<Self, EngineError> {
        Self::on_log(&MemoryLog::new())
    }

    /// Started over a shared handle of `log`.
    pub fn on_log(log: &MemoryLog) -> Result<Self, EngineError> {
        let client = Self::over(Box::new(log.clone()), Arc::new(ManualClock::new(epoch())), &[])?;
        client.source.start()?;
        Ok(client)
    }

    pub fn on_file(path: &Path) -> Result<Self, EngineError> {
        let client = Self::over(
            Box::new(FileLog::open(path)?),
            Arc::new(ManualClock::new(epoch())),
            &[],
        )?;
        client.source.start()?;
        Ok(client)
    }

    pub fn on_sqlite(path: &Path) -> Result<Self, EngineError> {
        let client = Self::over(
            Box::new(SqliteLog::open(path)?),
            Arc::new(ManualClock::new(epoch())),
            &[],
        )?;
        client.source.start()?;
        Ok(client)
    }

    /// Started over `log` with encryption on, keyed by `secret`.
    pub fn encrypted(log: &MemoryLog, secret: &str) -> Result<Self, EngineError> {
        let client = Self::over(
            Box::new(log.clone()),
            Arc::new(ManualClock::new(epoch())),
            &[(ENCRYPTION_ENABLED, "True"), (ENCRYPTION_KEY, secret)],
        )?;
        client.source.start()?;
        Ok(client)
    }

    pub fn run(&self, kind: StrategyKind, params: &[&str]) -> Result<Outcome, EngineError> {
        self.source.execute(kind, params)
    }

    pub fn advance(&self, seconds: i64) {
        self.clock.advance(seconds);
    }

    /// Creates `backlog` holding `workitem` with `pomodoros` planned pomodoros.
    pub fn plan(&self, backlog: &str, workitem: &str, pomodoros: usize) -> Result<(), EngineError> {
        if self.source.find_backlog(backlog).is_none() {
            self.run(StrategyKind::CreateBacklog, &[backlog, backlog])?;
        }
        self.run(StrategyKind::CreateWorkitem, &[workitem, backlog, workitem])?;
        if pomodoros > 0 {
            self.run(StrategyKind::AddPomodoro, &[workitem, &pomodoros.to_string()])?;
        }
        Ok(())
    }

    pub fn pomodoro_states(&self, workitem: &str) -> Vec<&'static str> {
        self.source
            .find_workitem(workitem)
            .map(|w| w.pomodoros().map(|p| p.state().as_str()).collect())
            .unwrap_or_default()
    }
}
