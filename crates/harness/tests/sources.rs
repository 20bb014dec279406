use std::sync::Arc;

use parking_lot::Mutex;
use pomolog_core::settings::{FILE_SOURCE_FILENAME, SOURCE_TYPE, SOURCE_USERNAME, SQLITE_SOURCE_FILENAME};
use pomolog_core::{NoCryptograph, Settings, StrategyKind, StrategyRegistry, callback};
use pomolog_engine::{
    Clock, EngineError, EventSourceHolder, ManualClock, SourceFactory, SourceState,
};
use pomolog_harness::{ALICE, epoch};
use pomolog_storage::{LogTransport, MemoryLog, SqliteSettings};

fn holder(settings: Arc<dyn Settings>, factory: SourceFactory) -> EventSourceHolder {
    EventSourceHolder::new(
        settings,
        factory,
        Arc::new(StrategyRegistry::with_defaults()),
        Arc::new(NoCryptograph),
        Arc::new(ManualClock::new(epoch())) as Arc<dyn Clock>,
    )
}

#[test]
fn switching_source_type_swaps_the_log() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let text = dir.path().join("pomolog.txt");
    let db = dir.path().join("pomolog.db");
    let settings = Arc::new(SqliteSettings::open(dir.path().join("settings.db"))?);
    settings.set(&[
        (SOURCE_USERNAME, ALICE),
        (SOURCE_TYPE, "local"),
        (FILE_SOURCE_FILENAME, text.to_str().ok_or("path")?),
        (SQLITE_SOURCE_FILENAME, db.to_str().ok_or("path")?),
    ])?;
    let holder = holder(settings.clone(), SourceFactory::with_defaults());

    let local = holder.recreate()?;
    local.start()?;
    local.execute(StrategyKind::CreateBacklog, &["b1", "In the text file"])?;

    settings.set(&[(SOURCE_TYPE, "sqlite")])?;
    let sqlite = holder.recreate()?;
    assert_eq!(local.state(), SourceState::Disconnected);
    sqlite.start()?;
    assert_eq!(sqlite.name(), "sqlite");
    assert!(sqlite.find_backlog("b1").is_none());
    sqlite.execute(StrategyKind::CreateBacklog, &["b2", "In the database"])?;

    settings.set(&[(SOURCE_TYPE, "local")])?;
    let back = holder.recreate()?;
    back.start()?;
    assert!(back.find_backlog("b1").is_some());
    assert!(back.find_backlog("b2").is_none());
    Ok(())
}

#[test]
fn settings_outlive_the_process() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("settings.db");
    {
        let settings = SqliteSettings::open(&path)?;
        settings.set(&[(SOURCE_TYPE, "ephemeral"), (SOURCE_USERNAME, ALICE)])?;
    }
    let settings = Arc::new(SqliteSettings::open(&path)?);
    assert_eq!(settings.get(SOURCE_TYPE)?.as_deref(), Some("ephemeral"));
    let source = holder(settings, SourceFactory::with_defaults()).recreate()?;
    source.start()?;
    assert!(source.find_user(ALICE).is_some());
    Ok(())
}

#[test]
fn custom_producers_plug_into_the_factory() -> Result<(), Box<dyn std::error::Error>> {
    let shared = MemoryLog::new();
    let handle = shared.clone();
    let mut factory = SourceFactory::with_defaults();
    factory.register(
        "shared-memory",
        Box::new(
            move |_: &dyn Settings| -> Result<Box<dyn LogTransport>, EngineError> {
                Ok(Box::new(handle.clone()))
            },
        ),
    );
    assert!(factory.is_valid("shared-memory"));

    let settings = Arc::new(pomolog_core::MemorySettings::with_values(&[
        (SOURCE_TYPE, "shared-memory"),
        (SOURCE_USERNAME, ALICE),
    ]));
    let holder = holder(settings, factory);
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    holder.emitter().subscribe(
        "AfterSourceChanged",
        callback(move |p| {
            sink.lock().push(p.text("source").unwrap_or_default().to_string());
            Ok(())
        }),
        false,
    )?;

    let source = holder.recreate()?;
    source.start()?;
    source.execute(StrategyKind::CreateBacklog, &["b1", "Shared"])?;
    assert_eq!(shared.lines().len(), 2);
    assert_eq!(*changes.lock(), vec![source.id()]);
    Ok(())
}
