use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;
use pomolog_core::{StrategyKind, callback};
use pomolog_engine::{ManualClock, SourceState};
use pomolog_harness::{ALICE, TestClient, at, epoch, init_tracing};
use pomolog_storage::{FileLog, SqliteLog, SqliteSnapshots};

fn work_session(client: &TestClient) -> Result<(), Box<dyn std::error::Error>> {
    client.plan("today", "write-report", 2)?;
    client.run(StrategyKind::CreateWorkitem, &["inbox", "today", "Read mail #admin"])?;
    client.advance(60);
    client.run(StrategyKind::StartTimer, &["write-report"])?;
    client.advance(600);
    client.run(StrategyKind::AddInterruption, &["write-report", "Phone call", "120"])?;
    client.advance(1500);
    // The first pomodoro is over by now; starting the next one rings it out first.
    client.run(StrategyKind::StartTimer, &["write-report", "1200", "600"])?;
    client.advance(300);
    client.run(StrategyKind::StopTimer, &[])?;
    client.run(StrategyKind::RenameBacklog, &["today", "Friday"])?;
    Ok(())
}

// ============================================================================
// Restarting over the same log
// ============================================================================

#[test]
fn file_log_replays_to_the_same_model() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pomolog.txt");

    let first = TestClient::on_file(&path)?;
    work_session(&first)?;
    let states = first.pomodoro_states("write-report");
    assert_eq!(states, vec!["finished", "canceled"]);
    let last_seq = first.source.last_seq();
    first.source.disconnect()?;

    let second = TestClient::on_file(&path)?;
    assert_eq!(second.source.state(), SourceState::Running);
    assert_eq!(second.source.last_seq(), last_seq);
    assert_eq!(second.pomodoro_states("write-report"), states);
    assert_eq!(second.source.find_backlog("today").map(|b| b.name().to_string()), Some("Friday".into()));
    assert_eq!(second.source.count_pomodoros(), 2);

    let workitem = second.source.find_workitem("write-report").ok_or("workitem missing")?;
    let first_pomodoro = workitem.pomodoro("write-report-p1").ok_or("pomodoro missing")?;
    assert_eq!(first_pomodoro.date_completed(), Some(at(60 + 1800)));
    assert_eq!(first_pomodoro.interruptions().count(), 1);
    Ok(())
}

#[test]
fn sqlite_log_replays_after_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pomolog.db");

    let first = TestClient::on_sqlite(&path)?;
    work_session(&first)?;
    let lines = first.source.last_seq();
    first.source.disconnect()?;

    let second = TestClient::on_sqlite(&path)?;
    assert_eq!(second.source.last_seq(), lines);
    assert_eq!(second.pomodoro_states("write-report"), vec!["finished", "canceled"]);
    assert!(second.source.find_tag("admin").is_some());
    Ok(())
}

#[test]
fn snapshot_skips_what_it_already_covers() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("pomolog.db");
    let snapshots = SqliteSnapshots::open(dir.path().join("snapshots.db"))?;

    let first = TestClient::on_sqlite(&log_path)?;
    work_session(&first)?;
    snapshots.save(&first.source.snapshot()?)?;
    first.run(StrategyKind::RenameWorkitem, &["inbox", "Read mail #admin #later"])?;
    let id = first.source.id();
    first.source.disconnect()?;

    let snapshot = snapshots.latest(&id)?.ok_or("no snapshot")?;
    let clock = Arc::new(ManualClock::new(epoch()));
    let second = TestClient::over(Box::new(SqliteLog::open(&log_path)?), clock, &[])?;
    second.source.start_from(snapshot)?;
    assert_eq!(second.source.executed_count(), 1);
    assert!(second.source.find_tag("later").is_some());
    assert_eq!(second.pomodoro_states("write-report"), vec!["finished", "canceled"]);
    Ok(())
}

#[test]
fn snapshot_of_another_log_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let first = TestClient::on_file(&dir.path().join("a.txt"))?;
    let snapshot = first.source.snapshot()?;

    let clock = Arc::new(ManualClock::new(epoch()));
    let other = TestClient::over(Box::new(FileLog::open(dir.path().join("b.txt"))?), clock, &[])?;
    assert!(other.source.start_from(snapshot).is_err());
    assert_eq!(other.source.state(), SourceState::NotStarted);
    Ok(())
}

// ============================================================================
// Log text
// ============================================================================

#[test]
fn comments_and_blank_lines_carry_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pomolog.txt");
    fs::write(
        &path,
        [
            "# exported on a rainy day",
            "1, 2024-03-01 09:00:00+00:00, admin@local.host: CreateUser(\"alice@example.com\", \"Alice\")",
            "",
            "2, 2024-03-01 09:01:00+00:00, alice@example.com: CreateBacklog(\"b1\", \"Errands\")",
            "   ",
            "3, 2024-03-01T09:02:00.250+00:00, alice@example.com: CreateWorkitem(\"w1\", \"b1\", \"Buy \\\"good\\\" coffee\")",
            "",
        ]
        .join("\n"),
    )?;

    let client = TestClient::on_file(&path)?;
    assert_eq!(client.source.executed_count(), 3);
    let workitem = client.source.find_workitem("w1").ok_or("workitem missing")?;
    assert_eq!(workitem.name(), "Buy \"good\" coffee");
    assert_eq!(client.source.find_user(ALICE).map(|u| u.name().to_string()), Some("Alice".into()));
    Ok(())
}

#[test]
fn appended_lines_use_the_canonical_form() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pomolog.txt");
    let client = TestClient::on_file(&path)?;
    client.advance(5);
    client.run(StrategyKind::CreateBacklog, &["b1", "Say \"hi\""])?;
    client.run(StrategyKind::DeleteBacklog, &["b1"])?;

    let text = fs::read_to_string(&path)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "1, 2024-03-01 09:00:00+00:00, admin@local.host: CreateUser(\"alice@example.com\", \"Alice\")",
            "2, 2024-03-01 09:00:05+00:00, alice@example.com: CreateBacklog(\"b1\", \"Say \\\"hi\\\"\")",
            "3, 2024-03-01 09:00:05+00:00, alice@example.com: DeleteBacklog(\"b1\", \"\")",
        ]
    );
    Ok(())
}

#[test]
fn replay_only_announces_itself() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pomolog.txt");
    let first = TestClient::on_file(&path)?;
    work_session(&first)?;
    first.source.disconnect()?;

    let clock = Arc::new(ManualClock::new(epoch()));
    let second = TestClient::over(Box::new(FileLog::open(&path)?), clock, &[])?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    second.source.emitter().subscribe(
        "*",
        callback(move |p| {
            sink.lock().push(p.event().to_string());
            Ok(())
        }),
        false,
    )?;
    second.source.start()?;
    assert_eq!(
        *seen.lock(),
        vec!["SourceMessagesRequested", "SourceMessagesProcessed"]
    );

    seen.lock().clear();
    second.run(StrategyKind::CreateBacklog, &["b2", "Later"])?;
    assert_eq!(
        *seen.lock(),
        vec![
            "BeforeMessageProcessed",
            "BeforeBacklogCreate",
            "AfterBacklogCreate",
            "AfterMessageProcessed"
        ]
    );
    Ok(())
}
