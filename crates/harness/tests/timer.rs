use std::sync::Arc;
use std::time::Duration;

use pomolog_core::StrategyKind;
use pomolog_core::settings::SOURCE_AUTO_SEAL_TOLERANCE;
use pomolog_engine::{ManualClock, Ticker};
use pomolog_harness::{TestClient, at, epoch};
use pomolog_storage::MemoryLog;

fn running_at_zero() -> Result<TestClient, Box<dyn std::error::Error>> {
    let client = TestClient::new()?;
    client.plan("b1", "w1", 2)?;
    client.run(StrategyKind::StartTimer, &["w1"])?;
    Ok(client)
}

// ============================================================================
// Auto-seal
// ============================================================================

#[test]
fn overdue_work_turns_into_rest() -> Result<(), Box<dyn std::error::Error>> {
    let client = running_at_zero()?;
    assert_eq!(client.source.auto_seal_at(at(1600))?, 1);
    assert_eq!(client.pomodoro_states("w1"), vec!["rest", "new"]);
    assert_eq!(client.source.next_transition(), Some(at(1800)));
    Ok(())
}

#[test]
fn abandoned_pomodoro_finishes_at_planned_end() -> Result<(), Box<dyn std::error::Error>> {
    let client = running_at_zero()?;
    client.advance(1900);
    assert_eq!(client.source.auto_seal()?, 1);
    assert_eq!(client.pomodoro_states("w1"), vec!["finished", "new"]);
    let workitem = client.source.find_workitem("w1").ok_or("workitem missing")?;
    let pomodoro = workitem.pomodoro("w1-p1").ok_or("pomodoro missing")?;
    assert_eq!(pomodoro.date_completed(), Some(at(1800)));
    assert_eq!(client.source.next_transition(), None);
    assert_eq!(client.source.auto_seal()?, 0);
    Ok(())
}

#[test]
fn tolerance_delays_sealing() -> Result<(), Box<dyn std::error::Error>> {
    let log = MemoryLog::new();
    let client = TestClient::over(
        Box::new(log),
        Arc::new(ManualClock::new(epoch())),
        &[(SOURCE_AUTO_SEAL_TOLERANCE, "600")],
    )?;
    client.source.start()?;
    client.plan("b1", "w1", 1)?;
    client.run(StrategyKind::StartTimer, &["w1"])?;

    assert_eq!(client.source.auto_seal_at(at(1900))?, 0);
    assert_eq!(client.pomodoro_states("w1"), vec!["work"]);
    assert_eq!(client.source.auto_seal_at(at(2500))?, 1);
    assert_eq!(client.pomodoro_states("w1"), vec!["finished"]);
    Ok(())
}

#[test]
fn sealing_is_never_written_to_the_log() -> Result<(), Box<dyn std::error::Error>> {
    let log = MemoryLog::new();
    let client = TestClient::on_log(&log)?;
    client.plan("b1", "w1", 1)?;
    client.run(StrategyKind::StartTimer, &["w1"])?;
    let before = log.lines();
    client.source.auto_seal_at(at(5000))?;
    assert_eq!(log.lines(), before);

    // A replay reaches the same state once it seals at the same instant.
    let replayed = TestClient::on_log(&log)?;
    assert_eq!(replayed.pomodoro_states("w1"), vec!["work"]);
    replayed.source.auto_seal_at(at(5000))?;
    assert_eq!(replayed.pomodoro_states("w1"), client.pomodoro_states("w1"));
    Ok(())
}

// ============================================================================
// Rings before timer commands
// ============================================================================

#[test]
fn starting_late_rings_out_the_previous_pomodoro() -> Result<(), Box<dyn std::error::Error>> {
    let client = running_at_zero()?;
    client.advance(4000);
    client.run(StrategyKind::StartTimer, &["w1"])?;
    assert_eq!(client.pomodoro_states("w1"), vec!["finished", "work"]);
    assert_eq!(client.source.next_transition(), Some(at(4000 + 1500)));
    Ok(())
}

#[test]
fn stopping_mid_work_voids() -> Result<(), Box<dyn std::error::Error>> {
    let client = running_at_zero()?;
    client.advance(700);
    client.run(StrategyKind::VoidPomodoro, &["w1"])?;
    assert_eq!(client.pomodoro_states("w1"), vec!["canceled", "new"]);
    assert!(client.run(StrategyKind::StopTimer, &[]).is_ok());
    assert!(client.run(StrategyKind::VoidPomodoro, &[]).is_err());
    Ok(())
}

#[test]
fn stopping_after_rest_is_due_finishes_instead() -> Result<(), Box<dyn std::error::Error>> {
    let client = running_at_zero()?;
    client.advance(1850);
    client.run(StrategyKind::StopTimer, &[])?;
    assert_eq!(client.pomodoro_states("w1"), vec!["finished", "new"]);
    Ok(())
}

#[test]
fn ticker_drives_the_next_seal() -> Result<(), Box<dyn std::error::Error>> {
    let client = Arc::new(running_at_zero()?);
    let due = client.source.next_transition().ok_or("nothing scheduled")?;
    client.clock.set(due + chrono::Duration::seconds(1));

    let ticker = Ticker::new();
    let driven = Arc::clone(&client);
    ticker
        .schedule(Duration::from_millis(10), move || {
            if let Err(e) = driven.source.auto_seal() {
                tracing::error!(error = %e, "scheduled auto-seal failed");
            }
        })
        .join()
        .map_err(|_| "ticker thread panicked")?;
    assert_eq!(client.pomodoro_states("w1"), vec!["rest", "new"]);
    Ok(())
}
