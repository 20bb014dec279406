//! The one path every strategy takes into the model, whether replayed, executed live or test-run
//! during repair.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use pomolog_core::events::{AFTER_MESSAGE_PROCESSED, BEFORE_MESSAGE_PROCESSED};
use pomolog_core::strategy::message_params;
use pomolog_core::{CoreError, ExecContext, Outcome, Strategy, StrategyKind};

/// A transition logged within this many seconds before the timer was due still counts as after
/// the ring. Back-to-back pomodoros started by a timer land a fraction of a second early.
pub const RING_MARGIN_SECONDS: i64 = 1;

/// Executes `strategy`, ringing an overdue timer first when the kind depends on a settled timer,
/// and wraps the execution in `BeforeMessageProcessed` / `AfterMessageProcessed`. The after event
/// fires whether or not the strategy succeeded.
pub fn run(
    ctx: &mut ExecContext<'_>,
    strategy: &Strategy,
    auto: bool,
    persist: bool,
) -> Result<Outcome, CoreError> {
    if strategy.requires_sealing() {
        ring_overdue_timer(ctx, strategy)?;
    }

    let params = message_params(strategy, auto, persist);
    ctx.emitter
        .emit(BEFORE_MESSAGE_PROCESSED, params.clone(), strategy.carry())?;
    let outcome = strategy.execute(ctx);
    let after = match &outcome {
        Ok(o) => params.with("result", o.result.clone()),
        Err(e) => params.with("error", e.to_string()),
    };
    ctx.emitter
        .emit(AFTER_MESSAGE_PROCESSED, after, strategy.carry())?;
    outcome
}

/// A work phase may ring into a rest phase which is itself overdue, so a timer rings at most this
/// many times before one strategy.
pub const MAX_RINGS: usize = 2;

/// Rings the acting user's timer at its scheduled instant while that instant is not after the
/// strategy.
fn ring_overdue_timer(ctx: &mut ExecContext<'_>, strategy: &Strategy) -> Result<(), CoreError> {
    for _ in 0..MAX_RINGS {
        let Some(ring) = overdue_ring(ctx, strategy) else {
            return Ok(());
        };
        debug!(user = %strategy.user(), %ring, before = %strategy.kind(), "ringing overdue timer");
        strategy.derive_with(ctx, StrategyKind::TimerRingInternal, Vec::new(), Some(ring), None)?;
    }
    match overdue_ring(ctx, strategy) {
        None => Ok(()),
        Some(ring) => Err(CoreError::InvalidState(format!(
            "timer of {} is still due at {ring} after ringing {MAX_RINGS} times",
            strategy.user()
        ))),
    }
}

fn overdue_ring(ctx: &ExecContext<'_>, strategy: &Strategy) -> Option<DateTime<Utc>> {
    let margin = Duration::seconds(RING_MARGIN_SECONDS);
    ctx.data
        .user(strategy.user())?
        .timer()
        .next_state_change()
        .filter(|ring| strategy.when() + margin >= *ring)
}
