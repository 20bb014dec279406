use super::{ExecContext, Strategy, StrategyKind};
use crate::emitter::EventParams;
use crate::error::CoreError;
use crate::events;
use crate::model::{AUTO_VOID_REASON, ItemPath, PomodoroKind, PomodoroRef, Tenant};
use crate::model::is_valid_duration;
use crate::settings::DEFAULT_REST_DURATION;

/// The pomodoro a ticking timer points at, resolved to owned locators.
struct Running {
    backlog: String,
    workitem: String,
    pomodoro: String,
    kind: PomodoroKind,
    working: bool,
    rest: f64,
}

impl Running {
    fn path(&self, user: &str) -> ItemPath {
        ItemPath::pomodoro(user, &self.backlog, &self.workitem, &self.pomodoro)
    }

    fn params(&self, user: &str) -> EventParams {
        EventParams::new()
            .with("user", user)
            .with("workitem", self.workitem.as_str())
            .with("pomodoro", self.pomodoro.as_str())
    }
}

/// `Ok(None)` when the timer is ticking for a pomodoro that no longer exists.
fn running(s: &Strategy, data: &Tenant) -> Result<Option<Running>, CoreError> {
    let user = s.acting_user(data)?;
    let timer = user.timer();
    if timer.is_idling() {
        return Err(CoreError::InvalidState("the timer is not running".into()));
    }
    let Some(PomodoroRef { workitem, pomodoro }) = timer.running() else {
        return Ok(None);
    };
    let found = user.backlog_of(workitem).zip(
        user.find_workitem(workitem)
            .and_then(|w| w.pomodoro(pomodoro)),
    );
    Ok(found.map(|(backlog, p)| Running {
        backlog: backlog.to_string(),
        workitem: workitem.clone(),
        pomodoro: pomodoro.clone(),
        kind: p.kind(),
        working: p.is_working(),
        rest: p.rest_duration(),
    }))
}

fn idle_timer(s: &Strategy, ctx: &mut ExecContext<'_>, params: EventParams) -> Result<(), CoreError> {
    s.acting_user_mut(ctx.data)?.timer_mut().idle(s.when());
    ctx.data.item_updated(&ItemPath::timer(s.user()), s.when());
    s.emit(ctx.emitter, events::TIMER_REST_COMPLETE, params)
}

fn seal_running(s: &Strategy, ctx: &mut ExecContext<'_>, running: &Running) -> Result<(), CoreError> {
    let params = running.params(s.user());
    s.emit(ctx.emitter, events::BEFORE_POMODORO_COMPLETE, params.clone())?;
    let sealed = s
        .acting_user_mut(ctx.data)?
        .find_workitem_mut(&running.workitem)
        .and_then(|w| w.pomodoro_mut(&running.pomodoro))
        .ok_or_else(|| CoreError::NotFound(format!("pomodoro {}", running.pomodoro)))?
        .seal(s.when())?;
    if !sealed {
        return Err(CoreError::InvalidState(format!(
            "pomodoro {} cannot be finished before its work is over",
            running.pomodoro
        )));
    }
    ctx.data.item_updated(&running.path(s.user()), s.when());
    idle_timer(s, ctx, params.clone())?;
    s.emit(ctx.emitter, events::AFTER_POMODORO_COMPLETE, params)
}

/// A default duration from settings, refused like a strategy parameter would be.
pub(super) fn default_duration(ctx: &ExecContext<'_>, key: &str) -> Result<f64, CoreError> {
    let secs = ctx.settings.get_f64(key)?;
    if is_valid_duration(secs) {
        Ok(secs)
    } else {
        Err(CoreError::Settings(format!("{key} is out of range: {secs}")))
    }
}

/// StartWork: the legacy form of StartTimer with a mandatory work duration.
pub(super) fn start_work(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let work = s
        .parse_duration(1, "work duration")?
        .ok_or_else(|| s.invalid("work duration is required"))?;
    let rest = match s.parse_duration(2, "rest duration")? {
        Some(rest) => rest,
        None => default_duration(ctx, DEFAULT_REST_DURATION)?,
    };
    let params = vec![s.param(0).to_string(), work.to_string(), rest.to_string()];
    Ok(s.derive(ctx, StrategyKind::StartTimer, params)?.result)
}

pub(super) fn start_timer(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let work = s.parse_duration(1, "work duration")?;
    let rest = s.parse_duration(2, "rest duration")?;

    let user = s.acting_user(ctx.data)?;
    if user.timer().is_ticking() {
        let current = user.timer().running().map_or("", |r| r.workitem.as_str());
        return Err(CoreError::InvalidState(format!(
            "cannot start the timer for {uid}, it is already running for {current:?}"
        )));
    }
    let backlog = user
        .backlog_of(uid)
        .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))?
        .to_string();
    let workitem = user
        .find_workitem(uid)
        .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))?;
    if workitem.is_sealed() {
        return Err(CoreError::InvalidState(format!("workitem {uid} is sealed")));
    }
    let pomodoro = workitem
        .first_startable()
        .ok_or_else(|| CoreError::InvalidState(format!("no startable pomodoro in {uid}")))?;
    if pomodoro.kind() == PomodoroKind::Counter {
        return Err(CoreError::InvalidState(format!(
            "pomodoro {} is a counter and cannot be timed",
            pomodoro.uid()
        )));
    }
    let (pomodoro, kind) = (pomodoro.uid().to_string(), pomodoro.kind());
    let starting = !workitem.is_running();

    let params = EventParams::new()
        .with("user", s.user())
        .with("workitem", uid)
        .with("pomodoro", pomodoro.as_str())
        .with("work_duration", work)
        .with("rest_duration", rest);

    if starting {
        s.emit(ctx.emitter, events::BEFORE_WORKITEM_START, params.clone())?;
        let b = s.acting_user_mut(ctx.data)?.get_backlog_mut(&backlog)?;
        b.mark_work_started(s.when());
        if let Some(w) = b.workitem_mut(uid) {
            w.start(s.when());
        }
        ctx.data
            .item_updated(&ItemPath::workitem(s.user(), &backlog, uid), s.when());
        s.emit(ctx.emitter, events::AFTER_WORKITEM_START, params.clone())?;
    }

    s.emit(ctx.emitter, events::BEFORE_POMODORO_WORK_START, params.clone())?;
    let work_duration = {
        let p = s
            .acting_user_mut(ctx.data)?
            .find_workitem_mut(uid)
            .and_then(|w| w.pomodoro_mut(&pomodoro))
            .ok_or_else(|| CoreError::NotFound(format!("pomodoro {pomodoro}")))?;
        if kind == PomodoroKind::Normal {
            if let Some(work) = work {
                p.update_work_duration(work)?;
            }
            if let Some(rest) = rest {
                p.update_rest_duration(rest)?;
            }
        }
        p.start_work(s.when())?;
        p.work_duration(s.when())
    };
    ctx.data.item_updated(
        &ItemPath::pomodoro(s.user(), &backlog, uid, &pomodoro),
        s.when(),
    );

    let running = PomodoroRef {
        workitem: uid.to_string(),
        pomodoro: pomodoro.clone(),
    };
    s.acting_user_mut(ctx.data)?
        .timer_mut()
        .work(running, work_duration, s.when());
    ctx.data.item_updated(&ItemPath::timer(s.user()), s.when());
    s.emit(ctx.emitter, events::TIMER_WORK_START, params.clone())?;
    s.emit(ctx.emitter, events::AFTER_POMODORO_WORK_START, params)?;
    Ok(Some(pomodoro))
}

/// StopTimer: an explicit stop by the user. A normal pomodoro that still has work or a planned rest
/// ahead is voided; a tracker or a pomodoro in an open-ended rest is finished.
pub(super) fn stop_timer(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let Some(running) = running(s, ctx.data)? else {
        idle_timer(s, ctx, EventParams::new().with("user", s.user()))?;
        return Ok(None);
    };

    match running.kind {
        PomodoroKind::Counter => Err(CoreError::InvalidState(format!(
            "cannot stop the timer for counter pomodoro {}",
            running.pomodoro
        ))),
        PomodoroKind::Normal if running.rest > 0.0 || running.working => {
            let params = running.params(s.user()).with("reason", AUTO_VOID_REASON);
            s.emit(ctx.emitter, events::BEFORE_POMODORO_VOIDED, params.clone())?;
            s.acting_user_mut(ctx.data)?
                .find_workitem_mut(&running.workitem)
                .and_then(|w| w.pomodoro_mut(&running.pomodoro))
                .ok_or_else(|| CoreError::NotFound(format!("pomodoro {}", running.pomodoro)))?
                .void(AUTO_VOID_REASON, s.when())?;
            ctx.data.item_updated(&running.path(s.user()), s.when());
            idle_timer(s, ctx, running.params(s.user()))?;
            s.emit(ctx.emitter, events::AFTER_POMODORO_VOIDED, params)?;
            Ok(Some("voided".into()))
        }
        _ => {
            seal_running(s, ctx, &running)?;
            Ok(Some("finished".into()))
        }
    }
}

/// VoidPomodoro and FinishTracking: legacy aliases of StopTimer, optionally naming the workitem the
/// timer must be running for.
pub(super) fn stop_running(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let timer = s.acting_user(ctx.data)?.timer();
    if timer.is_idling() {
        return Err(CoreError::InvalidState("the timer is not running".into()));
    }
    if let Some(uid) = s.optional(0) {
        if !timer.is_running_workitem(uid) {
            return Err(CoreError::InvalidState(format!("the timer is not running for {uid}")));
        }
    }
    Ok(s.derive(ctx, StrategyKind::StopTimer, Vec::new())?.result)
}

/// TimerRingInternal: the current phase of the timer ran out.
pub(super) fn ring(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let running = running(s, ctx.data)?
        .ok_or_else(|| CoreError::InvalidState("the timer rings for a missing pomodoro".into()))?;

    if !running.working {
        seal_running(s, ctx, &running)?;
        return Ok(None);
    }
    if running.kind != PomodoroKind::Normal {
        return Err(CoreError::InvalidState(format!(
            "the timer should not ring for {} pomodoro {}",
            running.kind.as_str(),
            running.pomodoro
        )));
    }
    let params = running.params(s.user()).with("rest_duration", running.rest);
    s.emit(ctx.emitter, events::BEFORE_POMODORO_REST_START, params.clone())?;
    s.acting_user_mut(ctx.data)?
        .find_workitem_mut(&running.workitem)
        .and_then(|w| w.pomodoro_mut(&running.pomodoro))
        .ok_or_else(|| CoreError::NotFound(format!("pomodoro {}", running.pomodoro)))?
        .start_rest(s.when())?;
    ctx.data.item_updated(&running.path(s.user()), s.when());
    s.acting_user_mut(ctx.data)?
        .timer_mut()
        .rest(running.rest, s.when());
    ctx.data.item_updated(&ItemPath::timer(s.user()), s.when());
    s.emit(ctx.emitter, events::TIMER_WORK_COMPLETE, running.params(s.user()))?;
    s.emit(ctx.emitter, events::AFTER_POMODORO_REST_START, params)?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::{PomodoroState, WorkitemState};

    fn ready(kind: &str) -> Fixture {
        let mut fx = Fixture::new();
        fx.run(StrategyKind::CreateBacklog, &["b1", "Today"], 0).unwrap();
        fx.run(StrategyKind::CreateWorkitem, &["w1", "b1", "Write report"], 0).unwrap();
        fx.run(StrategyKind::AddPomodoro, &["w1", "2", kind], 0).unwrap();
        fx.take_events();
        fx
    }

    fn state(fx: &Fixture, pomodoro: &str) -> PomodoroState {
        fx.alice().find_workitem("w1").unwrap().pomodoro(pomodoro).unwrap().state()
    }

    #[test]
    fn durations_must_be_finite_and_bounded() {
        let mut fx = ready("normal");
        for (work, rest) in [("1e18", "300"), ("inf", "300"), ("NaN", "300"), ("-1", "300"), ("600", "1e300")] {
            assert!(
                matches!(
                    fx.run(StrategyKind::StartTimer, &["w1", work, rest], 10),
                    Err(CoreError::InvalidParams { .. })
                ),
                "{work} {rest}"
            );
            assert!(matches!(
                fx.run(StrategyKind::StartWork, &["w1", work, rest], 10),
                Err(CoreError::InvalidParams { .. })
            ));
        }
        assert!(fx.alice().timer().is_idling());
        assert_eq!(state(&fx, "w1-p1"), PomodoroState::New);

        fx.run(StrategyKind::StartTimer, &["w1", "31622400", "0"], 10).unwrap();
        assert_eq!(fx.alice().timer().next_state_change(), Some(at(10 + 31_622_400)));
    }

    #[test]
    fn start_timer_starts_workitem_and_first_pomodoro() {
        let mut fx = ready("normal");
        let outcome = fx.run(StrategyKind::StartTimer, &["w1", "600", "120"], 10).unwrap();
        assert_eq!(outcome.result.as_deref(), Some("w1-p1"));
        assert_eq!(
            fx.take_events(),
            vec![
                "BeforeWorkitemStart",
                "AfterWorkitemStart",
                "BeforePomodoroWorkStart",
                "TimerWorkStart",
                "AfterPomodoroWorkStart",
            ]
        );
        let alice = fx.alice();
        assert_eq!(alice.find_workitem("w1").unwrap().state(), WorkitemState::Running);
        assert_eq!(alice.backlog("b1").unwrap().work_started(), Some(at(10)));
        assert_eq!(alice.timer().next_state_change(), Some(at(610)));
        let p = alice.find_workitem("w1").unwrap().pomodoro("w1-p1").unwrap();
        assert_eq!(p.planned_end_of_rest(), Some(at(730)));

        assert!(matches!(
            fx.run(StrategyKind::StartTimer, &["w1"], 20),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn omitted_durations_keep_the_plan() {
        let mut fx = ready("normal");
        fx.run(StrategyKind::StartTimer, &["w1"], 0).unwrap();
        assert_eq!(fx.alice().timer().next_state_change(), Some(at(1500)));
    }

    #[test]
    fn ring_moves_through_rest_to_idle() {
        let mut fx = ready("normal");
        fx.run(StrategyKind::StartTimer, &["w1"], 0).unwrap();
        fx.take_events();

        fx.run(StrategyKind::TimerRingInternal, &[], 1500).unwrap();
        assert_eq!(
            fx.take_events(),
            vec!["BeforePomodoroRestStart", "TimerWorkComplete", "AfterPomodoroRestStart"]
        );
        assert_eq!(state(&fx, "w1-p1"), PomodoroState::Rest);

        fx.run(StrategyKind::TimerRingInternal, &[], 1800).unwrap();
        assert_eq!(
            fx.take_events(),
            vec!["BeforePomodoroComplete", "TimerRestComplete", "AfterPomodoroComplete"]
        );
        assert_eq!(state(&fx, "w1-p1"), PomodoroState::Finished);
        assert!(fx.alice().timer().is_idling());
        assert!(fx.run(StrategyKind::TimerRingInternal, &[], 1900).is_err());

        // The next pomodoro starts from where the first left off.
        let outcome = fx.run(StrategyKind::StartTimer, &["w1"], 2000).unwrap();
        assert_eq!(outcome.result.as_deref(), Some("w1-p2"));
        assert!(fx.take_events().iter().all(|e| e != "BeforeWorkitemStart"));
    }

    #[test]
    fn stopping_a_working_pomodoro_voids_it() {
        let mut fx = ready("normal");
        fx.run(StrategyKind::StartTimer, &["w1"], 0).unwrap();
        fx.take_events();
        let outcome = fx.run(StrategyKind::StopTimer, &[], 100).unwrap();
        assert_eq!(outcome.result.as_deref(), Some("voided"));
        assert_eq!(
            fx.take_events(),
            vec!["BeforePomodoroVoided", "TimerRestComplete", "AfterPomodoroVoided"]
        );
        assert_eq!(state(&fx, "w1-p1"), PomodoroState::Canceled);
        let p = fx.alice().find_workitem("w1").unwrap().pomodoro("w1-p1").unwrap();
        let interruption = p.interruptions().next().unwrap();
        assert!(interruption.is_void());
        assert_eq!(interruption.reason(), Some(AUTO_VOID_REASON));
        assert!(fx.run(StrategyKind::StopTimer, &[], 200).is_err());
    }

    #[test]
    fn stopping_a_long_break_finishes_the_pomodoro() {
        let mut fx = ready("normal");
        fx.run(StrategyKind::StartTimer, &["w1", "1500", "0"], 0).unwrap();
        fx.run(StrategyKind::TimerRingInternal, &[], 1500).unwrap();
        assert_eq!(fx.alice().timer().next_state_change(), None);
        let outcome = fx.run(StrategyKind::StopTimer, &[], 4000).unwrap();
        assert_eq!(outcome.result.as_deref(), Some("finished"));
        assert_eq!(state(&fx, "w1-p1"), PomodoroState::Finished);
    }

    #[test]
    fn trackers_never_ring_and_finish_on_stop() {
        let mut fx = ready("tracker");
        fx.run(StrategyKind::StartTimer, &["w1", "1500", "300"], 0).unwrap();
        assert_eq!(fx.alice().timer().next_state_change(), None);
        assert!(fx.run(StrategyKind::TimerRingInternal, &[], 1500).is_err());

        let outcome = fx.run(StrategyKind::FinishTracking, &["w1"], 5400).unwrap();
        assert_eq!(outcome.result.as_deref(), Some("finished"));
        let p = fx.alice().find_workitem("w1").unwrap().pomodoro("w1-p1").unwrap();
        assert_eq!(p.work_duration(at(9999)), 5400.0);
    }

    #[test]
    fn void_pomodoro_checks_the_workitem() {
        let mut fx = ready("normal");
        fx.run(StrategyKind::CreateWorkitem, &["w2", "b1", "Other"], 0).unwrap();
        assert!(fx.run(StrategyKind::VoidPomodoro, &[], 1).is_err());
        fx.run(StrategyKind::StartTimer, &["w1"], 1).unwrap();
        assert!(fx.run(StrategyKind::VoidPomodoro, &["w2"], 2).is_err());
        fx.take_events();

        fx.run(StrategyKind::VoidPomodoro, &["w1"], 3).unwrap();
        let events = fx.take_events();
        assert_eq!(events.first().map(String::as_str), Some("BeforeMessageProcessed"));
        assert!(events.contains(&"AfterPomodoroVoided".to_string()));
    }

    #[test]
    fn start_work_defaults_rest_from_settings() {
        let mut fx = ready("normal");
        fx.run(StrategyKind::StartWork, &["w1", "600"], 0).unwrap();
        let p = fx.alice().find_workitem("w1").unwrap().pomodoro("w1-p1").unwrap();
        assert_eq!(p.planned_end_of_rest(), Some(at(900)));
        assert!(matches!(
            fx.run(StrategyKind::StartWork, &["w1", "soon"], 1),
            Err(CoreError::InvalidParams { .. })
        ));
    }

    #[test]
    fn completing_a_running_workitem_voids_its_pomodoro() {
        let mut fx = ready("normal");
        fx.run(StrategyKind::StartTimer, &["w1"], 0).unwrap();
        fx.run(StrategyKind::CompleteWorkitem, &["w1", "finished"], 60).unwrap();
        assert_eq!(state(&fx, "w1-p1"), PomodoroState::Canceled);
        assert!(fx.alice().timer().is_idling());
        assert_eq!(fx.alice().find_workitem("w1").unwrap().state(), WorkitemState::Finished);
    }

    #[test]
    fn deleting_a_running_workitem_stops_the_timer() {
        let mut fx = ready("normal");
        fx.run(StrategyKind::StartTimer, &["w1"], 0).unwrap();
        fx.run(StrategyKind::DeleteWorkitem, &["w1"], 60).unwrap();
        assert!(fx.alice().timer().is_idling());
        assert!(fx.alice().find_workitem("w1").is_none());
    }

    #[test]
    fn counters_cannot_be_timed() {
        let mut fx = ready("counter");
        assert!(matches!(
            fx.run(StrategyKind::StartTimer, &["w1"], 0),
            Err(CoreError::InvalidState(_))
        ));
        assert!(fx.take_events().is_empty());
    }
}
