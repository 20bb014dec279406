use super::timer::default_duration;
use super::{ExecContext, Strategy};
use crate::emitter::EventParams;
use crate::error::CoreError;
use crate::events;
use crate::model::{ItemPath, PomodoroKind, Workitem};
use crate::settings::{DEFAULT_REST_DURATION, DEFAULT_WORK_DURATION};

pub const MAX_POMODOROS_PER_ADD: usize = 1_000;

fn workitem_of<'d>(s: &Strategy, ctx: &'d ExecContext<'_>, uid: &str) -> Result<(String, &'d Workitem), CoreError> {
    let user = s.acting_user(ctx.data)?;
    let backlog = user
        .backlog_of(uid)
        .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))?;
    let workitem = user
        .find_workitem(uid)
        .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))?;
    Ok((backlog.to_string(), workitem))
}

fn workitem_mut<'d>(s: &Strategy, ctx: &'d mut ExecContext<'_>, uid: &str) -> Result<&'d mut Workitem, CoreError> {
    s.acting_user_mut(ctx.data)?
        .find_workitem_mut(uid)
        .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))
}

pub(super) fn add(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let count: usize = s.parse_param(1, "number of pomodoros")?;
    if !(1..=MAX_POMODOROS_PER_ADD).contains(&count) {
        return Err(s.invalid(format!(
            "between 1 and {MAX_POMODOROS_PER_ADD} pomodoros can be added at once, got {count}"
        )));
    }
    let kind = match s.optional(2) {
        Some(raw) => PomodoroKind::parse(raw).map_err(|e| s.invalid(e.to_string()))?,
        None => PomodoroKind::Normal,
    };
    let (backlog, workitem) = workitem_of(s, ctx, uid)?;
    if workitem.is_sealed() {
        return Err(CoreError::InvalidState(format!("workitem {uid} is sealed")));
    }
    let work = default_duration(ctx, DEFAULT_WORK_DURATION)?;
    let rest = default_duration(ctx, DEFAULT_REST_DURATION)?;

    let params = EventParams::new()
        .with("user", s.user())
        .with("workitem", uid)
        .with("num_pomodoros", count);
    s.emit(ctx.emitter, events::BEFORE_POMODORO_ADD, params.clone())?;
    let added = workitem_mut(s, ctx, uid)?.add_pomodoros(count, work, rest, kind, s.when());
    ctx.data
        .item_updated(&ItemPath::workitem(s.user(), &backlog, uid), s.when());
    s.emit(ctx.emitter, events::AFTER_POMODORO_ADD, params)?;
    Ok(added.last().cloned())
}

/// Removes the newest `n` pomodoros that were never started.
pub(super) fn remove(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let count: usize = s.parse_param(1, "number of pomodoros")?;
    if count == 0 {
        return Err(s.invalid("at least one pomodoro must be removed"));
    }
    let (backlog, workitem) = workitem_of(s, ctx, uid)?;
    if workitem.is_sealed() {
        return Err(CoreError::InvalidState(format!("workitem {uid} is sealed")));
    }
    let victims = workitem.last_startable(count);
    if victims.len() < count {
        return Err(CoreError::InvalidState(format!(
            "workitem {uid} has only {} startable pomodoros",
            victims.len()
        )));
    }

    let params = EventParams::new()
        .with("user", s.user())
        .with("workitem", uid)
        .with("num_pomodoros", count);
    s.emit(ctx.emitter, events::BEFORE_POMODORO_REMOVE, params.clone())?;
    let workitem = workitem_mut(s, ctx, uid)?;
    for victim in &victims {
        workitem.remove_pomodoro(victim);
    }
    ctx.data
        .item_updated(&ItemPath::workitem(s.user(), &backlog, uid), s.when());
    s.emit(ctx.emitter, events::AFTER_POMODORO_REMOVE, params)?;
    Ok(None)
}

pub(super) fn add_interruption(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let reason = s.optional(1);
    let duration = s.parse_duration(2, "interruption duration")?;
    let (backlog, workitem) = workitem_of(s, ctx, uid)?;
    let pomodoro = workitem
        .running_pomodoro()
        .ok_or_else(|| CoreError::InvalidState(format!("workitem {uid} has no running pomodoro")))?
        .uid()
        .to_string();

    let mut params = EventParams::new()
        .with("user", s.user())
        .with("workitem", uid)
        .with("pomodoro", pomodoro.as_str())
        .with("reason", reason.map(str::to_string))
        .with("duration", duration);
    s.emit(ctx.emitter, events::BEFORE_POMODORO_INTERRUPTED, params.clone())?;
    let interruption = workitem_mut(s, ctx, uid)?
        .pomodoro_mut(&pomodoro)
        .ok_or_else(|| CoreError::NotFound(format!("pomodoro {pomodoro}")))?
        .add_interruption(reason, duration, false, s.when());
    ctx.data.item_updated(
        &ItemPath::pomodoro(s.user(), &backlog, uid, &pomodoro),
        s.when(),
    );
    params.insert("interruption", interruption.as_str());
    s.emit(ctx.emitter, events::AFTER_POMODORO_INTERRUPTED, params)?;
    Ok(Some(interruption))
}

/// StartRestInternal: the running pomodoro of the workitem moves from work to rest.
pub(super) fn start_rest(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let (backlog, workitem) = workitem_of(s, ctx, uid)?;
    if !workitem.is_running() {
        return Err(CoreError::InvalidState(format!("workitem {uid} is not running")));
    }
    let pomodoro = workitem
        .running_pomodoro()
        .filter(|p| p.is_working())
        .ok_or_else(|| CoreError::InvalidState(format!("workitem {uid} has no pomodoro in work")))?;
    let (pomodoro, rest) = (pomodoro.uid().to_string(), pomodoro.rest_duration());
    let timer_tracks_it = s
        .acting_user(ctx.data)?
        .timer()
        .running()
        .is_some_and(|r| r.pomodoro == pomodoro);

    let params = EventParams::new()
        .with("user", s.user())
        .with("workitem", uid)
        .with("pomodoro", pomodoro.as_str());
    s.emit(ctx.emitter, events::BEFORE_POMODORO_REST_START, params.clone())?;
    workitem_mut(s, ctx, uid)?
        .pomodoro_mut(&pomodoro)
        .ok_or_else(|| CoreError::NotFound(format!("pomodoro {pomodoro}")))?
        .start_rest(s.when())?;
    ctx.data.item_updated(
        &ItemPath::pomodoro(s.user(), &backlog, uid, &pomodoro),
        s.when(),
    );
    if timer_tracks_it {
        s.acting_user_mut(ctx.data)?.timer_mut().rest(rest, s.when());
        ctx.data.item_updated(&ItemPath::timer(s.user()), s.when());
        s.emit(ctx.emitter, events::TIMER_WORK_COMPLETE, params.clone())?;
    }
    s.emit(ctx.emitter, events::AFTER_POMODORO_REST_START, params)?;
    Ok(None)
}

/// FinishPomodoroInternal: seals the running pomodoro of the workitem.
pub(super) fn finish(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let (backlog, workitem) = workitem_of(s, ctx, uid)?;
    if !workitem.is_running() {
        return Err(CoreError::InvalidState(format!("workitem {uid} is not running")));
    }
    let pomodoro = workitem
        .running_pomodoro()
        .ok_or_else(|| CoreError::InvalidState(format!("workitem {uid} has no running pomodoro")))?
        .uid()
        .to_string();
    let timer_tracks_it = s
        .acting_user(ctx.data)?
        .timer()
        .running()
        .is_some_and(|r| r.pomodoro == pomodoro);

    let params = EventParams::new()
        .with("user", s.user())
        .with("workitem", uid)
        .with("pomodoro", pomodoro.as_str());
    s.emit(ctx.emitter, events::BEFORE_POMODORO_COMPLETE, params.clone())?;
    let sealed = workitem_mut(s, ctx, uid)?
        .pomodoro_mut(&pomodoro)
        .ok_or_else(|| CoreError::NotFound(format!("pomodoro {pomodoro}")))?
        .seal(s.when())?;
    if !sealed {
        return Err(CoreError::InvalidState(format!(
            "pomodoro {pomodoro} cannot be finished before its work is over"
        )));
    }
    ctx.data.item_updated(
        &ItemPath::pomodoro(s.user(), &backlog, uid, &pomodoro),
        s.when(),
    );
    if timer_tracks_it {
        s.acting_user_mut(ctx.data)?.timer_mut().idle(s.when());
        ctx.data.item_updated(&ItemPath::timer(s.user()), s.when());
        s.emit(ctx.emitter, events::TIMER_REST_COMPLETE, params.clone())?;
    }
    s.emit(ctx.emitter, events::AFTER_POMODORO_COMPLETE, params)?;
    Ok(None)
}
