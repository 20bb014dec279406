use std::collections::BTreeSet;

use super::{ExecContext, Strategy, StrategyKind};
use crate::emitter::EventParams;
use crate::error::CoreError;
use crate::events;
use crate::model::{ItemPath, User, Workitem, WorkitemState};

/// Backlog uid and a clone-free view of what handlers need before mutating.
fn locate<'d>(user: &'d User, uid: &str) -> Result<(&'d str, &'d Workitem), CoreError> {
    let backlog = user
        .backlog_of(uid)
        .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))?;
    let workitem = user
        .find_workitem(uid)
        .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))?;
    Ok((backlog, workitem))
}

pub(super) fn create(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let (uid, backlog, name) = (s.param(0), s.param(1), s.param(2));
    let user = s.acting_user(ctx.data)?;
    if !user.contains_backlog(backlog) {
        return Err(CoreError::NotFound(format!("backlog {backlog}")));
    }
    if user.find_workitem(uid).is_some() {
        return Err(CoreError::AlreadyExists(format!("workitem {uid}")));
    }

    let params = EventParams::new()
        .with("user", s.user())
        .with("backlog", backlog)
        .with("workitem", uid)
        .with("name", name);
    s.emit(ctx.emitter, events::BEFORE_WORKITEM_CREATE, params.clone())?;
    let workitem = Workitem::new(uid, name, backlog, s.when());
    let tags = workitem.tags();
    s.acting_user_mut(ctx.data)?
        .get_backlog_mut(backlog)?
        .insert_workitem(workitem);
    ctx.data
        .item_updated(&ItemPath::workitem(s.user(), backlog, uid), s.when());
    s.emit(ctx.emitter, events::AFTER_WORKITEM_CREATE, params)?;
    update_tags(s, ctx, uid, &BTreeSet::new(), &tags)?;
    Ok(Some(uid.to_string()))
}

pub(super) fn delete(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let user = s.acting_user(ctx.data)?;
    let (backlog, workitem) = locate(user, uid)?;
    let backlog = backlog.to_string();
    let tags = workitem.tags();
    let timer_runs_it = user.timer().is_running_workitem(uid);

    if timer_runs_it {
        s.derive(ctx, StrategyKind::VoidPomodoro, vec![uid.to_string()])?;
    }
    let params = EventParams::new()
        .with("user", s.user())
        .with("backlog", backlog.as_str())
        .with("workitem", uid);
    s.emit(ctx.emitter, events::BEFORE_WORKITEM_DELETE, params.clone())?;
    s.acting_user_mut(ctx.data)?
        .get_backlog_mut(&backlog)?
        .remove_workitem(uid);
    ctx.data
        .item_updated(&ItemPath::backlog(s.user(), &backlog), s.when());
    s.emit(ctx.emitter, events::AFTER_WORKITEM_DELETE, params)?;
    update_tags(s, ctx, uid, &tags, &BTreeSet::new())?;
    Ok(None)
}

pub(super) fn rename(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let (uid, name) = (s.param(0), s.param(1));
    let (backlog, workitem) = locate(s.acting_user(ctx.data)?, uid)?;
    if workitem.name() == name {
        return Ok(None);
    }
    if workitem.is_sealed() {
        return Err(CoreError::InvalidState(format!("workitem {uid} is sealed")));
    }
    let backlog = backlog.to_string();
    let old_name = workitem.name().to_string();
    let old_tags = workitem.tags();

    let params = EventParams::new()
        .with("user", s.user())
        .with("workitem", uid)
        .with("old_name", old_name)
        .with("new_name", name);
    s.emit(ctx.emitter, events::BEFORE_WORKITEM_RENAME, params.clone())?;
    let workitem = s
        .acting_user_mut(ctx.data)?
        .find_workitem_mut(uid)
        .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))?;
    workitem.set_name(name);
    let new_tags = workitem.tags();
    ctx.data
        .item_updated(&ItemPath::workitem(s.user(), &backlog, uid), s.when());
    s.emit(ctx.emitter, events::AFTER_WORKITEM_RENAME, params)?;
    update_tags(s, ctx, uid, &old_tags, &new_tags)?;
    Ok(None)
}

pub(super) fn complete(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let target = WorkitemState::parse(s.param(1))?;
    if !target.is_sealed() {
        return Err(s.invalid(format!("cannot complete a workitem as {}", target.as_str())));
    }
    let user = s.acting_user(ctx.data)?;
    let (backlog, workitem) = locate(user, uid)?;
    if workitem.is_sealed() {
        return Err(CoreError::InvalidState(format!("workitem {uid} is already sealed")));
    }
    let backlog = backlog.to_string();
    let timer_runs_it = user.timer().is_running_workitem(uid);

    if timer_runs_it {
        s.derive(ctx, StrategyKind::VoidPomodoro, vec![uid.to_string()])?;
    }
    let params = EventParams::new()
        .with("user", s.user())
        .with("workitem", uid)
        .with("target_state", target.as_str());
    s.emit(ctx.emitter, events::BEFORE_WORKITEM_COMPLETE, params.clone())?;
    s.acting_user_mut(ctx.data)?
        .find_workitem_mut(uid)
        .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))?
        .seal(target, s.when())?;
    ctx.data
        .item_updated(&ItemPath::workitem(s.user(), &backlog, uid), s.when());
    s.emit(ctx.emitter, events::AFTER_WORKITEM_COMPLETE, params)?;
    Ok(None)
}

/// MoveWorkitem: re-parents the workitem in one step.
pub(super) fn relocate(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let (uid, target) = (s.param(0), s.param(1));
    let user = s.acting_user(ctx.data)?;
    let (source, workitem) = locate(user, uid)?;
    if workitem.is_sealed() || workitem.is_running() {
        return Err(CoreError::InvalidState(format!(
            "workitem {uid} is {} and cannot be moved",
            workitem.state().as_str()
        )));
    }
    if !user.contains_backlog(target) {
        return Err(CoreError::NotFound(format!("backlog {target}")));
    }
    if source == target {
        return Ok(None);
    }
    let source = source.to_string();

    let params = EventParams::new()
        .with("user", s.user())
        .with("workitem", uid)
        .with("old_backlog", source.as_str())
        .with("new_backlog", target);
    s.emit(ctx.emitter, events::BEFORE_WORKITEM_MOVE, params.clone())?;
    {
        let user = s.acting_user_mut(ctx.data)?;
        let moved = user
            .get_backlog_mut(&source)?
            .remove_workitem(uid)
            .ok_or_else(|| CoreError::NotFound(format!("workitem {uid}")))?;
        user.get_backlog_mut(target)?.insert_workitem(moved);
    }
    ctx.data
        .item_updated(&ItemPath::backlog(s.user(), &source), s.when());
    ctx.data
        .item_updated(&ItemPath::workitem(s.user(), target, uid), s.when());
    s.emit(ctx.emitter, events::AFTER_WORKITEM_MOVE, params)?;
    Ok(None)
}

pub(super) fn reorder(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let index: usize = s.parse_param(1, "index")?;
    let (backlog, _) = locate(s.acting_user(ctx.data)?, uid)?;
    let backlog = backlog.to_string();

    let params = EventParams::new()
        .with("user", s.user())
        .with("backlog", backlog.as_str())
        .with("workitem", uid)
        .with("index", index);
    s.emit(ctx.emitter, events::BEFORE_WORKITEM_REORDER, params.clone())?;
    s.acting_user_mut(ctx.data)?
        .get_backlog_mut(&backlog)?
        .move_workitem(uid, index);
    ctx.data
        .item_updated(&ItemPath::backlog(s.user(), &backlog), s.when());
    s.emit(ctx.emitter, events::AFTER_WORKITEM_REORDER, params)?;
    Ok(None)
}

/// Moves `workitem` between tags after its name changed from carrying `old` to carrying `new`.
fn update_tags(
    s: &Strategy,
    ctx: &mut ExecContext<'_>,
    workitem: &str,
    old: &BTreeSet<String>,
    new: &BTreeSet<String>,
) -> Result<(), CoreError> {
    for name in old.difference(new) {
        let emptied = {
            let tags = s.acting_user_mut(ctx.data)?.tags_mut();
            match tags.tag_mut(name) {
                Some(tag) => {
                    tag.remove_workitem(workitem);
                    tag.is_empty()
                }
                None => continue,
            }
        };
        ctx.data.item_updated(&ItemPath::tag(s.user(), name), s.when());
        let params = EventParams::new()
            .with("user", s.user())
            .with("tag", name.as_str())
            .with("workitem", workitem);
        s.emit(ctx.emitter, events::TAG_CONTENT_CHANGED, params.clone())?;
        if emptied {
            s.acting_user_mut(ctx.data)?.tags_mut().remove(name);
            s.emit(ctx.emitter, events::TAG_DELETED, params)?;
        }
    }

    for name in new.difference(old) {
        let created = {
            let (tag, created) = s
                .acting_user_mut(ctx.data)?
                .tags_mut()
                .get_or_create(name, s.when());
            tag.add_workitem(workitem);
            created
        };
        ctx.data.item_updated(&ItemPath::tag(s.user(), name), s.when());
        let params = EventParams::new()
            .with("user", s.user())
            .with("tag", name.as_str())
            .with("workitem", workitem);
        if created {
            s.emit(ctx.emitter, events::TAG_CREATED, params.clone())?;
        }
        s.emit(ctx.emitter, events::TAG_CONTENT_CHANGED, params)?;
    }
    Ok(())
}
