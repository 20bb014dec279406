use super::{ExecContext, Strategy, StrategyKind};
use crate::emitter::EventParams;
use crate::error::CoreError;
use crate::events;
use crate::model::{Backlog, ItemPath};

pub(super) fn create(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let (uid, name) = (s.param(0), s.param(1));
    if s.acting_user(ctx.data)?.contains_backlog(uid) {
        return Err(CoreError::AlreadyExists(format!("backlog {uid}")));
    }

    let params = EventParams::new()
        .with("user", s.user())
        .with("backlog", uid)
        .with("name", name);
    s.emit(ctx.emitter, events::BEFORE_BACKLOG_CREATE, params.clone())?;
    s.acting_user_mut(ctx.data)?
        .insert_backlog(Backlog::new(uid, name, s.user(), s.when()));
    ctx.data.item_updated(&ItemPath::backlog(s.user(), uid), s.when());
    s.emit(ctx.emitter, events::AFTER_BACKLOG_CREATE, params)?;
    Ok(Some(uid.to_string()))
}

pub(super) fn delete(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let workitems: Vec<String> = s
        .acting_user(ctx.data)?
        .backlog(uid)
        .ok_or_else(|| CoreError::NotFound(format!("backlog {uid}")))?
        .workitems()
        .map(|w| w.uid().to_string())
        .collect();

    let params = EventParams::new().with("user", s.user()).with("backlog", uid);
    s.emit(ctx.emitter, events::BEFORE_BACKLOG_DELETE, params.clone())?;
    for workitem in workitems {
        s.derive(ctx, StrategyKind::DeleteWorkitem, vec![workitem])?;
    }
    s.acting_user_mut(ctx.data)?.remove_backlog(uid);
    ctx.data.item_updated(&ItemPath::user(s.user()), s.when());
    s.emit(ctx.emitter, events::AFTER_BACKLOG_DELETE, params)?;
    Ok(None)
}

pub(super) fn rename(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let (uid, name) = (s.param(0), s.param(1));
    let old_name = s
        .acting_user(ctx.data)?
        .backlog(uid)
        .ok_or_else(|| CoreError::NotFound(format!("backlog {uid}")))?
        .name()
        .to_string();

    let params = EventParams::new()
        .with("user", s.user())
        .with("backlog", uid)
        .with("old_name", old_name)
        .with("new_name", name);
    s.emit(ctx.emitter, events::BEFORE_BACKLOG_RENAME, params.clone())?;
    s.acting_user_mut(ctx.data)?.get_backlog_mut(uid)?.set_name(name);
    ctx.data.item_updated(&ItemPath::backlog(s.user(), uid), s.when());
    s.emit(ctx.emitter, events::AFTER_BACKLOG_RENAME, params)?;
    Ok(None)
}

pub(super) fn reorder(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    let index: usize = s.parse_param(1, "index")?;
    if !s.acting_user(ctx.data)?.contains_backlog(uid) {
        return Err(CoreError::NotFound(format!("backlog {uid}")));
    }

    let params = EventParams::new()
        .with("user", s.user())
        .with("backlog", uid)
        .with("index", index);
    s.emit(ctx.emitter, events::BEFORE_BACKLOG_REORDER, params.clone())?;
    s.acting_user_mut(ctx.data)?.move_backlog(uid, index);
    ctx.data.item_updated(&ItemPath::user(s.user()), s.when());
    s.emit(ctx.emitter, events::AFTER_BACKLOG_REORDER, params)?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn create_rename_reorder() {
        let mut fx = Fixture::new();
        for (uid, name) in [("b1", "One"), ("b2", "Two"), ("b3", "Three")] {
            fx.run(StrategyKind::CreateBacklog, &[uid, name], 1).unwrap();
        }
        assert!(matches!(
            fx.run(StrategyKind::CreateBacklog, &["b1", "Again"], 2),
            Err(CoreError::AlreadyExists(_))
        ));

        fx.run(StrategyKind::RenameBacklog, &["b2", "Second"], 3).unwrap();
        fx.run(StrategyKind::ReorderBacklog, &["b3", "0"], 4).unwrap();
        let names: Vec<&str> = fx.alice().backlogs().map(|b| b.name()).collect();
        assert_eq!(names, vec!["Three", "One", "Second"]);
        assert_eq!(fx.alice().backlog("b2").unwrap().stamp().last_modified(), at(3));
    }

    #[test]
    fn reorder_requires_numeric_index() {
        let mut fx = Fixture::new();
        fx.run(StrategyKind::CreateBacklog, &["b1", "One"], 1).unwrap();
        assert!(matches!(
            fx.run(StrategyKind::ReorderBacklog, &["b1", "first"], 2),
            Err(CoreError::InvalidParams { .. })
        ));
    }

    #[test]
    fn missing_backlog_is_not_found() {
        let mut fx = Fixture::new();
        assert!(matches!(
            fx.run(StrategyKind::DeleteBacklog, &["nope"], 1),
            Err(CoreError::NotFound(_))
        ));
        assert!(fx.take_events().is_empty());
    }
}
