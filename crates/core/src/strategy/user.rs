use super::{ExecContext, Strategy, StrategyKind};
use crate::codec;
use crate::emitter::EventParams;
use crate::error::CoreError;
use crate::events;
use crate::ids::ADMIN_USER;
use crate::model::{ItemPath, User};

pub(super) fn create(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let (identity, name) = (s.param(0), s.param(1));
    s.require_system_user(ctx.data)?;
    if !codec::is_identity(identity) {
        return Err(s.invalid(format!("{identity:?} is not an email address")));
    }
    if ctx.data.contains_user(identity) {
        return Err(CoreError::AlreadyExists(format!("user {identity}")));
    }

    let params = EventParams::new().with("user", identity).with("name", name);
    s.emit(ctx.emitter, events::BEFORE_USER_CREATE, params.clone())?;
    ctx.data.insert_user(User::new(identity, name, false, s.when()));
    ctx.data.item_updated(&ItemPath::user(identity), s.when());
    s.emit(ctx.emitter, events::AFTER_USER_CREATE, params)?;
    Ok(Some(identity.to_string()))
}

pub(super) fn delete(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let identity = s.param(0);
    s.require_system_user(ctx.data)?;
    if identity == ADMIN_USER {
        return Err(CoreError::Unauthorized("the system user cannot be deleted".into()));
    }
    let backlogs: Vec<String> = ctx
        .data
        .get_user(identity)?
        .backlogs()
        .map(|b| b.uid().to_string())
        .collect();

    let params = EventParams::new().with("user", identity);
    s.emit(ctx.emitter, events::BEFORE_USER_DELETE, params.clone())?;
    for backlog in backlogs {
        s.derive_with(ctx, StrategyKind::DeleteBacklog, vec![backlog], None, Some(identity))?;
    }
    ctx.data.remove_user(identity);
    ctx.data.item_updated(&ItemPath::tenant(), s.when());
    s.emit(ctx.emitter, events::AFTER_USER_DELETE, params)?;
    Ok(None)
}

pub(super) fn rename(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let (identity, name) = (s.param(0), s.param(1));
    s.require_system_user(ctx.data)?;
    if identity == ADMIN_USER {
        return Err(CoreError::Unauthorized("the system user cannot be renamed".into()));
    }
    let old_name = ctx.data.get_user(identity)?.name().to_string();
    if old_name == name {
        return Ok(None);
    }

    let params = EventParams::new()
        .with("user", identity)
        .with("old_name", old_name)
        .with("new_name", name);
    s.emit(ctx.emitter, events::BEFORE_USER_RENAME, params.clone())?;
    ctx.data.get_user_mut(identity)?.set_name(name);
    ctx.data.item_updated(&ItemPath::user(identity), s.when());
    s.emit(ctx.emitter, events::AFTER_USER_RENAME, params)?;
    Ok(None)
}
