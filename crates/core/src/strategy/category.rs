use super::{ExecContext, Strategy};
use crate::emitter::EventParams;
use crate::error::CoreError;
use crate::events;
use crate::ids::ROOT_CATEGORY_UID;
use crate::model::{Category, ItemPath};

fn chain_to(s: &Strategy, ctx: &ExecContext<'_>, uid: &str) -> Result<Vec<String>, CoreError> {
    s.acting_user(ctx.data)?
        .root_category()
        .path_to(uid)
        .ok_or_else(|| CoreError::NotFound(format!("category {uid}")))
}

pub(super) fn create(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let (uid, parent, name) = (s.param(0), s.param(1), s.param(2));
    if s.acting_user(ctx.data)?.root_category().find(uid).is_some() {
        return Err(CoreError::AlreadyExists(format!("category {uid}")));
    }
    let mut chain = chain_to(s, ctx, parent)?;

    let params = EventParams::new()
        .with("user", s.user())
        .with("category", uid)
        .with("parent", parent)
        .with("name", name);
    s.emit(ctx.emitter, events::BEFORE_CATEGORY_CREATE, params.clone())?;
    s.acting_user_mut(ctx.data)?
        .root_category_mut()
        .find_mut(parent)
        .ok_or_else(|| CoreError::NotFound(format!("category {parent}")))?
        .insert_child(Category::new(uid, name, parent, s.when()));
    chain.push(uid.to_string());
    ctx.data
        .item_updated(&ItemPath::category(s.user(), &chain), s.when());
    s.emit(ctx.emitter, events::AFTER_CATEGORY_CREATE, params)?;
    Ok(Some(uid.to_string()))
}

/// Removes the category with its whole subtree.
pub(super) fn delete(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let uid = s.param(0);
    if uid == ROOT_CATEGORY_UID {
        return Err(CoreError::InvalidState("the root category cannot be deleted".into()));
    }
    let mut chain = chain_to(s, ctx, uid)?;
    chain.pop();

    let params = EventParams::new().with("user", s.user()).with("category", uid);
    s.emit(ctx.emitter, events::BEFORE_CATEGORY_DELETE, params.clone())?;
    s.acting_user_mut(ctx.data)?
        .root_category_mut()
        .remove_descendant(uid);
    ctx.data
        .item_updated(&ItemPath::category(s.user(), &chain), s.when());
    s.emit(ctx.emitter, events::AFTER_CATEGORY_DELETE, params)?;
    Ok(None)
}

pub(super) fn rename(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let (uid, name) = (s.param(0), s.param(1));
    let chain = chain_to(s, ctx, uid)?;

    let params = EventParams::new()
        .with("user", s.user())
        .with("category", uid)
        .with("new_name", name);
    s.emit(ctx.emitter, events::BEFORE_CATEGORY_RENAME, params.clone())?;
    s.acting_user_mut(ctx.data)?
        .root_category_mut()
        .find_mut(uid)
        .ok_or_else(|| CoreError::NotFound(format!("category {uid}")))?
        .set_name(name);
    ctx.data
        .item_updated(&ItemPath::category(s.user(), &chain), s.when());
    s.emit(ctx.emitter, events::AFTER_CATEGORY_RENAME, params)?;
    Ok(None)
}
