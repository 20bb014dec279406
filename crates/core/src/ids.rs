use std::collections::HashSet;

use uuid::Uuid;

/// Identity of the built-in system user. Only it may administer other users.
pub const ADMIN_USER: &str = "admin@local.host";

/// Uid of the tenant root.
pub const TENANT_UID: &str = "0";

/// Uid of every user's root category.
pub const ROOT_CATEGORY_UID: &str = "root";

pub fn generate_uid() -> String {
    Uuid::now_v7().to_string()
}

/// Returns `prefix` if it is free, otherwise the first free `"{prefix} {n}"` for n = 1, 2, ...
pub fn generate_unique_name<'a, I>(prefix: &str, names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<&str> = names.into_iter().collect();
    let mut candidate = prefix.to_string();
    let mut n = 1u32;
    while taken.contains(candidate.as_str()) {
        candidate = format!("{prefix} {n}");
        n += 1;
    }
    candidate
}

pub fn tags_uid(identity: &str) -> String {
    format!("tags-{identity}")
}
