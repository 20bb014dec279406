use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{ItemPath, Node, Stamp, User};
use crate::error::CoreError;
use crate::ids::{ADMIN_USER, TENANT_UID};

/// Root of the object graph. Always holds the system user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    uid: String,
    name: String,
    stamp: Stamp,
    users: IndexMap<String, User>,
}

impl Tenant {
    pub fn new(when: DateTime<Utc>) -> Self {
        let mut users = IndexMap::new();
        users.insert(ADMIN_USER.to_string(), User::new(ADMIN_USER, "System", true, when));
        Self {
            uid: TENANT_UID.to_string(),
            name: "Pomolog".to_string(),
            stamp: Stamp::new(when),
            users,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn user(&self, identity: &str) -> Option<&User> {
        self.users.get(identity)
    }

    pub fn user_mut(&mut self, identity: &str) -> Option<&mut User> {
        self.users.get_mut(identity)
    }

    pub fn get_user(&self, identity: &str) -> Result<&User, CoreError> {
        self.user(identity)
            .ok_or_else(|| CoreError::NotFound(format!("user {identity}")))
    }

    pub fn get_user_mut(&mut self, identity: &str) -> Result<&mut User, CoreError> {
        self.user_mut(identity)
            .ok_or_else(|| CoreError::NotFound(format!("user {identity}")))
    }

    pub fn contains_user(&self, identity: &str) -> bool {
        self.users.contains_key(identity)
    }

    pub fn insert_user(&mut self, user: User) {
        self.users.insert(user.identity().to_string(), user);
    }

    pub fn remove_user(&mut self, identity: &str) -> Option<User> {
        self.users.shift_remove(identity)
    }

    /// Moves `last_modified` of the tenant and every node along `path` forward to `when`.
    pub fn item_updated(&mut self, path: &ItemPath, when: DateTime<Utc>) {
        self.stamp.touch(when);
        if let [Node::User(identity), rest @ ..] = path.nodes() {
            if let Some(user) = self.users.get_mut(identity) {
                user.item_updated(rest, when);
            }
        }
    }
}
