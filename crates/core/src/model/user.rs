use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Backlog, Category, Node, Stamp, Tags, TimerData, Workitem};
use crate::error::CoreError;
use crate::ids::TENANT_UID;

/// A person (or the system account) and everything they own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    identity: String,
    name: String,
    is_system: bool,
    tenant: String,
    stamp: Stamp,
    backlogs: IndexMap<String, Backlog>,
    tags: Tags,
    root_category: Category,
    timer: TimerData,
}

impl User {
    pub fn new(identity: &str, name: &str, is_system: bool, when: DateTime<Utc>) -> Self {
        Self {
            identity: identity.to_string(),
            name: name.to_string(),
            is_system,
            tenant: TENANT_UID.to_string(),
            stamp: Stamp::new(when),
            backlogs: IndexMap::new(),
            tags: Tags::new(identity, when),
            root_category: Category::root(when),
            timer: TimerData::new(identity, when),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn is_system(&self) -> bool {
        self.is_system
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn backlogs(&self) -> impl Iterator<Item = &Backlog> {
        self.backlogs.values()
    }

    pub fn backlog(&self, uid: &str) -> Option<&Backlog> {
        self.backlogs.get(uid)
    }

    pub fn backlog_mut(&mut self, uid: &str) -> Option<&mut Backlog> {
        self.backlogs.get_mut(uid)
    }

    pub fn get_backlog_mut(&mut self, uid: &str) -> Result<&mut Backlog, CoreError> {
        self.backlogs
            .get_mut(uid)
            .ok_or_else(|| CoreError::NotFound(format!("backlog {uid}")))
    }

    pub fn contains_backlog(&self, uid: &str) -> bool {
        self.backlogs.contains_key(uid)
    }

    pub fn backlog_count(&self) -> usize {
        self.backlogs.len()
    }

    pub fn insert_backlog(&mut self, backlog: Backlog) {
        self.backlogs.insert(backlog.uid().to_string(), backlog);
    }

    pub fn remove_backlog(&mut self, uid: &str) -> Option<Backlog> {
        self.backlogs.shift_remove(uid)
    }

    /// Moves a backlog to `index` (clamped to the last position). False if it does not exist.
    pub fn move_backlog(&mut self, uid: &str, index: usize) -> bool {
        match self.backlogs.get_index_of(uid) {
            Some(from) => {
                let to = index.min(self.backlogs.len() - 1);
                self.backlogs.move_index(from, to);
                true
            }
            None => false,
        }
    }

    pub fn position_of_backlog(&self, uid: &str) -> Option<usize> {
        self.backlogs.get_index_of(uid)
    }

    pub fn workitems(&self) -> impl Iterator<Item = &Workitem> {
        self.backlogs.values().flat_map(Backlog::workitems)
    }

    pub fn find_workitem(&self, uid: &str) -> Option<&Workitem> {
        self.backlogs.values().find_map(|b| b.workitem(uid))
    }

    pub fn find_workitem_mut(&mut self, uid: &str) -> Option<&mut Workitem> {
        self.backlogs.values_mut().find_map(|b| b.workitem_mut(uid))
    }

    /// Uid of the backlog holding workitem `uid`.
    pub fn backlog_of(&self, uid: &str) -> Option<&str> {
        self.backlogs
            .values()
            .find(|b| b.contains_workitem(uid))
            .map(Backlog::uid)
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }

    pub fn root_category(&self) -> &Category {
        &self.root_category
    }

    pub fn root_category_mut(&mut self) -> &mut Category {
        &mut self.root_category
    }

    pub fn timer(&self) -> &TimerData {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut TimerData {
        &mut self.timer
    }

    pub(super) fn item_updated(&mut self, rest: &[Node], when: DateTime<Utc>) {
        self.stamp.touch(when);
        match rest {
            [Node::Backlog(uid), rest @ ..] => {
                if let Some(backlog) = self.backlogs.get_mut(uid) {
                    backlog.item_updated(rest, when);
                }
            }
            [Node::Timer, ..] => self.timer.touch(when),
            [Node::Tags, rest @ ..] => self.tags.item_updated(rest, when),
            [Node::Category(uid), rest @ ..] if uid == self.root_category.uid() => {
                self.root_category.item_updated(rest, when);
            }
            _ => {}
        }
    }
}
