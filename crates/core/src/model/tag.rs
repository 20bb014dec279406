use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::{Node, Stamp};
use crate::ids::tags_uid;

/// A user's tags, keyed by tag name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tags {
    uid: String,
    user: String,
    stamp: Stamp,
    tags: IndexMap<String, Tag>,
}

impl Tags {
    pub fn new(user: &str, when: DateTime<Utc>) -> Self {
        Self {
            uid: tags_uid(user),
            user: user.to_string(),
            stamp: Stamp::new(when),
            tags: IndexMap::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }

    pub fn tag_mut(&mut self, name: &str) -> Option<&mut Tag> {
        self.tags.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns the tag and whether it had to be created.
    pub fn get_or_create(&mut self, name: &str, when: DateTime<Utc>) -> (&mut Tag, bool) {
        let created = !self.tags.contains_key(name);
        let uid = self.uid.clone();
        let tag = self
            .tags
            .entry(name.to_string())
            .or_insert_with(|| Tag::new(name, &uid, when));
        (tag, created)
    }

    pub fn remove(&mut self, name: &str) -> Option<Tag> {
        self.tags.shift_remove(name)
    }

    pub(super) fn item_updated(&mut self, rest: &[Node], when: DateTime<Utc>) {
        self.stamp.touch(when);
        if let [Node::Tag(name), ..] = rest {
            if let Some(tag) = self.tags.get_mut(name) {
                tag.stamp.touch(when);
            }
        }
    }
}

/// Non-owning index of the workitems whose names carry `#name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    uid: String,
    tags: String,
    stamp: Stamp,
    workitems: IndexSet<String>,
}

impl Tag {
    fn new(name: &str, tags: &str, when: DateTime<Utc>) -> Self {
        Self {
            uid: name.to_string(),
            tags: tags.to_string(),
            stamp: Stamp::new(when),
            workitems: IndexSet::new(),
        }
    }

    /// The tag name doubles as its uid.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn workitems(&self) -> impl Iterator<Item = &str> {
        self.workitems.iter().map(String::as_str)
    }

    pub fn contains(&self, workitem: &str) -> bool {
        self.workitems.contains(workitem)
    }

    pub fn is_empty(&self) -> bool {
        self.workitems.is_empty()
    }

    pub fn add_workitem(&mut self, workitem: &str) -> bool {
        self.workitems.insert(workitem.to_string())
    }

    pub fn remove_workitem(&mut self, workitem: &str) -> bool {
        self.workitems.shift_remove(workitem)
    }
}
