use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Node, Stamp};
use crate::ids::ROOT_CATEGORY_UID;

/// A node in a user's category tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    uid: String,
    name: String,
    parent: Option<String>,
    stamp: Stamp,
    children: IndexMap<String, Category>,
}

impl Category {
    pub fn root(when: DateTime<Utc>) -> Self {
        Self {
            uid: ROOT_CATEGORY_UID.to_string(),
            name: "Root category".to_string(),
            parent: None,
            stamp: Stamp::new(when),
            children: IndexMap::new(),
        }
    }

    pub fn new(uid: &str, name: &str, parent: &str, when: DateTime<Utc>) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            parent: Some(parent.to_string()),
            stamp: Stamp::new(when),
            children: IndexMap::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn children(&self) -> impl Iterator<Item = &Category> {
        self.children.values()
    }

    pub fn insert_child(&mut self, child: Category) {
        self.children.insert(child.uid.clone(), child);
    }

    /// Depth-first search of this subtree, including self.
    pub fn find(&self, uid: &str) -> Option<&Category> {
        if self.uid == uid {
            return Some(self);
        }
        self.children.values().find_map(|c| c.find(uid))
    }

    pub fn find_mut(&mut self, uid: &str) -> Option<&mut Category> {
        if self.uid == uid {
            return Some(self);
        }
        self.children.values_mut().find_map(|c| c.find_mut(uid))
    }

    /// Uids from this category down to `uid`, both ends included.
    pub fn path_to(&self, uid: &str) -> Option<Vec<String>> {
        if self.uid == uid {
            return Some(vec![self.uid.clone()]);
        }
        self.children.values().find_map(|c| {
            c.path_to(uid).map(|mut tail| {
                tail.insert(0, self.uid.clone());
                tail
            })
        })
    }

    /// Detaches the descendant `uid` together with its subtree.
    pub fn remove_descendant(&mut self, uid: &str) -> Option<Category> {
        if let Some(removed) = self.children.shift_remove(uid) {
            return Some(removed);
        }
        self.children.values_mut().find_map(|c| c.remove_descendant(uid))
    }

    /// Number of categories in this subtree, including self.
    pub fn count(&self) -> usize {
        1 + self.children.values().map(Category::count).sum::<usize>()
    }

    pub(super) fn item_updated(&mut self, rest: &[Node], when: DateTime<Utc>) {
        self.stamp.touch(when);
        if let [Node::Category(uid), rest @ ..] = rest {
            if let Some(child) = self.children.get_mut(uid) {
                child.item_updated(rest, when);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn nested_lookup_and_removal() {
        let when = Utc.timestamp_opt(0, 0).unwrap();
        let mut root = Category::root(when);
        root.insert_child(Category::new("work", "Work", ROOT_CATEGORY_UID, when));
        root.find_mut("work")
            .unwrap()
            .insert_child(Category::new("meetings", "Meetings", "work", when));

        assert_eq!(root.count(), 3);
        assert_eq!(
            root.path_to("meetings"),
            Some(vec!["root".to_string(), "work".to_string(), "meetings".to_string()])
        );
        assert_eq!(root.find("meetings").unwrap().parent(), Some("work"));

        let removed = root.remove_descendant("work").unwrap();
        assert_eq!(removed.count(), 2);
        assert!(root.find("meetings").is_none());
        assert!(root.remove_descendant("work").is_none());
    }
}
