use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Node, Stamp, Workitem};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backlog {
    uid: String,
    name: String,
    user: String,
    stamp: Stamp,
    work_started: Option<DateTime<Utc>>,
    workitems: IndexMap<String, Workitem>,
}

impl Backlog {
    pub fn new(uid: &str, name: &str, user: &str, when: DateTime<Utc>) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            user: user.to_string(),
            stamp: Stamp::new(when),
            work_started: None,
            workitems: IndexMap::new(),
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

    /// Identity of the owning user.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn work_started(&self) -> Option<DateTime<Utc>> {
        self.work_started
    }

    /// Records that work started in this backlog; the date never moves back.
    pub fn mark_work_started(&mut self, when: DateTime<Utc>) {
        if self.work_started.is_none_or(|current| when > current) {
            self.work_started = Some(when);
        }
    }

    pub fn workitems(&self) -> impl Iterator<Item = &Workitem> {
        self.workitems.values()
    }

    pub fn workitem(&self, uid: &str) -> Option<&Workitem> {
        self.workitems.get(uid)
    }

    pub fn workitem_mut(&mut self, uid: &str) -> Option<&mut Workitem> {
        self.workitems.get_mut(uid)
    }

    pub fn contains_workitem(&self, uid: &str) -> bool {
        self.workitems.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.workitems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workitems.is_empty()
    }

    /// Adopts `workitem`, pointing its parent reference at this backlog.
    pub fn insert_workitem(&mut self, mut workitem: Workitem) {
        workitem.set_backlog(&self.uid);
        self.workitems.insert(workitem.uid().to_string(), workitem);
    }

    pub fn remove_workitem(&mut self, uid: &str) -> Option<Workitem> {
        self.workitems.shift_remove(uid)
    }

    pub fn move_workitem(&mut self, uid: &str, index: usize) -> bool {
        match self.workitems.get_index_of(uid) {
            Some(from) => {
                let to = index.min(self.workitems.len() - 1);
                self.workitems.move_index(from, to);
                true
            }
            None => false,
        }
    }

    pub fn position_of(&self, uid: &str) -> Option<usize> {
        self.workitems.get_index_of(uid)
    }

    pub fn running_workitem(&self) -> Option<&Workitem> {
        self.workitems.values().find(|w| w.is_running())
    }

    pub(super) fn item_updated(&mut self, rest: &[Node], when: DateTime<Utc>) {
        self.stamp.touch(when);
        if let [Node::Workitem(uid), rest @ ..] = rest {
            if let Some(workitem) = self.workitems.get_mut(uid) {
                workitem.item_updated(rest, when);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn work_started_only_moves_forward() {
        let mut backlog = Backlog::new("b", "Backlog", "u@x.io", at(0));
        assert!(backlog.work_started().is_none());
        backlog.mark_work_started(at(100));
        backlog.mark_work_started(at(50));
        assert_eq!(backlog.work_started(), Some(at(100)));
        backlog.mark_work_started(at(150));
        assert_eq!(backlog.work_started(), Some(at(150)));
    }

    #[test]
    fn reorder_clamps_index_and_keeps_identity() {
        let mut backlog = Backlog::new("bl", "Backlog", "u@x.io", at(0));
        for uid in ["a", "b", "c"] {
            backlog.insert_workitem(Workitem::new(uid, uid, "elsewhere", at(0)));
        }
        assert!(backlog.move_workitem("a", 99));
        let order: Vec<&str> = backlog.workitems().map(Workitem::uid).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(backlog.workitem("a").unwrap().backlog(), "bl");
        assert!(!backlog.move_workitem("zzz", 0));
    }
}
