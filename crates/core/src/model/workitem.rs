use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Node, Pomodoro, PomodoroKind, Stamp};
use crate::error::CoreError;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("valid tag regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkitemState {
    New,
    Running,
    Finished,
    Canceled,
}

impl WorkitemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkitemState::New => "new",
            WorkitemState::Running => "running",
            WorkitemState::Finished => "finished",
            WorkitemState::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "new" => Ok(WorkitemState::New),
            "running" => Ok(WorkitemState::Running),
            "finished" => Ok(WorkitemState::Finished),
            "canceled" => Ok(WorkitemState::Canceled),
            other => Err(CoreError::InvalidState(format!("unknown workitem state {other:?}"))),
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, WorkitemState::Finished | WorkitemState::Canceled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workitem {
    uid: String,
    name: String,
    backlog: String,
    stamp: Stamp,
    state: WorkitemState,
    date_work_started: Option<DateTime<Utc>>,
    date_work_ended: Option<DateTime<Utc>>,
    pomodoros: IndexMap<String, Pomodoro>,
    /// Numbering for pomodoro uids; never reused after removals.
    pomodoro_counter: u32,
}

impl Workitem {
    pub fn new(uid: &str, name: &str, backlog: &str, when: DateTime<Utc>) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            backlog: backlog.to_string(),
            stamp: Stamp::new(when),
            state: WorkitemState::New,
            date_work_started: None,
            date_work_ended: None,
            pomodoros: IndexMap::new(),
            pomodoro_counter: 0,
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

    /// Uid of the owning backlog.
    pub fn backlog(&self) -> &str {
        &self.backlog
    }

    pub(super) fn set_backlog(&mut self, backlog: &str) {
        self.backlog = backlog.to_string();
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn state(&self) -> WorkitemState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkitemState::Running
    }

    pub fn is_sealed(&self) -> bool {
        self.state.is_sealed()
    }

    /// Whether some pomodoro can still be started.
    pub fn is_startable(&self) -> bool {
        self.pomodoros.values().any(Pomodoro::is_startable)
    }

    pub fn date_work_started(&self) -> Option<DateTime<Utc>> {
        self.date_work_started
    }

    pub fn date_work_ended(&self) -> Option<DateTime<Utc>> {
        self.date_work_ended
    }

    pub fn start(&mut self, when: DateTime<Utc>) {
        self.state = WorkitemState::Running;
        self.date_work_started = Some(when);
    }

    pub fn seal(&mut self, target: WorkitemState, when: DateTime<Utc>) -> Result<(), CoreError> {
        if !target.is_sealed() {
            return Err(CoreError::InvalidState(format!(
                "workitem cannot be sealed as {}",
                target.as_str()
            )));
        }
        self.state = target;
        self.date_work_ended = Some(when);
        Ok(())
    }

    /// Appends `n` new pomodoros. They are planned unless the workitem is already running.
    pub fn add_pomodoros(
        &mut self,
        n: usize,
        work_duration: f64,
        rest_duration: f64,
        kind: PomodoroKind,
        when: DateTime<Utc>,
    ) -> Vec<String> {
        let is_planned = !self.is_running();
        let mut added = Vec::with_capacity(n);
        for _ in 0..n {
            self.pomodoro_counter += 1;
            let number = self.pomodoro_counter;
            let uid = format!("{}-p{number}", self.uid);
            let pomodoro = Pomodoro::new(
                number,
                is_planned,
                work_duration,
                rest_duration,
                kind,
                &uid,
                &self.uid,
                when,
            );
            self.pomodoros.insert(uid.clone(), pomodoro);
            added.push(uid);
        }
        added
    }

    pub fn remove_pomodoro(&mut self, uid: &str) -> Option<Pomodoro> {
        self.pomodoros.shift_remove(uid)
    }

    pub fn pomodoros(&self) -> impl Iterator<Item = &Pomodoro> {
        self.pomodoros.values()
    }

    pub fn pomodoro(&self, uid: &str) -> Option<&Pomodoro> {
        self.pomodoros.get(uid)
    }

    pub fn pomodoro_mut(&mut self, uid: &str) -> Option<&mut Pomodoro> {
        self.pomodoros.get_mut(uid)
    }

    pub fn running_pomodoro(&self) -> Option<&Pomodoro> {
        self.pomodoros.values().find(|p| p.is_running())
    }

    pub fn running_pomodoro_mut(&mut self) -> Option<&mut Pomodoro> {
        self.pomodoros.values_mut().find(|p| p.is_running())
    }

    pub fn first_startable(&self) -> Option<&Pomodoro> {
        self.pomodoros.values().find(|p| p.is_startable())
    }

    /// Uids of the last `n` startable pomodoros, newest first. Shorter when there are not enough.
    pub fn last_startable(&self, n: usize) -> Vec<String> {
        self.pomodoros
            .values()
            .rev()
            .filter(|p| p.is_startable())
            .take(n)
            .map(|p| p.uid().to_string())
            .collect()
    }

    /// Lower-cased `#hashtags` found in the name.
    pub fn tags(&self) -> BTreeSet<String> {
        TAG_RE
            .captures_iter(&self.name)
            .map(|c| c[1].to_lowercase())
            .collect()
    }

    pub(super) fn item_updated(&mut self, rest: &[Node], when: DateTime<Utc>) {
        self.stamp.touch(when);
        if let [Node::Pomodoro(uid), rest @ ..] = rest {
            if let Some(pomodoro) = self.pomodoros.get_mut(uid) {
                pomodoro.item_updated(rest, when);
            }
        }
    }
}
