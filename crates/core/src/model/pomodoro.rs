use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Interruption, Node, Stamp, seconds, seconds_between};
use crate::error::CoreError;

/// A normal pomodoro caught in work may still be finished this close to its planned end of rest.
pub const SEAL_GRACE_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PomodoroKind {
    /// Fixed work and rest durations.
    Normal,
    /// Open-ended work, finished explicitly.
    Tracker,
    /// Only counted, never timed.
    Counter,
}

impl PomodoroKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PomodoroKind::Normal => "normal",
            PomodoroKind::Tracker => "tracker",
            PomodoroKind::Counter => "counter",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "normal" => Ok(PomodoroKind::Normal),
            "tracker" => Ok(PomodoroKind::Tracker),
            "counter" => Ok(PomodoroKind::Counter),
            other => Err(CoreError::InvalidState(format!("unknown pomodoro type {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PomodoroState {
    New,
    Work,
    Rest,
    Finished,
    Canceled,
}

impl PomodoroState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PomodoroState::New => "new",
            PomodoroState::Work => "work",
            PomodoroState::Rest => "rest",
            PomodoroState::Finished => "finished",
            PomodoroState::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pomodoro {
    uid: String,
    name: String,
    workitem: String,
    stamp: Stamp,
    is_planned: bool,
    state: PomodoroState,
    kind: PomodoroKind,
    work_duration: f64,
    rest_duration: f64,
    date_work_started: Option<DateTime<Utc>>,
    date_rest_started: Option<DateTime<Utc>>,
    date_completed: Option<DateTime<Utc>>,
    interruptions: IndexMap<String, Interruption>,
}

impl Pomodoro {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: u32,
        is_planned: bool,
        work_duration: f64,
        rest_duration: f64,
        kind: PomodoroKind,
        uid: &str,
        workitem: &str,
        when: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.to_string(),
            name: format!("Pomodoro {number}"),
            workitem: workitem.to_string(),
            stamp: Stamp::new(when),
            is_planned,
            state: PomodoroState::New,
            kind,
            work_duration,
            rest_duration,
            date_work_started: None,
            date_rest_started: None,
            date_completed: None,
            interruptions: IndexMap::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workitem(&self) -> &str {
        &self.workitem
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn is_planned(&self) -> bool {
        self.is_planned
    }

    pub fn state(&self) -> PomodoroState {
        self.state
    }

    pub fn kind(&self) -> PomodoroKind {
        self.kind
    }

    pub fn is_startable(&self) -> bool {
        self.state == PomodoroState::New
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, PomodoroState::Work | PomodoroState::Rest)
    }

    pub fn is_working(&self) -> bool {
        self.state == PomodoroState::Work
    }

    pub fn is_resting(&self) -> bool {
        self.state == PomodoroState::Rest
    }

    pub fn is_finished(&self) -> bool {
        self.state == PomodoroState::Finished
    }

    pub fn is_canceled(&self) -> bool {
        self.state == PomodoroState::Canceled
    }

    pub fn date_work_started(&self) -> Option<DateTime<Utc>> {
        self.date_work_started
    }

    pub fn date_rest_started(&self) -> Option<DateTime<Utc>> {
        self.date_rest_started
    }

    pub fn date_completed(&self) -> Option<DateTime<Utc>> {
        self.date_completed
    }

    pub fn update_work_duration(&mut self, work_duration: f64) -> Result<(), CoreError> {
        if !self.is_startable() {
            return Err(self.wrong_state("update work duration"));
        }
        self.work_duration = work_duration;
        Ok(())
    }

    pub fn update_rest_duration(&mut self, rest_duration: f64) -> Result<(), CoreError> {
        if !(self.is_startable() || self.is_working()) {
            return Err(self.wrong_state("update rest duration"));
        }
        self.rest_duration = rest_duration;
        Ok(())
    }

    pub fn start_work(&mut self, when: DateTime<Utc>) -> Result<(), CoreError> {
        if self.kind == PomodoroKind::Counter {
            return Err(CoreError::InvalidState("counter pomodoros have no work".into()));
        }
        if !self.is_startable() {
            return Err(self.wrong_state("start work"));
        }
        self.state = PomodoroState::Work;
        self.date_work_started = Some(when);
        Ok(())
    }

    pub fn start_rest(&mut self, when: DateTime<Utc>) -> Result<(), CoreError> {
        if self.kind != PomodoroKind::Normal {
            return Err(CoreError::InvalidState(format!(
                "{} pomodoros have no rest",
                self.kind.as_str()
            )));
        }
        if !self.is_working() {
            return Err(self.wrong_state("start rest"));
        }
        self.state = PomodoroState::Rest;
        self.date_rest_started = Some(when);
        Ok(())
    }

    /// Finishes the pomodoro. Returns false when a normal pomodoro still in work is sealed too
    /// early to count as complete; it is then left as it was.
    pub fn seal(&mut self, when: DateTime<Utc>) -> Result<bool, CoreError> {
        match (self.kind, self.state) {
            (PomodoroKind::Normal, PomodoroState::Rest) | (PomodoroKind::Tracker, PomodoroState::Work) => {
                self.finish(when);
                Ok(true)
            }
            (PomodoroKind::Normal, PomodoroState::Work) => {
                // Rest was skipped while offline; accept completion once rest should be over.
                let end = self.planned_end_of_rest().map(|t| t - seconds(SEAL_GRACE_SECONDS));
                if end.is_some_and(|end| when > end) {
                    debug!(pomodoro = %self.uid, "sealing a pomodoro that skipped its rest");
                    self.finish(when);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            (PomodoroKind::Counter, _) => Err(CoreError::InvalidState("counter pomodoros cannot be sealed".into())),
            _ => Err(self.wrong_state("seal")),
        }
    }

    /// Cancels a running normal pomodoro and records why.
    pub fn void(&mut self, reason: &str, when: DateTime<Utc>) -> Result<(), CoreError> {
        if self.kind != PomodoroKind::Normal {
            return Err(CoreError::InvalidState(format!(
                "cannot void a {} pomodoro",
                self.kind.as_str()
            )));
        }
        if !self.is_running() {
            return Err(self.wrong_state("void"));
        }
        self.state = PomodoroState::Canceled;
        self.date_completed = Some(when);
        self.add_interruption(Some(reason), None, true, when);
        Ok(())
    }

    pub fn add_interruption(
        &mut self,
        reason: Option<&str>,
        duration: Option<f64>,
        void: bool,
        when: DateTime<Utc>,
    ) -> String {
        let uid = format!("{}-i{}", self.uid, self.interruptions.len() + 1);
        self.interruptions.insert(
            uid.clone(),
            Interruption::new(&uid, &self.uid, reason, duration, void, when),
        );
        uid
    }

    pub fn interruptions(&self) -> impl Iterator<Item = &Interruption> {
        self.interruptions.values()
    }

    /// Seconds spent in work so far (or in total, once finished).
    pub fn elapsed_duration(&self, when: DateTime<Utc>) -> f64 {
        let Some(started) = self.date_work_started else {
            return 0.0;
        };
        let end = match self.state {
            PomodoroState::Finished | PomodoroState::Canceled => self.date_completed.unwrap_or(when),
            _ => when,
        };
        seconds_between(started, end)
    }

    pub fn work_duration(&self, when: DateTime<Utc>) -> f64 {
        match self.kind {
            PomodoroKind::Normal => self.work_duration,
            PomodoroKind::Tracker => self.elapsed_duration(when),
            PomodoroKind::Counter => 0.0,
        }
    }

    pub fn planned_work_duration(&self) -> f64 {
        self.work_duration
    }

    pub fn rest_duration(&self) -> f64 {
        match self.kind {
            PomodoroKind::Normal => self.rest_duration,
            _ => 0.0,
        }
    }

    pub fn planned_end_of_work(&self) -> Option<DateTime<Utc>> {
        if self.kind != PomodoroKind::Normal {
            return None;
        }
        self.date_work_started
            .and_then(|s| s.checked_add_signed(seconds(self.work_duration)))
    }

    pub fn planned_end_of_rest(&self) -> Option<DateTime<Utc>> {
        self.planned_end_of_work()
            .and_then(|e| e.checked_add_signed(seconds(self.rest_duration)))
    }

    /// Seconds left in the current phase, negative once overdue. None for untimed kinds.
    pub fn remaining_time_in_current_state(&self, when: DateTime<Utc>) -> Option<f64> {
        if self.kind != PomodoroKind::Normal {
            return None;
        }
        let remaining = match self.state {
            PomodoroState::Work => self.planned_end_of_work().map(|e| seconds_between(when, e)),
            PomodoroState::Rest => self.planned_end_of_rest().map(|e| seconds_between(when, e)),
            _ => Some(0.0),
        };
        remaining.or(Some(0.0))
    }

    /// Seconds until work and rest are both over, negative once overdue. None for untimed kinds.
    pub fn total_remaining_time(&self, when: DateTime<Utc>) -> Option<f64> {
        let current = self.remaining_time_in_current_state(when)?;
        if self.is_working() {
            Some(current + self.rest_duration)
        } else {
            Some(current)
        }
    }

    fn finish(&mut self, when: DateTime<Utc>) {
        self.state = PomodoroState::Finished;
        self.date_completed = Some(when);
    }

    fn wrong_state(&self, action: &str) -> CoreError {
        CoreError::InvalidState(format!(
            "cannot {action} for {} pomodoro {} in state {}",
            self.kind.as_str(),
            self.uid,
            self.state.as_str()
        ))
    }

    pub(super) fn item_updated(&mut self, rest: &[Node], when: DateTime<Utc>) {
        self.stamp.touch(when);
        if let [Node::Interruption(uid), ..] = rest {
            if let Some(interruption) = self.interruptions.get_mut(uid) {
                interruption.touch(when);
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

    fn normal() -> Pomodoro {
        Pomodoro::new(1, true, 1500.0, 300.0, PomodoroKind::Normal, "w-p1", "w", at(0))
    }

    #[test]
    fn normal_lifecycle() {
        let mut p = normal();
        p.start_work(at(0)).unwrap();
        assert_eq!(p.planned_end_of_work(), Some(at(1500)));
        assert_eq!(p.planned_end_of_rest(), Some(at(1800)));
        assert_eq!(p.remaining_time_in_current_state(at(1000)), Some(500.0));
        assert_eq!(p.total_remaining_time(at(1000)), Some(800.0));

        p.start_rest(at(1500)).unwrap();
        assert_eq!(p.remaining_time_in_current_state(at(1700)), Some(100.0));
        assert_eq!(p.total_remaining_time(at(1900)), Some(-100.0));

        assert!(p.seal(at(1800)).unwrap());
        assert!(p.is_finished());
        assert_eq!(p.date_completed(), Some(at(1800)));
    }

    #[test]
    fn early_seal_from_work_is_ignored() {
        let mut p = normal();
        p.start_work(at(0)).unwrap();
        assert!(!p.seal(at(1000)).unwrap());
        assert!(p.is_working());
        // Within the grace window before the planned end of rest.
        assert!(p.seal(at(1796)).unwrap());
        assert!(p.is_finished());
    }

    #[test]
    fn tracker_and_counter_sealing() {
        let mut tracker = Pomodoro::new(1, true, 0.0, 0.0, PomodoroKind::Tracker, "t", "w", at(0));
        tracker.start_work(at(0)).unwrap();
        assert_eq!(tracker.remaining_time_in_current_state(at(5)), None);
        assert_eq!(tracker.work_duration(at(90)), 90.0);
        assert!(tracker.seal(at(120)).unwrap());
        assert_eq!(tracker.work_duration(at(500)), 120.0);

        let mut counter = Pomodoro::new(1, true, 0.0, 0.0, PomodoroKind::Counter, "c", "w", at(0));
        assert!(counter.start_work(at(0)).is_err());
        assert!(counter.seal(at(0)).is_err());
    }

    #[test]
    fn void_cancels_and_records_interruption() {
        let mut p = normal();
        assert!(p.void("Pomodoro voided", at(0)).is_err());
        p.start_work(at(0)).unwrap();
        p.void("Pomodoro voided: phone", at(100)).unwrap();
        assert!(p.is_canceled());
        let interruptions: Vec<&Interruption> = p.interruptions().collect();
        assert_eq!(interruptions.len(), 1);
        assert!(interruptions[0].is_void());
        assert_eq!(p.elapsed_duration(at(999)), 100.0);
    }

    #[test]
    fn durations_frozen_once_running() {
        let mut p = normal();
        p.update_work_duration(600.0).unwrap();
        p.start_work(at(0)).unwrap();
        assert!(p.update_work_duration(900.0).is_err());
        p.update_rest_duration(60.0).unwrap();
        p.start_rest(at(600)).unwrap();
        assert!(p.update_rest_duration(120.0).is_err());
        assert_eq!(p.planned_end_of_rest(), Some(at(660)));
    }
}
