use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Stamp, seconds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerState {
    Idle,
    Work,
    Rest,
}

/// Which pomodoro a timer is running, by workitem and pomodoro uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroRef {
    pub workitem: String,
    pub pomodoro: String,
}

/// Per-user timer state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerData {
    user: String,
    stamp: Stamp,
    state: TimerState,
    running: Option<PomodoroRef>,
    planned_duration: f64,
    remaining_duration: f64,
    last_state_change: Option<DateTime<Utc>>,
    next_state_change: Option<DateTime<Utc>>,
}

impl TimerData {
    pub fn new(user: &str, when: DateTime<Utc>) -> Self {
        Self {
            user: user.to_string(),
            stamp: Stamp::new(when),
            state: TimerState::Idle,
            running: None,
            planned_duration: 0.0,
            remaining_duration: 0.0,
            last_state_change: None,
            next_state_change: None,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn running(&self) -> Option<&PomodoroRef> {
        self.running.as_ref()
    }

    pub fn is_running_workitem(&self, workitem: &str) -> bool {
        self.running.as_ref().is_some_and(|r| r.workitem == workitem)
    }

    pub fn is_idling(&self) -> bool {
        self.state == TimerState::Idle
    }

    pub fn is_working(&self) -> bool {
        self.state == TimerState::Work
    }

    pub fn is_resting(&self) -> bool {
        self.state == TimerState::Rest
    }

    pub fn is_ticking(&self) -> bool {
        self.state != TimerState::Idle
    }

    pub fn planned_duration(&self) -> f64 {
        self.planned_duration
    }

    pub fn remaining_duration(&self) -> f64 {
        self.remaining_duration
    }

    pub fn last_state_change(&self) -> Option<DateTime<Utc>> {
        self.last_state_change
    }

    /// When the timer should ring next. None while idle or for unlimited phases.
    pub fn next_state_change(&self) -> Option<DateTime<Utc>> {
        self.next_state_change
    }

    pub fn idle(&mut self, when: DateTime<Utc>) {
        self.state = TimerState::Idle;
        self.running = None;
        self.planned_duration = 0.0;
        self.remaining_duration = 0.0;
        self.last_state_change = Some(when);
        self.next_state_change = None;
    }

    /// A zero duration (trackers) schedules no ring.
    pub fn work(&mut self, pomodoro: PomodoroRef, work_duration: f64, when: DateTime<Utc>) {
        self.state = TimerState::Work;
        self.running = Some(pomodoro);
        self.enter_phase(work_duration, when);
    }

    /// A zero duration (long breaks) schedules no ring.
    pub fn rest(&mut self, rest_duration: f64, when: DateTime<Utc>) {
        self.state = TimerState::Rest;
        self.enter_phase(rest_duration, when);
    }

    fn enter_phase(&mut self, duration: f64, when: DateTime<Utc>) {
        self.planned_duration = duration;
        self.remaining_duration = duration;
        self.last_state_change = Some(when);
        self.next_state_change = if duration > 0.0 {
            when.checked_add_signed(seconds(duration))
        } else {
            None
        };
    }

    pub(super) fn touch(&mut self, when: DateTime<Utc>) {
        self.stamp.touch(when);
    }
}
