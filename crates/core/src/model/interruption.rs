use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Stamp;

pub const VOID_REASON_PREFIX: &str = "Pomodoro voided";

/// Reason recorded when stopping the timer cancels a running pomodoro.
pub const AUTO_VOID_REASON: &str =
    "Voided automatically because you completed the workitem while the timer was running.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interruption {
    uid: String,
    pomodoro: String,
    stamp: Stamp,
    reason: Option<String>,
    /// Seconds.
    duration: Option<f64>,
    void: bool,
}

impl Interruption {
    pub fn new(
        uid: &str,
        pomodoro: &str,
        reason: Option<&str>,
        duration: Option<f64>,
        void: bool,
        when: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.to_string(),
            pomodoro: pomodoro.to_string(),
            stamp: Stamp::new(when),
            reason: reason.map(str::to_string),
            duration,
            void,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn pomodoro(&self) -> &str {
        &self.pomodoro
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn is_void(&self) -> bool {
        self.void
            || self
                .reason
                .as_deref()
                .is_some_and(|r| r.starts_with(VOID_REASON_PREFIX) || r == AUTO_VOID_REASON)
    }

    pub(super) fn touch(&mut self, when: DateTime<Utc>) {
        self.stamp.touch(when);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn void_is_detected_from_flag_or_reason() {
        let when = Utc.timestamp_opt(0, 0).unwrap();
        assert!(Interruption::new("i", "p", None, None, true, when).is_void());
        assert!(Interruption::new("i", "p", Some("Pomodoro voided: call"), None, false, when).is_void());
        assert!(Interruption::new("i", "p", Some(AUTO_VOID_REASON), None, false, when).is_void());
        assert!(!Interruption::new("i", "p", Some("Coffee"), Some(60.0), false, when).is_void());
    }
}
