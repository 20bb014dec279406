//! The object graph rebuilt by replaying strategies.
//!
//! Containers own their children by value in insertion-ordered maps and children keep the uid of
//! their parent. Every node carries a [`Stamp`]; a mutation is followed by
//! [`Tenant::item_updated`] with the [`ItemPath`] of the touched node, which moves the
//! `last_modified` of the node and of all its ancestors forward (never backward).

mod backlog;
mod category;
mod interruption;
mod pomodoro;
mod tag;
mod tenant;
mod timer;
mod user;
mod workitem;

pub use backlog::Backlog;
pub use category::Category;
pub use interruption::{AUTO_VOID_REASON, Interruption, VOID_REASON_PREFIX};
pub use pomodoro::{Pomodoro, PomodoroKind, PomodoroState, SEAL_GRACE_SECONDS};
pub use tag::{Tag, Tags};
pub use tenant::Tenant;
pub use timer::{PomodoroRef, TimerData, TimerState};
pub use user::User;
pub use workitem::{Workitem, WorkitemState};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Creation and last-modification instants of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    created: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl Stamp {
    pub fn new(when: DateTime<Utc>) -> Self {
        Self {
            created: when,
            last_modified: when,
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Keeps the later of the current value and `when`.
    pub fn touch(&mut self, when: DateTime<Utc>) {
        if when > self.last_modified {
            self.last_modified = when;
        }
    }
}

/// One step from a container down to a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    User(String),
    Backlog(String),
    Workitem(String),
    Pomodoro(String),
    Interruption(String),
    Timer,
    Tags,
    Tag(String),
    Category(String),
}

/// Location of a node below the tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPath(Vec<Node>);

impl ItemPath {
    pub fn tenant() -> Self {
        Self(Vec::new())
    }

    pub fn user(identity: &str) -> Self {
        Self(vec![Node::User(identity.to_string())])
    }

    pub fn backlog(identity: &str, backlog: &str) -> Self {
        Self::user(identity).child(Node::Backlog(backlog.to_string()))
    }

    pub fn workitem(identity: &str, backlog: &str, workitem: &str) -> Self {
        Self::backlog(identity, backlog).child(Node::Workitem(workitem.to_string()))
    }

    pub fn pomodoro(identity: &str, backlog: &str, workitem: &str, pomodoro: &str) -> Self {
        Self::workitem(identity, backlog, workitem).child(Node::Pomodoro(pomodoro.to_string()))
    }

    pub fn timer(identity: &str) -> Self {
        Self::user(identity).child(Node::Timer)
    }

    pub fn tag(identity: &str, tag: &str) -> Self {
        Self::user(identity).child(Node::Tags).child(Node::Tag(tag.to_string()))
    }

    /// `chain` lists category uids from the root category down to the target.
    pub fn category(identity: &str, chain: &[String]) -> Self {
        let mut path = Self::user(identity);
        for uid in chain {
            path = path.child(Node::Category(uid.clone()));
        }
        path
    }

    pub fn child(mut self, node: Node) -> Self {
        self.0.push(node);
        self
    }

    pub fn nodes(&self) -> &[Node] {
        &self.0
    }
}

/// Longest work, rest or interruption duration a strategy may carry: a leap year.
pub const MAX_DURATION_SECONDS: f64 = 366.0 * 24.0 * 3600.0;

pub fn is_valid_duration(secs: f64) -> bool {
    (0.0..=MAX_DURATION_SECONDS).contains(&secs)
}

/// Millisecond-precision duration, clamped to [`MAX_DURATION_SECONDS`] either way.
pub(crate) fn seconds(secs: f64) -> Duration {
    let secs = if secs.is_nan() {
        0.0
    } else {
        secs.clamp(-MAX_DURATION_SECONDS, MAX_DURATION_SECONDS)
    };
    Duration::milliseconds((secs * 1000.0).round() as i64)
}

pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
