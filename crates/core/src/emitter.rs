use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;

use crate::error::CoreError;
use crate::param_value::ParamValue;

pub type Callback = Arc<dyn Fn(&EventParams) -> Result<(), CoreError> + Send + Sync>;

/// Wraps a closure into a shareable callback handle.
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&EventParams) -> Result<(), CoreError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Named values delivered to subscribers. `event` and `carry` are filled in by the emitter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventParams {
    event: String,
    carry: Option<String>,
    values: BTreeMap<String, ParamValue>,
}

impl EventParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(ParamValue::as_text)
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn carry(&self) -> Option<&str> {
        self.carry.as_deref()
    }

    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }
}

struct Subscriber {
    callback: Callback,
    is_last: bool,
}

/// Publish/subscribe over a fixed set of event names.
///
/// Subscriptions resolve their pattern once, against the names known at construction time.
/// Delivery is synchronous: the first failing callback aborts the emit and its error is returned.
pub struct EventEmitter {
    connections: RwLock<IndexMap<&'static str, Vec<Subscriber>>>,
    muted: AtomicBool,
}

impl EventEmitter {
    pub fn new(allowed_events: &[&'static str]) -> Self {
        let connections = allowed_events.iter().map(|e| (*e, Vec::new())).collect();
        Self {
            connections: RwLock::new(connections),
            muted: AtomicBool::new(false),
        }
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.connections.read().keys().copied().collect()
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.connections.read().get(event).map_or(0, Vec::len)
    }

    /// Registers `callback` for every known event matching `pattern` (`*` matches any run of
    /// characters). Returns how many events matched.
    pub fn subscribe(&self, pattern: &str, callback: Callback, is_last: bool) -> Result<usize, CoreError> {
        let regex = compile_pattern(pattern)?;
        let mut connections = self.connections.write();
        let mut matched = 0;
        for (event, subscribers) in connections.iter_mut() {
            if !regex.is_match(event) {
                continue;
            }
            matched += 1;
            if subscribers.iter().any(|s| Arc::ptr_eq(&s.callback, &callback)) {
                continue;
            }
            subscribers.push(Subscriber {
                callback: Arc::clone(&callback),
                is_last,
            });
        }
        Ok(matched)
    }

    /// Drops every callback registered for events matching `pattern`.
    pub fn unsubscribe(&self, pattern: &str) -> Result<(), CoreError> {
        let regex = compile_pattern(pattern)?;
        let mut connections = self.connections.write();
        for (event, subscribers) in connections.iter_mut() {
            if regex.is_match(event) {
                subscribers.clear();
            }
        }
        Ok(())
    }

    pub fn emit(&self, event: &str, params: EventParams, carry: Option<&str>) -> Result<(), CoreError> {
        self.deliver(event, params, carry, false)
    }

    /// Like `emit`, but delivered even while muted.
    pub fn emit_forced(&self, event: &str, params: EventParams, carry: Option<&str>) -> Result<(), CoreError> {
        self.deliver(event, params, carry, true)
    }

    pub fn mute(&self) {
        self.muted.store(true, Ordering::SeqCst);
    }

    pub fn unmute(&self) {
        self.muted.store(false, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn deliver(&self, event: &str, mut params: EventParams, carry: Option<&str>, force: bool) -> Result<(), CoreError> {
        // Snapshot under the lock so callbacks may subscribe or cancel while running.
        let (first, last) = {
            let connections = self.connections.read();
            let subscribers = connections
                .get(event)
                .ok_or_else(|| CoreError::UnknownEvent(event.to_string()))?;
            if self.is_muted() && !force {
                return Ok(());
            }
            let first: Vec<Callback> = subscribers
                .iter()
                .filter(|s| !s.is_last)
                .map(|s| Arc::clone(&s.callback))
                .collect();
            let last: Vec<Callback> = subscribers
                .iter()
                .filter(|s| s.is_last)
                .map(|s| Arc::clone(&s.callback))
                .collect();
            (first, last)
        };

        params.event = event.to_string();
        if let Some(carry) = carry {
            params.carry = Some(carry.to_string());
        }
        for cb in first.iter().chain(last.iter()) {
            cb(&params)?;
        }
        Ok(())
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, CoreError> {
    let body = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{body}$")).map_err(|e| CoreError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
