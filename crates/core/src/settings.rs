use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::emitter::{EventEmitter, EventParams};
use crate::error::CoreError;
use crate::events;

pub const SOURCE_TYPE: &str = "Source.type";
pub const SOURCE_USERNAME: &str = "Source.username";
pub const SOURCE_FULLNAME: &str = "Source.fullname";
pub const SOURCE_IGNORE_ERRORS: &str = "Source.ignore_errors";
pub const SOURCE_IGNORE_INVALID_SEQUENCE: &str = "Source.ignore_invalid_sequence";
pub const SOURCE_AUTO_SEAL_TOLERANCE: &str = "Source.auto_seal_tolerance";
pub const ENCRYPTION_ENABLED: &str = "Source.encryption_enabled";
pub const ENCRYPTION_KEY: &str = "Source.encryption_key!";
pub const ENCRYPTION_KEY_CACHE: &str = "Source.encryption_key_cache!";
pub const FILE_SOURCE_FILENAME: &str = "FileEventSource.filename";
pub const SQLITE_SOURCE_FILENAME: &str = "SqliteEventSource.filename";
pub const DEFAULT_WORK_DURATION: &str = "Pomodoro.default_work_duration";
pub const DEFAULT_REST_DURATION: &str = "Pomodoro.default_rest_duration";

pub const LOCAL_USER: &str = "user@local.host";

const DEFAULTS: &[(&str, &str)] = &[
    (SOURCE_TYPE, "local"),
    (SOURCE_USERNAME, LOCAL_USER),
    (SOURCE_FULLNAME, "Local User"),
    (SOURCE_IGNORE_ERRORS, "False"),
    (SOURCE_IGNORE_INVALID_SEQUENCE, "False"),
    (SOURCE_AUTO_SEAL_TOLERANCE, "0"),
    (ENCRYPTION_ENABLED, "False"),
    (ENCRYPTION_KEY, ""),
    (ENCRYPTION_KEY_CACHE, ""),
    (FILE_SOURCE_FILENAME, "pomolog.txt"),
    (SQLITE_SOURCE_FILENAME, "pomolog.db"),
    (DEFAULT_WORK_DURATION, "1500"),
    (DEFAULT_REST_DURATION, "300"),
];

pub fn default_value(key: &str) -> Option<&'static str> {
    DEFAULTS.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Key/value configuration with change notification.
///
/// `set` emits `BeforeSettingsChanged` and `AfterSettingsChanged` on `emitter()`, both carrying the
/// changed keys under `keys`.
pub trait Settings: Send + Sync {
    /// Stored value, falling back to the built-in default. Fails only when the backing store
    /// cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;

    fn set(&self, values: &[(&str, &str)]) -> Result<(), CoreError>;

    fn emitter(&self) -> &EventEmitter;

    fn username(&self) -> Result<String, CoreError> {
        Ok(self
            .get(SOURCE_USERNAME)?
            .unwrap_or_else(|| LOCAL_USER.to_string()))
    }

    fn fullname(&self) -> Result<String, CoreError> {
        Ok(self.get(SOURCE_FULLNAME)?.unwrap_or_default())
    }

    fn is_enabled(&self, key: &str) -> Result<bool, CoreError> {
        Ok(self
            .get(key)?
            .is_some_and(|v| v.eq_ignore_ascii_case("true")))
    }

    fn get_f64(&self, key: &str) -> Result<f64, CoreError> {
        let raw = self
            .get(key)?
            .ok_or_else(|| CoreError::Settings(format!("{key} is not set")))?;
        raw.trim()
            .parse()
            .map_err(|_| CoreError::Settings(format!("{key} is not a number: {raw}")))
    }
}

pub fn changed_keys(values: &[(&str, &str)]) -> EventParams {
    let keys: Vec<String> = values.iter().map(|(k, _)| k.to_string()).collect();
    EventParams::new().with("keys", keys)
}

/// Whether a settings-changed event touched `key`.
pub fn touches(params: &EventParams, key: &str) -> bool {
    params
        .get("keys")
        .and_then(|v| v.as_list())
        .is_some_and(|keys| keys.iter().any(|k| k.as_text() == Some(key)))
}

/// In-process settings.
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, String>>,
    emitter: EventEmitter,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySettings {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
            emitter: EventEmitter::new(events::SETTINGS_EVENTS),
        }
    }

    pub fn with_values(values: &[(&str, &str)]) -> Self {
        let settings = Self::new();
        {
            let mut map = settings.values.write();
            for (k, v) in values {
                map.insert(k.to_string(), v.to_string());
            }
        }
        settings
    }
}

impl Settings for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self
            .values
            .read()
            .get(key)
            .cloned()
            .or_else(|| default_value(key).map(str::to_string)))
    }

    fn set(&self, values: &[(&str, &str)]) -> Result<(), CoreError> {
        self.emitter
            .emit(events::BEFORE_SETTINGS_CHANGED, changed_keys(values), None)?;
        {
            let mut map = self.values.write();
            for (k, v) in values {
                map.insert(k.to_string(), v.to_string());
            }
        }
        self.emitter
            .emit(events::AFTER_SETTINGS_CHANGED, changed_keys(values), None)
    }

    fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::callback;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn defaults_apply_until_overridden() {
        let settings = MemorySettings::new();
        assert_eq!(settings.get(DEFAULT_WORK_DURATION).unwrap().as_deref(), Some("1500"));
        assert_eq!(settings.username().unwrap(), LOCAL_USER);
        settings.set(&[(DEFAULT_WORK_DURATION, "25")]).unwrap();
        assert_eq!(settings.get_f64(DEFAULT_WORK_DURATION).unwrap(), 25.0);
        assert!(settings.get("Unknown.key").unwrap().is_none());
    }

    #[test]
    fn set_notifies_before_and_after() {
        let settings = MemorySettings::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        settings
            .emitter()
            .subscribe(
                "*SettingsChanged",
                callback(move |p| {
                    sink.lock().push((p.event().to_string(), touches(p, ENCRYPTION_KEY)));
                    Ok(())
                }),
                false,
            )
            .unwrap();
        settings.set(&[(ENCRYPTION_KEY, "secret")]).unwrap();
        assert_eq!(
            *seen.lock(),
            vec![
                ("BeforeSettingsChanged".to_string(), true),
                ("AfterSettingsChanged".to_string(), true),
            ]
        );
    }

    #[test]
    fn flags_parse_case_insensitively() {
        let settings = MemorySettings::with_values(&[(ENCRYPTION_ENABLED, "True")]);
        assert!(settings.is_enabled(ENCRYPTION_ENABLED).unwrap());
        assert!(!settings.is_enabled(SOURCE_IGNORE_ERRORS).unwrap());
    }

    #[test]
    fn non_numeric_value_is_reported() {
        let settings = MemorySettings::with_values(&[(DEFAULT_REST_DURATION, "soon")]);
        assert!(matches!(settings.get_f64(DEFAULT_REST_DURATION), Err(CoreError::Settings(_))));
    }
}
