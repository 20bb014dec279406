use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use pomolog_core::events;
use pomolog_core::settings::{Settings, changed_keys, default_value};
use pomolog_core::{CoreError, EventEmitter};

use crate::error::StorageError;
use crate::snapshot::Snapshot;
use crate::traits::LogTransport;

pub const SQLITE_SOURCE: &str = "sqlite";

fn open_connection(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    crate::schema::init_schema(&conn)?;
    Ok(conn)
}

fn memory_connection() -> Result<Connection, StorageError> {
    let conn = Connection::open_in_memory()?;
    crate::schema::init_schema(&conn)?;
    Ok(conn)
}

/// The log as rows of a SQLite table, ordered by rowid.
pub struct SqliteLog {
    conn: Option<Connection>,
    id: String,
}

impl SqliteLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = open_connection(path)?;
        let id = blake3::hash(path.to_string_lossy().as_bytes()).to_hex()[..16].to_string();
        Ok(Self {
            conn: Some(conn),
            id,
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: Some(memory_connection()?),
            id: format!("{SQLITE_SOURCE}:memory"),
        })
    }

    fn conn(&mut self) -> Result<&mut Connection, StorageError> {
        self.conn
            .as_mut()
            .ok_or_else(|| StorageError::Closed(SQLITE_SOURCE.into()))
    }

    /// Lines saved by an earlier `overwrite`, oldest position first.
    pub fn backup(&mut self, backup_id: &str) -> Result<Vec<String>, StorageError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT line FROM log_backup WHERE backup_id = ?1 ORDER BY position")?;
        let lines = stmt
            .query_map([backup_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(lines)
    }
}

impl LogTransport for SqliteLog {
    fn name(&self) -> &str {
        SQLITE_SOURCE
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn read_lines(&mut self) -> Result<Vec<String>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT line FROM log ORDER BY rowid")?;
        let lines = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        debug!(count = lines.len(), "read sqlite log");
        Ok(lines)
    }

    fn append(&mut self, line: &str) -> Result<(), StorageError> {
        self.conn()?
            .execute("INSERT INTO log (line) VALUES (?1)", [line])?;
        Ok(())
    }

    fn overwrite(&mut self, lines: &[String]) -> Result<String, StorageError> {
        let backup_id = format!("backup-{}", Utc::now().format("%Y%m%d-%H%M%S%.6f"));
        let conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO log_backup (backup_id, position, line)
             SELECT ?1, ROW_NUMBER() OVER (ORDER BY rowid), line FROM log",
            [&backup_id],
        )?;
        tx.execute("DELETE FROM log", [])?;
        {
            let mut insert = tx.prepare("INSERT INTO log (line) VALUES (?1)")?;
            for line in lines {
                insert.execute([line])?;
            }
        }
        tx.commit()?;
        info!(backup = %backup_id, lines = lines.len(), "sqlite log overwritten");
        Ok(backup_id)
    }

    fn close(&mut self) -> Result<(), StorageError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        }
        Ok(())
    }
}

/// Settings persisted in the `settings` table, with the built-in defaults underneath.
pub struct SqliteSettings {
    conn: Mutex<Connection>,
    emitter: EventEmitter,
}

impl SqliteSettings {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Ok(Self::from_connection(open_connection(path.as_ref())?))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_connection(memory_connection()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            emitter: EventEmitter::new(events::SETTINGS_EVENTS),
        }
    }

    /// Only the explicitly stored values.
    pub fn stored(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(pairs)
    }

    fn write(&self, values: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (key, value) in values {
            tx.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl Settings for SqliteSettings {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let stored = self
            .conn
            .lock()
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|e| {
                warn!(key, error = %e, "settings lookup failed");
                CoreError::Settings(format!("cannot read {key}: {e}"))
            })?;
        Ok(stored.or_else(|| default_value(key).map(str::to_string)))
    }

    fn set(&self, values: &[(&str, &str)]) -> Result<(), CoreError> {
        self.emitter
            .emit(events::BEFORE_SETTINGS_CHANGED, changed_keys(values), None)?;
        self.write(values)
            .map_err(|e| CoreError::Settings(e.to_string()))?;
        self.emitter
            .emit(events::AFTER_SETTINGS_CHANGED, changed_keys(values), None)
    }

    fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}

/// Model snapshots keyed by the log they were taken from.
pub struct SqliteSnapshots {
    conn: Connection,
}

impl SqliteSnapshots {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Ok(Self {
            conn: open_connection(path.as_ref())?,
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: memory_connection()?,
        })
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let model = snapshot.to_msgpack()?;
        self.conn.execute(
            "INSERT INTO snapshots (source_id, last_seq, taken_at, model) VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.source_id,
                snapshot.last_seq as i64,
                snapshot.taken_at.to_rfc3339(),
                model
            ],
        )?;
        debug!(source = %snapshot.source_id, last_seq = snapshot.last_seq, bytes = model.len(), "snapshot saved");
        Ok(())
    }

    /// The snapshot with the highest `last_seq` for `source_id`.
    pub fn latest(&self, source_id: &str) -> Result<Option<Snapshot>, StorageError> {
        let model: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT model FROM snapshots WHERE source_id = ?1
                 ORDER BY last_seq DESC, snapshot_id DESC LIMIT 1",
                [source_id],
                |row| row.get(0),
            )
            .optional()?;
        model.map(|bytes| Snapshot::from_msgpack(&bytes)).transpose()
    }

    /// Drops all but the newest `keep` snapshots of `source_id`. Returns how many went.
    pub fn prune(&self, source_id: &str, keep: usize) -> Result<usize, StorageError> {
        let removed = self.conn.execute(
            "DELETE FROM snapshots WHERE source_id = ?1 AND snapshot_id NOT IN (
                SELECT snapshot_id FROM snapshots WHERE source_id = ?1
                ORDER BY last_seq DESC, snapshot_id DESC LIMIT ?2
            )",
            params![source_id, keep as i64],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pomolog_core::model::Tenant;
    use pomolog_core::settings::{DEFAULT_WORK_DURATION, ENCRYPTION_ENABLED, SOURCE_USERNAME};

    use super::*;

    #[test]
    fn lines_keep_their_order() {
        let mut log = SqliteLog::open_in_memory().unwrap();
        for line in ["1, a", "2, b", "3, c"] {
            log.append(line).unwrap();
        }
        assert_eq!(log.read_lines().unwrap(), vec!["1, a", "2, b", "3, c"]);
    }

    #[test]
    fn overwrite_copies_old_rows_to_backup() {
        let mut log = SqliteLog::open_in_memory().unwrap();
        log.append("1, old").unwrap();
        log.append("2, older").unwrap();
        let backup = log.overwrite(&["1, new".to_string()]).unwrap();
        assert_eq!(log.read_lines().unwrap(), vec!["1, new"]);
        assert_eq!(log.backup(&backup).unwrap(), vec!["1, old", "2, older"]);
    }

    #[test]
    fn file_backed_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        {
            let mut log = SqliteLog::open(&path).unwrap();
            log.append("1, persisted").unwrap();
            log.close().unwrap();
            log.close().unwrap();
            assert!(matches!(log.read_lines(), Err(StorageError::Closed(_))));
        }
        let mut log = SqliteLog::open(&path).unwrap();
        assert_eq!(log.read_lines().unwrap(), vec!["1, persisted"]);
    }

    #[test]
    fn settings_persist_and_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");
        let settings = SqliteSettings::open(&path).unwrap();
        assert_eq!(settings.get(DEFAULT_WORK_DURATION).unwrap().as_deref(), Some("1500"));
        settings.set(&[(SOURCE_USERNAME, "bob@example.com")]).unwrap();
        drop(settings);

        let settings = SqliteSettings::open(&path).unwrap();
        assert_eq!(settings.username().unwrap(), "bob@example.com");
        assert_eq!(settings.stored().unwrap().len(), 1);
    }

    #[test]
    fn unreadable_settings_are_an_error_not_a_default() {
        let settings = SqliteSettings::open_in_memory().unwrap();
        settings.conn.lock().execute_batch("DROP TABLE settings").unwrap();
        assert!(matches!(settings.get(SOURCE_USERNAME), Err(CoreError::Settings(_))));
        assert!(settings.username().is_err());
        assert!(settings.is_enabled(ENCRYPTION_ENABLED).is_err());
    }

    #[test]
    fn latest_snapshot_wins_and_prune_keeps_newest() {
        let snapshots = SqliteSnapshots::open_in_memory().unwrap();
        let when = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for seq in [3, 9, 5] {
            snapshots
                .save(&Snapshot {
                    source_id: "log".into(),
                    last_seq: seq,
                    taken_at: when,
                    data: Tenant::new(when),
                })
                .unwrap();
        }
        assert_eq!(snapshots.latest("log").unwrap().unwrap().last_seq, 9);
        assert!(snapshots.latest("other").unwrap().is_none());
        assert_eq!(snapshots.prune("log", 1).unwrap(), 2);
        assert_eq!(snapshots.latest("log").unwrap().unwrap().last_seq, 9);
    }
}
