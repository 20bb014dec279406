use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StorageError;
use crate::traits::LogTransport;

pub const EPHEMERAL_SOURCE: &str = "ephemeral";

#[derive(Debug, Default)]
struct Shared {
    lines: Vec<String>,
    backups: Vec<Vec<String>>,
    offline: bool,
}

/// A log that lives only as long as the process.
///
/// Clones share the same lines, so a test can keep one side to inspect or inject lines while an
/// event source owns the other. [`MemoryLog::set_offline`] makes appends fail, which is how a lost
/// connection looks to the source.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    shared: Arc<Mutex<Shared>>,
    checks_sequence: bool,
    closed: bool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::with_lines(Vec::new())
    }

    pub fn with_lines(lines: Vec<String>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                lines,
                ..Shared::default()
            })),
            checks_sequence: true,
            closed: false,
        }
    }

    /// Relaxes sequence checks, as for a log merged from several writers.
    pub fn unchecked(mut self) -> Self {
        self.checks_sequence = false;
        self
    }

    pub fn lines(&self) -> Vec<String> {
        self.shared.lock().lines.clone()
    }

    /// Appends behind the back of whoever reads this log, like another device would.
    pub fn push_external(&self, line: &str) {
        self.shared.lock().lines.push(line.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.shared.lock().offline = offline;
    }

    pub fn backups(&self) -> Vec<Vec<String>> {
        self.shared.lock().backups.clone()
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed {
            Err(StorageError::Closed(EPHEMERAL_SOURCE.into()))
        } else {
            Ok(())
        }
    }
}

impl LogTransport for MemoryLog {
    fn name(&self) -> &str {
        EPHEMERAL_SOURCE
    }

    fn id(&self) -> String {
        format!("{EPHEMERAL_SOURCE}:{:p}", Arc::as_ptr(&self.shared))
    }

    fn read_lines(&mut self) -> Result<Vec<String>, StorageError> {
        self.ensure_open()?;
        Ok(self.lines())
    }

    fn append(&mut self, line: &str) -> Result<(), StorageError> {
        self.ensure_open()?;
        let mut shared = self.shared.lock();
        if shared.offline {
            return Err(StorageError::Unavailable("in-memory log is offline".into()));
        }
        shared.lines.push(line.to_string());
        Ok(())
    }

    fn overwrite(&mut self, lines: &[String]) -> Result<String, StorageError> {
        self.ensure_open()?;
        let mut shared = self.shared.lock();
        let previous = std::mem::replace(&mut shared.lines, lines.to_vec());
        shared.backups.push(previous);
        Ok(format!("memory backup #{}", shared.backups.len()))
    }

    fn checks_sequence(&self) -> bool {
        self.checks_sequence
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_lines() {
        let mut log = MemoryLog::new();
        let observer = log.clone();
        log.append("1, a").unwrap();
        observer.push_external("2, b");
        assert_eq!(log.read_lines().unwrap(), vec!["1, a", "2, b"]);
        assert_eq!(log.id(), observer.id());
    }

    #[test]
    fn offline_appends_fail_and_keep_nothing() {
        let mut log = MemoryLog::new();
        log.set_offline(true);
        assert!(matches!(log.append("1, a"), Err(StorageError::Unavailable(_))));
        log.set_offline(false);
        log.append("1, a").unwrap();
        assert_eq!(log.lines().len(), 1);
    }

    #[test]
    fn overwrite_keeps_a_backup() {
        let mut log = MemoryLog::with_lines(vec!["old".into()]);
        let backup = log.overwrite(&["new".into()]).unwrap();
        assert!(backup.contains('1'));
        assert_eq!(log.lines(), vec!["new"]);
        assert_eq!(log.backups(), vec![vec!["old".to_string()]]);
    }

    #[test]
    fn closed_log_refuses_work() {
        let mut log = MemoryLog::new();
        log.close().unwrap();
        log.close().unwrap();
        assert!(matches!(log.read_lines(), Err(StorageError::Closed(_))));
    }
}
