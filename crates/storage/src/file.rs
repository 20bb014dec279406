use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::traits::LogTransport;

pub const LOCAL_SOURCE: &str = "local";

/// A plain text file, one strategy per line.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    id: String,
    closed: bool,
}

impl FileLog {
    /// The file is created lazily on first append.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                fs::canonicalize(parent)?
            }
            None => std::env::current_dir()?,
        };
        let location = parent.join(path.file_name().unwrap_or_default());
        let id = blake3::hash(location.to_string_lossy().as_bytes()).to_hex()[..16].to_string();
        Ok(Self {
            path,
            id,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed {
            Err(StorageError::Closed(self.path.display().to_string()))
        } else {
            Ok(())
        }
    }
}

impl LogTransport for FileLog {
    fn name(&self) -> &str {
        LOCAL_SOURCE
    }

    /// Content-independent: a hash of the file location.
    fn id(&self) -> String {
        self.id.clone()
    }

    fn read_lines(&mut self) -> Result<Vec<String>, StorageError> {
        self.ensure_open()?;
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "log file does not exist yet");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn append(&mut self, line: &str) -> Result<(), StorageError> {
        self.ensure_open()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    fn overwrite(&mut self, lines: &[String]) -> Result<String, StorageError> {
        self.ensure_open()?;
        let mut backup = self.path.clone().into_os_string();
        backup.push(format!("-backup-{}", Utc::now().format("%Y%m%d-%H%M%S%.6f")));
        let backup = PathBuf::from(backup);
        if self.path.exists() {
            fs::copy(&self.path, &backup)?;
        } else {
            fs::write(&backup, "")?;
        }

        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, text)?;
        fs::rename(&staging, &self.path)?;
        info!(path = %self.path.display(), backup = %backup.display(), lines = lines.len(), "log overwritten");
        Ok(backup.display().to_string())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.closed = true;
        Ok(())
    }
}
