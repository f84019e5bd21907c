//! Append-only JSON-lines event log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use pipeline::{BusEvent, EventLog, EventLogError};

/// File name of the bus log inside the output directory.
pub const EVENT_LOG_FILE: &str = "event-bus.log";

/// Appends one serialised [`BusEvent`] per line.
///
/// The file is opened per append so an external rotation or deletion is
/// picked up on the next event.
#[derive(Debug)]
pub struct FileEventLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The conventional log location inside `out_dir`.
    pub fn in_dir(out_dir: &Path) -> Self {
        Self::new(out_dir.join(EVENT_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, e: std::io::Error) -> EventLogError {
        EventLogError::Write {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }
}

impl EventLog for FileEventLog {
    fn append(&self, event: &BusEvent) -> Result<(), EventLogError> {
        let json =
            serde_json::to_string(event).map_err(|e| EventLogError::Serialization(e.to_string()))?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_error(e))?;
        writeln!(file, "{json}").map_err(|e| self.write_error(e))
    }
}
