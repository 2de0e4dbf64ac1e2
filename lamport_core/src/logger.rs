//! Append-only event record sinks.
//!
//! One sink per node, written only by that node's event loop.

use crate::error::LogError;
use crate::event::EventRecord;
use lamport_env::NodeId;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Destination for a node's event records.
pub trait EventLogger: Send + Sync + 'static {
    /// Appends one record as a single write.
    fn append(&self, record: &EventRecord) -> Result<(), LogError>;
}

impl<L: EventLogger + ?Sized> EventLogger for Arc<L> {
    fn append(&self, record: &EventRecord) -> Result<(), LogError> {
        (**self).append(record)
    }
}

/// Writes records to `<dir>/<NODE>.log`, one line each.
#[derive(Debug)]
pub struct FileEventLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileEventLogger {
    /// Creates (or truncates) the log file for `node` inside `dir`.
    pub fn create(dir: impl AsRef<Path>, node: NodeId) -> Result<Self, LogError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = Self::path_for(dir, node);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Log file path used for `node` in `dir`.
    pub fn path_for(dir: impl AsRef<Path>, node: NodeId) -> PathBuf {
        dir.as_ref().join(format!("{}.log", node))
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventLogger for FileEventLogger {
    fn append(&self, record: &EventRecord) -> Result<(), LogError> {
        let line = format!("{}\n", record);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Keeps records in memory; clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventLogger {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemoryEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the records in the log grammar, one per line.
    pub fn render(&self) -> String {
        self.records()
            .iter()
            .map(|r| format!("{}\n", r))
            .collect()
    }
}

impl EventLogger for MemoryEventLogger {
    fn append(&self, record: &EventRecord) -> Result<(), LogError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}
