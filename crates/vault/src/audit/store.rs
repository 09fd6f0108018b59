//! Audit entry persistence.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use super::recorder::AuditEntry;

/// Errors produced by an [`AuditStore`].
#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("audit log I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("audit entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audit store unavailable: {0}")]
    Unavailable(String),
}

/// Durable sink for audit entries.
///
/// Implementations are blocking; async callers should go through
/// `tokio::task::spawn_blocking`.
#[cfg_attr(test, mockall::automock)]
pub trait AuditStore: Send + Sync {
    /// Append one entry. Must not return until the entry is durable.
    ///
    /// An error does not prove the entry is absent: a write may land before
    /// the sync that fails. Callers retry with the same entry id and readers
    /// keep the first entry per id.
    fn persist(&self, entry: &AuditEntry) -> Result<(), AuditStoreError>;

    /// Delete entries older than `cutoff`, returning how many were removed.
    fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, AuditStoreError>;
}

/// In-process store, for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditStore for MemoryAuditStore {
    fn persist(&self, entry: &AuditEntry) -> Result<(), AuditStoreError> {
        self.entries
            .lock()
            .map_err(|_| AuditStoreError::Unavailable("memory store lock poisoned".into()))?
            .push(entry.clone());
        Ok(())
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, AuditStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AuditStoreError::Unavailable("memory store lock poisoned".into()))?;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        Ok(before - entries.len())
    }
}

/// Append-only JSON-lines file, one entry per line.
///
/// Every append is followed by `fsync`. A line left unterminated by an
/// interrupted append is closed off before the next entry is written.
/// Pruning rewrites the file through a sibling temp file and an atomic
/// rename; lines that do not parse as an entry are kept.
#[derive(Debug)]
pub struct JsonlAuditStore {
    path: PathBuf,
    // Serializes appends against a concurrent prune rewrite.
    lock: Mutex<()>,
}

impl JsonlAuditStore {
    /// Open (creating if needed) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditStoreError::Io`] if the file cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every parseable entry in the log, oldest first. A retried append can
    /// leave the same entry twice; only the first copy is returned.
    pub fn read_all(&self) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let _guard = self.guard()?;
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries: Vec<AuditEntry> = Vec::new();
        let mut seen = HashSet::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) => {
                    if seen.insert(entry.id) {
                        entries.push(entry);
                    }
                }
                Err(e) => warn!(path = %self.path.display(), line = lineno + 1, error = %e, "skipping unreadable audit line"),
            }
        }
        Ok(entries)
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, AuditStoreError> {
        self.lock
            .lock()
            .map_err(|_| AuditStoreError::Unavailable("audit log lock poisoned".into()))
    }

    /// Whether `file` is non-empty and its last byte is not a newline.
    fn ends_mid_line(file: &mut File) -> io::Result<bool> {
        if file.metadata()?.len() == 0 {
            return Ok(false);
        }
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".prune");
        self.path.with_file_name(name)
    }
}

impl AuditStore for JsonlAuditStore {
    fn persist(&self, entry: &AuditEntry) -> Result<(), AuditStoreError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.guard()?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        if Self::ends_mid_line(&mut file)? {
            warn!(path = %self.path.display(), "audit log ends in a partial line; terminating it");
            line.insert(0, b'\n');
        }
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, AuditStoreError> {
        let _guard = self.guard()?;
        let source = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let temp = self.temp_path();
        let mut out = BufWriter::new(File::create(&temp)?);
        let mut removed = 0;
        for line in BufReader::new(source).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) if entry.timestamp < cutoff => removed += 1,
                _ => writeln!(out, "{line}")?,
            }
        }
        let file = out.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        drop(file);

        if removed == 0 {
            fs::remove_file(&temp)?;
            return Ok(0);
        }
        fs::rename(&temp, &self.path)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::recorder::AccessAction;
    use chrono::Duration;
    use uuid::Uuid;

    fn entry_at(timestamp: DateTime<Utc>, record_id: &str) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            actor_id: Some("user-1".into()),
            action: AccessAction::Read,
            model: "transaction".into(),
            record_id: record_id.into(),
            fields: vec!["merchant".into()],
            origin_ip: None,
            user_agent: None,
            timestamp,
        }
    }

    #[test]
    fn memory_store_prunes_by_timestamp() {
        let store = MemoryAuditStore::new();
        let now = Utc::now();
        store.persist(&entry_at(now - Duration::days(400), "old")).unwrap();
        store.persist(&entry_at(now, "new")).unwrap();

        assert_eq!(store.prune(now - Duration::days(365)).unwrap(), 1);
        let left = store.entries();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].record_id, "new");
    }

    #[test]
    fn jsonl_store_appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("log.jsonl");
        let store = JsonlAuditStore::open(&path).unwrap();

        let a = entry_at(Utc::now(), "1");
        let b = entry_at(Utc::now(), "2");
        store.persist(&a).unwrap();
        store.persist(&b).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert_eq!(store.read_all().unwrap(), vec![a, b]);
    }

    #[test]
    fn jsonl_prune_keeps_recent_and_unparseable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = JsonlAuditStore::open(&path).unwrap();
        let now = Utc::now();

        store.persist(&entry_at(now - Duration::days(30), "old")).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();
        store.persist(&entry_at(now, "new")).unwrap();

        assert_eq!(store.prune(now - Duration::days(7)).unwrap(), 1);
        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("not json"));
        let kept = store.read_all().unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].record_id, "new");
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn jsonl_append_after_torn_line_stays_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = JsonlAuditStore::open(&path).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(br#"{"id":"tor"#)
            .unwrap();

        let entry = entry_at(Utc::now(), "after-crash");
        store.persist(&entry).unwrap();

        assert_eq!(store.read_all().unwrap(), vec![entry.clone()]);
        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));

        // Pruning keeps the unreadable fragment and the recent entry.
        assert_eq!(store.prune(Utc::now() - Duration::days(1)).unwrap(), 0);
        assert_eq!(store.read_all().unwrap(), vec![entry]);
    }

    #[test]
    fn jsonl_repeated_entry_is_read_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlAuditStore::open(dir.path().join("audit.jsonl")).unwrap();
        let entry = entry_at(Utc::now(), "retried");
        store.persist(&entry).unwrap();
        store.persist(&entry).unwrap();

        assert_eq!(store.read_all().unwrap(), vec![entry]);
    }

    #[test]
    fn jsonl_prune_on_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = JsonlAuditStore::open(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(store.prune(Utc::now()).unwrap(), 0);
    }
}
