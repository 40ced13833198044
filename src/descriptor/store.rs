//! Descriptor and lock storage.
//!
//! # Responsibilities
//! - Publish the descriptor atomically (temp write + rename)
//! - Create the lock artifact with exclusive create
//! - Break stale locks without clobbering a fresh one
//!
//! # Design Decisions
//! - Storage only: liveness and staleness policy live in `election`
//! - A corrupt descriptor surfaces as `StoreError::Corrupt`; callers decide
//! - Removal helpers only delete records that match what the caller owns

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;

use crate::descriptor::types::{HubDescriptor, LockRecord};

pub const DESCRIPTOR_FILE: &str = "hub.json";
pub const LOCK_FILE: &str = "hub.lock";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot create descriptor directory {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },

    #[error("descriptor store I/O on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("descriptor is corrupt: {0}")]
    Corrupt(String),

    #[error("cannot encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of an exclusive lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired,
    Held,
}

/// Observed state of a held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockState {
    /// Parsed content, `None` when unreadable.
    pub record: Option<LockRecord>,
    /// Raw bytes, used to verify a renamed-aside lock is the one judged.
    pub raw: Vec<u8>,
    pub age: Duration,
}

/// Filesystem-like storage for the hub descriptor and its lock.
pub trait DescriptorStore: Send + Sync + 'static {
    fn read(&self) -> Result<Option<HubDescriptor>, StoreError>;

    fn publish(&self, descriptor: &HubDescriptor) -> Result<(), StoreError>;

    /// Delete the descriptor if it still equals `descriptor`.
    fn remove_if_matches(&self, descriptor: &HubDescriptor) -> Result<bool, StoreError>;

    fn try_lock(&self, record: &LockRecord) -> Result<LockAttempt, StoreError>;

    fn read_lock(&self) -> Result<Option<LockState>, StoreError>;

    /// Remove the lock if its content is still `judged`.
    ///
    /// Returns `false` when the lock vanished or was replaced meanwhile; a
    /// replaced lock is put back untouched.
    fn break_stale_lock(&self, judged: &LockState) -> Result<bool, StoreError>;

    fn release_lock(&self, record: &LockRecord) -> Result<bool, StoreError>;

    fn lock_owned_by(&self, record: &LockRecord) -> Result<bool, StoreError> {
        Ok(self
            .read_lock()?
            .and_then(|state| state.record)
            .is_some_and(|held| &held == record))
    }
}

/// Store backed by `<dir>/hub.json` and `<dir>/hub.lock`.
#[derive(Debug, Clone)]
pub struct FsDescriptorStore {
    dir: PathBuf,
}

impl FsDescriptorStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Directory {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.dir.join(DESCRIPTOR_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn scratch_path(&self, stem: &str) -> PathBuf {
        self.dir
            .join(format!("{stem}.{}.{:016x}", std::process::id(), fastrand::u64(..)))
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path)(e)),
    }
}

fn remove_optional(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(path)(e)),
    }
}

impl DescriptorStore for FsDescriptorStore {
    fn read(&self) -> Result<Option<HubDescriptor>, StoreError> {
        let Some(bytes) = read_optional(&self.descriptor_path())? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn publish(&self, descriptor: &HubDescriptor) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(descriptor)?;
        let temp = self.scratch_path("hub.json.tmp");

        let written = fs::write(&temp, &bytes).and_then(|()| fs::rename(&temp, self.descriptor_path()));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(io_err(&self.descriptor_path())(e));
        }

        tracing::debug!(path = %self.descriptor_path().display(), port = descriptor.port, "Descriptor published");
        Ok(())
    }

    fn remove_if_matches(&self, descriptor: &HubDescriptor) -> Result<bool, StoreError> {
        match self.read() {
            Ok(Some(current)) if &current == descriptor => remove_optional(&self.descriptor_path()),
            Ok(_) | Err(StoreError::Corrupt(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn try_lock(&self, record: &LockRecord) -> Result<LockAttempt, StoreError> {
        let path = self.lock_path();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(LockAttempt::Held),
            Err(e) => return Err(io_err(&path)(e)),
        };

        let bytes = serde_json::to_vec(record)?;
        if let Err(e) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(io_err(&path)(e));
        }
        Ok(LockAttempt::Acquired)
    }

    fn read_lock(&self) -> Result<Option<LockState>, StoreError> {
        let path = self.lock_path();
        let Some(raw) = read_optional(&path)? else {
            return Ok(None);
        };
        let age = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => SystemTime::now().duration_since(modified).unwrap_or_default(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path)(e)),
        };

        Ok(Some(LockState {
            record: serde_json::from_slice(&raw).ok(),
            raw,
            age,
        }))
    }

    fn break_stale_lock(&self, judged: &LockState) -> Result<bool, StoreError> {
        let lock = self.lock_path();
        let aside = self.scratch_path("hub.lock.stale");

        match fs::rename(&lock, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(io_err(&lock)(e)),
        }

        let moved = fs::read(&aside).map_err(io_err(&aside))?;
        if moved == judged.raw {
            remove_optional(&aside)?;
            return Ok(true);
        }

        // Someone replaced the stale lock before our rename; put theirs back.
        match fs::hard_link(&aside, &lock) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!(path = %lock.display(), "Lock re-created while restoring a fresh lock");
            }
            Err(e) => {
                let _ = fs::remove_file(&aside);
                return Err(io_err(&lock)(e));
            }
        }
        remove_optional(&aside)?;
        Ok(false)
    }

    fn release_lock(&self, record: &LockRecord) -> Result<bool, StoreError> {
        if self.lock_owned_by(record)? {
            remove_optional(&self.lock_path())
        } else {
            Ok(false)
        }
    }
}

/// In-process store with the same semantics as the filesystem one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    descriptor: Option<Vec<u8>>,
    lock: Option<(Vec<u8>, Instant)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store raw descriptor bytes, valid or not.
    pub fn put_raw_descriptor(&self, bytes: impl Into<Vec<u8>>) {
        self.inner().descriptor = Some(bytes.into());
    }

    /// Install a lock as if created `age` ago.
    pub fn put_lock(&self, raw: impl Into<Vec<u8>>, age: Duration) {
        let created = Instant::now().checked_sub(age).unwrap_or_else(Instant::now);
        self.inner().lock = Some((raw.into(), created));
    }
}

impl DescriptorStore for MemoryStore {
    fn read(&self) -> Result<Option<HubDescriptor>, StoreError> {
        match &self.inner().descriptor {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
        }
    }

    fn publish(&self, descriptor: &HubDescriptor) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(descriptor)?;
        self.inner().descriptor = Some(bytes);
        Ok(())
    }

    fn remove_if_matches(&self, descriptor: &HubDescriptor) -> Result<bool, StoreError> {
        let mut inner = self.inner();
        let matches = inner
            .descriptor
            .as_deref()
            .and_then(|bytes| serde_json::from_slice::<HubDescriptor>(bytes).ok())
            .is_some_and(|current| &current == descriptor);
        if matches {
            inner.descriptor = None;
        }
        Ok(matches)
    }

    fn try_lock(&self, record: &LockRecord) -> Result<LockAttempt, StoreError> {
        let bytes = serde_json::to_vec(record)?;
        let mut inner = self.inner();
        if inner.lock.is_some() {
            return Ok(LockAttempt::Held);
        }
        inner.lock = Some((bytes, Instant::now()));
        Ok(LockAttempt::Acquired)
    }

    fn read_lock(&self) -> Result<Option<LockState>, StoreError> {
        Ok(self.inner().lock.as_ref().map(|(raw, created)| LockState {
            record: serde_json::from_slice(raw).ok(),
            raw: raw.clone(),
            age: created.elapsed(),
        }))
    }

    fn break_stale_lock(&self, judged: &LockState) -> Result<bool, StoreError> {
        let mut inner = self.inner();
        match &inner.lock {
            Some((raw, _)) if *raw == judged.raw => {
                inner.lock = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn release_lock(&self, record: &LockRecord) -> Result<bool, StoreError> {
        let mut inner = self.inner();
        let owned = inner
            .lock
            .as_ref()
            .and_then(|(raw, _)| serde_json::from_slice::<LockRecord>(raw).ok())
            .is_some_and(|held| &held == record);
        if owned {
            inner.lock = None;
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store() -> (tempfile::TempDir, FsDescriptorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDescriptorStore::open(dir.path().join("loghub")).unwrap();
        (dir, store)
    }

    #[test]
    fn publish_read_remove_roundtrip() {
        let (_dir, store) = store();
        assert!(store.read().unwrap().is_none());

        let d = HubDescriptor::new("127.0.0.1", 17361, 100, None);
        store.publish(&d).unwrap();
        assert_eq!(store.read().unwrap(), Some(d.clone()));

        let other = HubDescriptor::new("127.0.0.1", 17362, 100, None);
        assert!(!store.remove_if_matches(&other).unwrap());
        assert!(store.remove_if_matches(&d).unwrap());
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn corrupt_descriptor_is_reported() {
        let (_dir, store) = store();
        fs::write(store.descriptor_path(), b"{not json").unwrap();
        assert!(matches!(store.read(), Err(StoreError::Corrupt(_))));
        // Never deleted through the ownership check.
        let d = HubDescriptor::new("127.0.0.1", 17361, 1, None);
        assert!(!store.remove_if_matches(&d).unwrap());
    }

    #[test]
    fn lock_is_exclusive_and_owned() {
        let (_dir, store) = store();
        let mine = LockRecord::new(1, Utc::now());
        let theirs = LockRecord::new(2, Utc::now());

        assert_eq!(store.try_lock(&mine).unwrap(), LockAttempt::Acquired);
        assert_eq!(store.try_lock(&theirs).unwrap(), LockAttempt::Held);
        assert!(store.lock_owned_by(&mine).unwrap());
        assert!(!store.release_lock(&theirs).unwrap());
        assert!(store.release_lock(&mine).unwrap());
        assert_eq!(store.try_lock(&theirs).unwrap(), LockAttempt::Acquired);
    }

    #[test]
    fn breaking_a_replaced_lock_restores_it() {
        let (_dir, store) = store();
        let stale = LockRecord::new(1, Utc::now());
        store.try_lock(&stale).unwrap();
        let judged = store.read_lock().unwrap().unwrap();
        assert_eq!(judged.record.as_ref(), Some(&stale));

        // A competitor broke it and took a fresh lock in the meantime.
        assert!(store.break_stale_lock(&judged).unwrap());
        let fresh = LockRecord::new(2, Utc::now());
        store.try_lock(&fresh).unwrap();

        assert!(!store.break_stale_lock(&judged).unwrap());
        assert!(store.lock_owned_by(&fresh).unwrap());
        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("hub.lock.stale"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn breaking_a_vanished_lock_is_a_noop() {
        let (_dir, store) = store();
        let judged = LockState {
            record: None,
            raw: b"garbage".to_vec(),
            age: Duration::from_secs(60),
        };
        assert!(!store.break_stale_lock(&judged).unwrap());
    }

    #[test]
    fn memory_store_matches_fs_semantics() {
        let store = MemoryStore::new();
        let mine = LockRecord::new(1, Utc::now());
        assert_eq!(store.try_lock(&mine).unwrap(), LockAttempt::Acquired);
        assert_eq!(store.try_lock(&LockRecord::new(2, Utc::now())).unwrap(), LockAttempt::Held);

        store.put_raw_descriptor("oops");
        assert!(matches!(store.read(), Err(StoreError::Corrupt(_))));

        let judged = store.read_lock().unwrap().unwrap();
        assert!(store.break_stale_lock(&judged).unwrap());
        assert!(store.read_lock().unwrap().is_none());
    }
}
