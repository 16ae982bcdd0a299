//! JSON file store
//!
//! The whole record table lives in one JSON document on a shared
//! filesystem. Nothing is cached between calls: every mutation takes an
//! exclusive `flock` on a sidecar lock file, re-reads the document, applies
//! one keyed change and writes it back through a temporary file and a
//! rename. Writers on different nodes serialize on the lock, and readers
//! never see a partial write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use slurmline_core::domain::provenance::ProvenanceEntry;
use slurmline_core::domain::record::{Query, Record};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Records, Store};
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    /// Opens the store, starting empty if the file does not exist yet
    ///
    /// An existing document is parsed once so that corruption is reported
    /// here rather than on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");
        let store = Self { path, lock_path };

        store.snapshot().await?;
        debug!("Opened store at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn insert(&self, record: Record) -> Result<(), StoreError> {
        self.mutate(move |records| {
            records.insert(record);
            Ok(())
        })
        .await
    }

    /// Current on-disk contents
    async fn snapshot(&self) -> Result<Records, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load(&path))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    /// Applies one change to the latest document under the file lock
    ///
    /// If `change` fails nothing is written.
    async fn mutate<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Records) -> Result<(), StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let _lock = FileLock::acquire(&lock_path)?;

            let mut records = load(&path)?;
            change(&mut records)?;
            persist(&path, &records)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

fn load(path: &Path) -> Result<Records, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Records::default()),
        Err(e) => Err(e.into()),
    }
}

/// Writes the document; callers hold the lock, so one temporary name suffices
fn persist(path: &Path, records: &Records) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Exclusive advisory lock, released on drop
struct FileLock {
    file: File,
}

impl FileLock {
    /// Blocks until the lock is held
    fn acquire(lock_path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)?;

        loop {
            let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if ret == 0 {
                return Ok(Self { file });
            }

            let err = std::io::Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn find(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        Ok(self.snapshot().await?.find(query))
    }

    async fn update_metadata(&self, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let id = id.to_string();
        self.mutate(move |records| records.update_metadata(&id, fields))
            .await
    }

    async fn append_log_entry(&self, id: &str, entry: ProvenanceEntry) -> Result<(), StoreError> {
        let id = id.to_string();
        self.mutate(move |records| records.append_log_entry(&id, entry))
            .await
    }

    async fn find_collections_needing_reassembly(
        &self,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.snapshot().await?.needing_reassembly(start, stop))
    }
}
