use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::records::{Envelope, EnvelopeRef, FORMAT_VERSION, Record, VersionProbe};
use crate::error::{Error, Result};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Advisory lock held on a document's sidecar `.lock` file.
///
/// The lock lives on a separate file because writes replace the data file
/// by rename, which would orphan a lock taken on the data file itself.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release document lock: {e}");
        }
    }
}

/// A JSON document of records guarded by an advisory file lock.
///
/// Readers share the lock; a writer holds it exclusively across the whole
/// read-modify-write so concurrent writers can never lose each other's
/// updates. The document is rewritten in full (temp file, fsync, rename) on
/// every write that changes it.
pub struct LockedDocument<R> {
    path: PathBuf,
    lock_path: PathBuf,
    tmp_path: PathBuf,
    lock_timeout: Option<Duration>,
    _records: PhantomData<fn() -> R>,
}

impl<R: Record> LockedDocument<R> {
    pub fn new(dir: &Path, file_name: &str, lock_timeout: Option<Duration>) -> Self {
        Self {
            path: dir.join(file_name),
            lock_path: dir.join(format!("{file_name}.lock")),
            tmp_path: dir.join(format!("{file_name}.tmp")),
            lock_timeout,
            _records: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads a consistent snapshot under a shared lock.
    pub fn read(&self) -> Result<Vec<R>> {
        let _guard = self.lock(LockMode::Shared)?;
        self.load()
    }

    /// Runs `f` on the records while holding the exclusive lock.
    ///
    /// `f` returns its result and whether it changed the records; the
    /// document is only rewritten when it did. An error from `f` leaves the
    /// document untouched.
    pub fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<R>) -> Result<(T, bool)>,
    {
        let _guard = self.lock(LockMode::Exclusive)?;
        let mut records = self.load()?;
        let (output, changed) = f(&mut records)?;
        if changed {
            self.persist(&records)?;
        }
        Ok(output)
    }

    fn lock(&self, mode: LockMode) -> Result<LockGuard> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| self.unavailable(format!("cannot open lock file: {e}")))?;

        let Some(timeout) = self.lock_timeout else {
            let locked = match mode {
                LockMode::Shared => file.lock_shared(),
                LockMode::Exclusive => file.lock(),
            };
            locked.map_err(|e| self.unavailable(format!("cannot acquire lock: {e}")))?;
            return Ok(LockGuard { file });
        };

        let deadline = Instant::now() + timeout;
        loop {
            let attempt = match mode {
                LockMode::Shared => file.try_lock_shared(),
                LockMode::Exclusive => file.try_lock(),
            };

            match attempt {
                Ok(()) => return Ok(LockGuard { file }),
                Err(TryLockError::WouldBlock) => {}
                Err(TryLockError::Error(e)) => {
                    return Err(self.unavailable(format!("cannot acquire lock: {e}")));
                }
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    "Timed out after {:?} waiting for {:?} lock on {}",
                    timeout,
                    mode,
                    self.path.display()
                );
                return Err(self.unavailable(format!("lock wait exceeded {timeout:?}")));
            }

            std::thread::sleep(LOCK_POLL_INTERVAL);
        }
    }

    fn load(&self) -> Result<Vec<R>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.unavailable(format!("cannot read: {e}"))),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        self.decode(&content).inspect_err(|e| {
            tracing::error!("Refusing to use {}: {e}", self.path.display());
        })
    }

    fn decode(&self, content: &str) -> Result<Vec<R>> {
        let location = self.path.display().to_string();

        if content.trim_start().starts_with('[') {
            return Err(Error::corrupt(
                location,
                "legacy unversioned document; import it with `studytrack migrate`",
            ));
        }

        let probe: VersionProbe =
            serde_json::from_str(content).map_err(|e| Error::corrupt(&location, e))?;
        if probe.version != FORMAT_VERSION {
            return Err(Error::corrupt(
                location,
                format!("unsupported format version {}", probe.version),
            ));
        }

        let envelope: Envelope<R> =
            serde_json::from_str(content).map_err(|e| Error::corrupt(&location, e))?;
        R::validate(&envelope.entries).map_err(|reason| Error::corrupt(location, reason))?;

        Ok(envelope.entries)
    }

    fn persist(&self, records: &[R]) -> Result<()> {
        let envelope = EnvelopeRef {
            version: FORMAT_VERSION,
            entries: records,
        };
        let json = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| self.unavailable(format!("cannot encode: {e}")))?;

        let write = || -> std::io::Result<()> {
            let mut tmp = File::create(&self.tmp_path)?;
            tmp.write_all(&json)?;
            tmp.sync_all()?;
            fs::rename(&self.tmp_path, &self.path)
        };

        write().map_err(|e| self.unavailable(format!("cannot write: {e}")))
    }

    fn unavailable(&self, reason: String) -> Error {
        Error::StorageUnavailable(format!("{}: {reason}", self.path.display()))
    }
}
