mod file;
mod schema;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;
pub(crate) use sqlite::format_datetime;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Backend;
use crate::error::{Error, Result};
use crate::syllabus::Syllabus;
use crate::types::*;

/// Store defines the persistence interface shared by every backend.
///
/// Ledger writes must be atomic per call: concurrent `upsert_if_higher`
/// calls for the same user can never leave a lower score behind a higher
/// one, and `read_all` never observes a half-applied write.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, username: &Username) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    // Session operations
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>>;
    fn delete_session(&self, id: &str) -> Result<bool>;

    // Progress operations
    fn get_progress(&self, username: &Username) -> Result<UserProgress>;
    fn set_topic_status(
        &self,
        username: &Username,
        topic_id: &str,
        status: TopicStatus,
    ) -> Result<ProgressRecord>;

    // Score ledger operations
    fn upsert_if_higher(&self, username: &Username, score: i64) -> Result<UpsertOutcome>;
    fn read_all(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>>;

    /// The user's ranked entry, if they have ever submitted a score.
    fn get_entry(&self, username: &Username) -> Result<Option<LeaderboardEntry>> {
        Ok(self
            .read_all(None)?
            .into_iter()
            .find(|entry| entry.username == *username))
    }

    /// Syllabus persisted alongside the data, for backends that keep one.
    fn stored_syllabus(&self) -> Result<Option<Syllabus>> {
        Ok(None)
    }

    fn close(&self) -> Result<()>;
}

/// Rejects scores the ledger must never store.
pub(crate) fn validate_score(score: i64) -> Result<()> {
    if score < 0 {
        return Err(Error::Validation(format!(
            "score must be a non-negative integer, got {score}"
        )));
    }
    Ok(())
}

/// Opens and initializes the backend selected in the configuration.
pub fn open_store(
    backend: Backend,
    data_dir: &Path,
    lock_timeout: Option<Duration>,
) -> Result<Arc<dyn Store>> {
    std::fs::create_dir_all(data_dir)?;

    let store: Arc<dyn Store> = match backend {
        Backend::File => Arc::new(FileStore::new(data_dir, lock_timeout)?),
        Backend::Sqlite => Arc::new(SqliteStore::with_busy_timeout(
            data_dir.join(SqliteStore::DB_FILE),
            lock_timeout,
        )?),
    };
    store.initialize()?;

    tracing::debug!("Opened {} store at {}", backend, data_dir.display());
    Ok(store)
}
