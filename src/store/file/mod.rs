mod document;
mod records;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;

use self::document::LockedDocument;
use self::records::{LeaderboardRecord, ProgressEntry, SessionRecord, UserRecord};
use super::{Store, validate_score};
use crate::error::{Error, Result};
use crate::scoring::{rank_entries, rank_top};
use crate::types::*;

/// Store backed by lock-guarded JSON documents in a data directory.
///
/// Each document has its own lock, so a progress write never blocks a
/// leaderboard read.
pub struct FileStore {
    users: LockedDocument<UserRecord>,
    sessions: LockedDocument<SessionRecord>,
    progress: LockedDocument<ProgressEntry>,
    leaderboard: LockedDocument<LeaderboardRecord>,
}

impl FileStore {
    pub const USERS_FILE: &'static str = "users.json";
    pub const SESSIONS_FILE: &'static str = "sessions.json";
    pub const PROGRESS_FILE: &'static str = "progress.json";
    pub const LEADERBOARD_FILE: &'static str = "leaderboard.json";

    /// `lock_timeout` bounds every lock wait; `None` blocks until the lock
    /// is granted.
    pub fn new(data_dir: &Path, lock_timeout: Option<Duration>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        Ok(Self {
            users: LockedDocument::new(data_dir, Self::USERS_FILE, lock_timeout),
            sessions: LockedDocument::new(data_dir, Self::SESSIONS_FILE, lock_timeout),
            progress: LockedDocument::new(data_dir, Self::PROGRESS_FILE, lock_timeout),
            leaderboard: LockedDocument::new(data_dir, Self::LEADERBOARD_FILE, lock_timeout),
        })
    }
}

/// Re-sorts the records into leaderboard order and refreshes cached ranks.
fn refresh_ranks(records: &mut Vec<LeaderboardRecord>) {
    let ranked = rank_entries(records.iter().map(|r| (r.username.clone(), r.score)));

    let mut by_key: HashMap<String, LeaderboardRecord> = records
        .drain(..)
        .map(|r| (r.username.key().to_string(), r))
        .collect();

    for entry in ranked {
        if let Some(mut record) = by_key.remove(entry.username.key()) {
            record.rank = entry.rank;
            records.push(record);
        }
    }
}

fn user_from_record(record: UserRecord) -> User {
    User {
        username: record.username,
        email: record.email,
        password_hash: record.password_hash,
        registered_at: record.registered_at,
    }
}

fn session_from_record(record: SessionRecord) -> Session {
    Session {
        id: record.id,
        token_hash: record.token_hash,
        token_lookup: record.token_lookup,
        username: record.username,
        created_at: record.created_at,
        expires_at: record.expires_at,
    }
}

impl Store for FileStore {
    fn initialize(&self) -> Result<()> {
        // Surface unreadable documents at startup rather than on first use.
        self.users.read()?;
        self.sessions.read()?;
        self.progress.read()?;
        self.leaderboard.read()?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.users.modify(|records| {
            let email_key = canonical_key(&user.email);
            if records
                .iter()
                .any(|r| r.username == user.username || canonical_key(&r.email) == email_key)
            {
                return Err(Error::AlreadyExists(
                    "username or email already registered".to_string(),
                ));
            }

            records.push(UserRecord {
                username: user.username.clone(),
                email: user.email.clone(),
                password_hash: user.password_hash.clone(),
                registered_at: user.registered_at,
            });
            Ok(((), true))
        })
    }

    fn get_user(&self, username: &Username) -> Result<Option<User>> {
        Ok(self
            .users
            .read()?
            .into_iter()
            .find(|r| r.username == *username)
            .map(user_from_record))
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email_key = canonical_key(email);
        Ok(self
            .users
            .read()?
            .into_iter()
            .find(|r| canonical_key(&r.email) == email_key)
            .map(user_from_record))
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        self.sessions.modify(|records| {
            if records.iter().any(|r| r.token_lookup == session.token_lookup) {
                return Err(Error::AlreadyExists(
                    "session token lookup collision".to_string(),
                ));
            }

            // Expired sessions are dropped whenever the document is rewritten.
            let now = Utc::now();
            records.retain(|r| r.expires_at > now);

            records.push(SessionRecord {
                id: session.id.clone(),
                token_hash: session.token_hash.clone(),
                token_lookup: session.token_lookup.clone(),
                username: session.username.clone(),
                created_at: session.created_at,
                expires_at: session.expires_at,
            });
            Ok(((), true))
        })
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        Ok(self
            .sessions
            .read()?
            .into_iter()
            .find(|r| r.token_lookup == lookup)
            .map(session_from_record))
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        self.sessions.modify(|records| {
            let before = records.len();
            records.retain(|r| r.id != id);
            let removed = records.len() != before;
            Ok((removed, removed))
        })
    }

    // Progress operations

    fn get_progress(&self, username: &Username) -> Result<UserProgress> {
        Ok(self
            .progress
            .read()?
            .into_iter()
            .filter(|e| e.username == *username)
            .map(|e| {
                (
                    e.topic_id,
                    ProgressRecord {
                        status: e.status,
                        completed_at: e.completed_at,
                        last_accessed: e.last_accessed,
                    },
                )
            })
            .collect())
    }

    fn set_topic_status(
        &self,
        username: &Username,
        topic_id: &str,
        status: TopicStatus,
    ) -> Result<ProgressRecord> {
        self.progress.modify(|entries| {
            let now = Utc::now();
            let existing = entries
                .iter_mut()
                .find(|e| e.username == *username && e.topic_id == topic_id);

            let record = match existing {
                Some(entry) => {
                    let previous = ProgressRecord {
                        status: entry.status,
                        completed_at: entry.completed_at,
                        last_accessed: entry.last_accessed,
                    };
                    let record = ProgressRecord::transition(Some(&previous), status, now);
                    entry.status = record.status;
                    entry.completed_at = record.completed_at;
                    entry.last_accessed = record.last_accessed;
                    record
                }
                None => {
                    let record = ProgressRecord::transition(None, status, now);
                    entries.push(ProgressEntry {
                        username: username.clone(),
                        topic_id: topic_id.to_string(),
                        status: record.status,
                        completed_at: record.completed_at,
                        last_accessed: record.last_accessed,
                    });
                    record
                }
            };

            Ok((record, true))
        })
    }

    // Score ledger operations

    fn upsert_if_higher(&self, username: &Username, score: i64) -> Result<UpsertOutcome> {
        validate_score(score)?;

        let outcome = self.leaderboard.modify(|records| {
            let now = Utc::now();
            let outcome = match records.iter_mut().find(|r| r.username == *username) {
                Some(record) if score > record.score => {
                    record.score = score;
                    record.last_updated = now;
                    UpsertOutcome {
                        applied: true,
                        stored_score: score,
                    }
                }
                Some(record) => UpsertOutcome {
                    applied: false,
                    stored_score: record.score,
                },
                None => {
                    records.push(LeaderboardRecord {
                        username: username.clone(),
                        score,
                        rank: 0,
                        last_updated: now,
                    });
                    UpsertOutcome {
                        applied: true,
                        stored_score: score,
                    }
                }
            };

            if outcome.applied {
                refresh_ranks(records);
            }
            Ok((outcome, outcome.applied))
        })?;

        tracing::debug!(
            "Ledger upsert for {}: candidate={} stored={} applied={}",
            username.key(),
            score,
            outcome.stored_score,
            outcome.applied
        );

        Ok(outcome)
    }

    fn read_all(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>> {
        let records = self.leaderboard.read()?;
        Ok(rank_top(
            records.into_iter().map(|r| (r.username, r.score)),
            limit,
        ))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(raw: &str) -> Username {
        Username::parse(raw).unwrap()
    }

    #[test]
    fn test_cached_ranks_follow_leaderboard_order() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path(), None).unwrap();

        store.upsert_if_higher(&name("carol"), 90).unwrap();
        store.upsert_if_higher(&name("bob"), 100).unwrap();
        store.upsert_if_higher(&name("Alice"), 100).unwrap();

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(temp.path().join(FileStore::LEADERBOARD_FILE)).unwrap(),
        )
        .unwrap();
        let cached: Vec<(String, u64)> = raw["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| {
                (
                    e["username"].as_str().unwrap().to_string(),
                    e["rank"].as_u64().unwrap(),
                )
            })
            .collect();

        assert_eq!(
            cached,
            vec![
                ("Alice".to_string(), 1),
                ("bob".to_string(), 1),
                ("carol".to_string(), 3)
            ]
        );
    }

    #[test]
    fn test_non_applied_upsert_does_not_rewrite() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path(), None).unwrap();
        let path = temp.path().join(FileStore::LEADERBOARD_FILE);

        store.upsert_if_higher(&name("dave"), 40).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let outcome = store.upsert_if_higher(&name("DAVE"), 10).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.stored_score, 40);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_first_spelling_is_kept_for_display() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path(), None).unwrap();

        store.upsert_if_higher(&name("MixedCase"), 1).unwrap();
        store.upsert_if_higher(&name("mixedcase"), 5).unwrap();

        let entries = store.read_all(None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username.as_str(), "MixedCase");
        assert_eq!(entries[0].score, 5);
    }

    #[test]
    fn test_session_roundtrip_and_delete() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path(), None).unwrap();
        let now = Utc::now();

        let session = Session {
            id: "s-1".to_string(),
            token_hash: "hash".to_string(),
            token_lookup: "abcd1234".to_string(),
            username: name("erin"),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
        };
        store.create_session(&session).unwrap();

        let fetched = store.get_session_by_lookup("abcd1234").unwrap().unwrap();
        assert_eq!(fetched.id, "s-1");
        assert_eq!(fetched.token_hash, "hash");

        assert!(store.delete_session("s-1").unwrap());
        assert!(!store.delete_session("s-1").unwrap());
        assert!(store.get_session_by_lookup("abcd1234").unwrap().is_none());
    }

    #[test]
    fn test_initialize_rejects_corrupt_documents() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(FileStore::PROGRESS_FILE), "{\"version\":1").unwrap();

        let store = FileStore::new(temp.path(), None).unwrap();
        let err = store.initialize().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CorruptState);
    }
}
