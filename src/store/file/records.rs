//! On-disk record schema for the file backend.
//!
//! Every document is `{ "version": 1, "entries": [...] }`. Unknown fields,
//! other versions and the legacy bare-array layout are rejected instead of
//! being coerced, so a damaged file surfaces as `CorruptState`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{TopicStatus, Username, canonical_key};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope<R> {
    pub version: u32,
    pub entries: Vec<R>,
}

/// Borrowed form of [`Envelope`] used when writing.
#[derive(Debug, Serialize)]
pub struct EnvelopeRef<'a, R> {
    pub version: u32,
    pub entries: &'a [R],
}

#[derive(Debug, Deserialize)]
pub struct VersionProbe {
    pub version: u32,
}

/// A row type stored in a locked JSON document.
pub trait Record: Serialize + DeserializeOwned {
    /// Cross-record invariants checked after every load.
    fn validate(_records: &[Self]) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaderboardRecord {
    pub username: Username,
    pub score: i64,
    /// Cached for readers of the raw file; recomputed on every write and
    /// never trusted on read.
    pub rank: u32,
    pub last_updated: DateTime<Utc>,
}

impl Record for LeaderboardRecord {
    fn validate(records: &[Self]) -> Result<(), String> {
        let mut seen = HashSet::new();
        for record in records {
            if record.score < 0 {
                return Err(format!(
                    "negative score {} for '{}'",
                    record.score, record.username
                ));
            }
            if !seen.insert(record.username.key()) {
                return Err(format!("duplicate entry for '{}'", record.username));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRecord {
    pub username: Username,
    pub email: String,
    pub password_hash: String,
    pub registered_at: DateTime<Utc>,
}

impl Record for UserRecord {
    fn validate(records: &[Self]) -> Result<(), String> {
        let mut names = HashSet::new();
        let mut emails = HashSet::new();
        for record in records {
            if !names.insert(record.username.key()) {
                return Err(format!("duplicate user '{}'", record.username));
            }
            if !emails.insert(canonical_key(&record.email)) {
                return Err(format!("duplicate email '{}'", record.email));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionRecord {
    pub id: String,
    pub token_hash: String,
    pub token_lookup: String,
    pub username: Username,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Record for SessionRecord {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressEntry {
    pub username: Username,
    pub topic_id: String,
    pub status: TopicStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed: DateTime<Utc>,
}

impl Record for ProgressEntry {
    fn validate(records: &[Self]) -> Result<(), String> {
        let mut seen = HashSet::new();
        for record in records {
            if !seen.insert((record.username.key(), record.topic_id.as_str())) {
                return Err(format!(
                    "duplicate progress for '{}' on topic '{}'",
                    record.username, record.topic_id
                ));
            }
        }
        Ok(())
    }
}
