use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TopicStatus, Username};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: Username,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub username: Username,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: Username,
    pub score: i64,
    pub rank: u32,
}

/// Result of a single upsert-if-higher call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// Whether the candidate score was written.
    pub applied: bool,
    /// The score held by the ledger after the call.
    pub stored_score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub status: TopicStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed: DateTime<Utc>,
}

impl ProgressRecord {
    /// Applies a status change, stamping `completed_at` only on the
    /// transition into `mastered`.
    #[must_use]
    pub fn transition(previous: Option<&ProgressRecord>, status: TopicStatus, now: DateTime<Utc>) -> Self {
        let completed_at = match (status, previous) {
            (TopicStatus::Mastered, Some(prev)) if prev.status == TopicStatus::Mastered => {
                prev.completed_at.or(Some(now))
            }
            (TopicStatus::Mastered, _) => Some(now),
            _ => None,
        };

        Self {
            status,
            completed_at,
            last_accessed: now,
        }
    }
}

/// Progress for one user keyed by topic id. Missing topics are `not_started`.
pub type UserProgress = BTreeMap<String, ProgressRecord>;
