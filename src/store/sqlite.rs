use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::schema::SCHEMA;
use super::{Store, validate_score};
use crate::error::{Error, Result};
use crate::scoring::rank_entries;
use crate::syllabus::{Subject, Syllabus, Topic, Unit};
use crate::types::*;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub const DB_FILE: &'static str = "studytrack.db";

    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_busy_timeout(db_path, Some(DEFAULT_BUSY_TIMEOUT))
    }

    /// Opens the database. `None` waits on a locked database for as long as
    /// SQLite allows instead of failing after a bounded wait.
    pub fn with_busy_timeout<P: AsRef<Path>>(
        db_path: P,
        busy_timeout: Option<Duration>,
    ) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.busy_timeout(busy_timeout.unwrap_or(Duration::from_millis(i32::MAX as u64)))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }

    /// Rebuilds the syllabus from the subject/unit/topic tables.
    /// Returns `None` when no subjects have been imported.
    pub fn load_syllabus(&self) -> Result<Option<Syllabus>> {
        let conn = self.conn();

        let mut subject_stmt =
            conn.prepare("SELECT id, name, description FROM subjects ORDER BY id")?;
        let subjects = subject_stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if subjects.is_empty() {
            return Ok(None);
        }

        let mut unit_stmt = conn.prepare(
            "SELECT id, name FROM units WHERE subject_id = ?1 ORDER BY order_index, id",
        )?;
        let mut topic_stmt = conn.prepare(
            "SELECT id, name FROM topics WHERE unit_id = ?1 ORDER BY order_index, rowid",
        )?;

        let mut syllabus = Syllabus::default();
        for (subject_id, name, description) in subjects {
            let units = unit_stmt
                .query_map(params![subject_id], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut subject = Subject {
                name,
                description,
                units: Vec::with_capacity(units.len()),
            };

            for (unit_id, unit_name) in units {
                let topics = topic_stmt
                    .query_map(params![unit_id], |row| {
                        Ok(Topic {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            sub_topics: Vec::new(),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                subject.units.push(Unit {
                    name: unit_name,
                    topics,
                });
            }

            syllabus.subjects.push(subject);
        }

        Ok(Some(syllabus))
    }
}

fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
}

fn datetime_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_datetime_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => datetime_at(row, idx).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn username_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Username> {
    let raw: String = row.get(idx)?;
    Username::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<TopicStatus> {
    let raw: String = row.get(idx)?;
    raw.parse::<TopicStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: username_at(row, 0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        registered_at: datetime_at(row, 3)?,
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<(String, ProgressRecord)> {
    Ok((
        row.get(0)?,
        ProgressRecord {
            status: status_at(row, 1)?,
            completed_at: optional_datetime_at(row, 2)?,
            last_accessed: datetime_at(row, 3)?,
        },
    ))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (user_key, username, email, email_key, password_hash, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.username.key(),
                user.username.as_str(),
                user.email,
                canonical_key(&user.email),
                user.password_hash,
                format_datetime(&user.registered_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists(
                "username or email already registered".to_string(),
            )),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, username: &Username) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT username, email, password_hash, registered_at FROM users WHERE user_key = ?1",
            params![username.key()],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT username, email, password_hash, registered_at FROM users WHERE email_key = ?1",
            params![canonical_key(email)],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO sessions (id, token_hash, token_lookup, user_key, username, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.token_hash,
                session.token_lookup,
                session.username.key(),
                session.username.as_str(),
                format_datetime(&session.created_at),
                format_datetime(&session.expires_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists(
                "session token lookup collision".to_string(),
            )),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, username, created_at, expires_at
             FROM sessions WHERE token_lookup = ?1",
            params![lookup],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    token_hash: row.get(1)?,
                    token_lookup: row.get(2)?,
                    username: username_at(row, 3)?,
                    created_at: datetime_at(row, 4)?,
                    expires_at: datetime_at(row, 5)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Progress operations

    fn get_progress(&self, username: &Username) -> Result<UserProgress> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT topic_id, status, completed_at, last_accessed
             FROM user_progress WHERE user_key = ?1",
        )?;

        let rows = stmt.query_map(params![username.key()], progress_from_row)?;

        rows.collect::<std::result::Result<UserProgress, _>>()
            .map_err(Error::from)
    }

    fn set_topic_status(
        &self,
        username: &Username,
        topic_id: &str,
        status: TopicStatus,
    ) -> Result<ProgressRecord> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous = tx
            .query_row(
                "SELECT topic_id, status, completed_at, last_accessed
                 FROM user_progress WHERE user_key = ?1 AND topic_id = ?2",
                params![username.key(), topic_id],
                progress_from_row,
            )
            .optional()?
            .map(|(_, record)| record);

        let record = ProgressRecord::transition(previous.as_ref(), status, Utc::now());

        tx.execute(
            "INSERT INTO user_progress (user_key, topic_id, status, completed_at, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (user_key, topic_id) DO UPDATE SET
                status = excluded.status,
                completed_at = excluded.completed_at,
                last_accessed = excluded.last_accessed",
            params![
                username.key(),
                topic_id,
                record.status.as_str(),
                record.completed_at.as_ref().map(format_datetime),
                format_datetime(&record.last_accessed),
            ],
        )?;

        tx.commit()?;
        Ok(record)
    }

    // Score ledger operations

    fn upsert_if_higher(&self, username: &Username, score: i64) -> Result<UpsertOutcome> {
        validate_score(score)?;

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "INSERT INTO leaderboard (user_key, username, total_score, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_key) DO UPDATE SET
                total_score = excluded.total_score,
                last_updated = excluded.last_updated
             WHERE excluded.total_score > leaderboard.total_score",
            params![
                username.key(),
                username.as_str(),
                score,
                format_datetime(&Utc::now()),
            ],
        )?;

        let stored_score: i64 = tx.query_row(
            "SELECT total_score FROM leaderboard WHERE user_key = ?1",
            params![username.key()],
            |row| row.get(0),
        )?;

        tx.commit()?;

        tracing::debug!(
            "Ledger upsert for {}: candidate={} stored={} applied={}",
            username.key(),
            score,
            stored_score,
            changed > 0
        );

        Ok(UpsertOutcome {
            applied: changed > 0,
            stored_score,
        })
    }

    fn read_all(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT username, total_score FROM leaderboard
             ORDER BY total_score DESC, user_key ASC LIMIT ?1",
        )?;

        // SQLite treats a negative LIMIT as unbounded; a sorted prefix ranks
        // identically to the full set.
        let sql_limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = stmt.query_map(params![sql_limit], |row| {
            Ok((username_at(row, 0)?, row.get::<_, i64>(1)?))
        })?;

        let scores = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rank_entries(scores))
    }

    fn get_entry(&self, username: &Username) -> Result<Option<LeaderboardEntry>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT l.username, l.total_score,
                    (SELECT COUNT(*) FROM leaderboard h WHERE h.total_score > l.total_score) + 1
             FROM leaderboard l WHERE l.user_key = ?1",
            params![username.key()],
            |row| {
                Ok(LeaderboardEntry {
                    username: username_at(row, 0)?,
                    score: row.get(1)?,
                    rank: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn stored_syllabus(&self) -> Result<Option<Syllabus>> {
        self.load_syllabus()
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
