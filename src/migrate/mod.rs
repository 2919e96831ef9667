//! One-shot import of the legacy JSON data files into the SQLite backend.
//!
//! Each destination table is imported in its own transaction and only when
//! it is still empty, so running the import twice never duplicates rows.

mod legacy;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Transaction, params};
use serde_json::Value;

use self::legacy::{
    LegacyScore, LegacySubject, LegacySubjectFile, LegacyTopic, LegacyUnit, LegacyUser, decode,
    kind_of, read_file, records, score_value,
};
use crate::error::Result;
use crate::store::SqliteStore;
use crate::store::format_datetime;
use crate::types::{TopicStatus, Username, canonical_key};

pub const USERS_FILE: &str = "users.json";
pub const LEADERBOARD_FILE: &str = "leaderboard.json";
pub const PROGRESS_FILE: &str = "progress.json";
pub const SUBJECTS_FILE: &str = "subject.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Migrated,
    /// The destination already had rows; nothing was written.
    AlreadyPopulated,
    SourceMissing,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TableReport {
    pub table: &'static str,
    pub outcome: TableOutcome,
    pub migrated: usize,
    pub skipped: usize,
    pub flattened: usize,
}

impl TableReport {
    fn new(table: &'static str) -> Self {
        Self {
            table,
            outcome: TableOutcome::Migrated,
            migrated: 0,
            skipped: 0,
            flattened: 0,
        }
    }

    fn skip(&mut self, reason: impl fmt::Display) {
        tracing::warn!("{}: skipping record: {reason}", self.table);
        self.skipped += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub tables: Vec<TableReport>,
}

impl MigrationReport {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.tables
            .iter()
            .any(|t| matches!(t.outcome, TableOutcome::Failed(_)))
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<14} {:<18} {:>8} {:>8} {:>9}",
            "TABLE", "RESULT", "MIGRATED", "SKIPPED", "FLATTENED"
        )?;
        for table in &self.tables {
            let outcome = match &table.outcome {
                TableOutcome::Migrated => "migrated",
                TableOutcome::AlreadyPopulated => "already populated",
                TableOutcome::SourceMissing => "source missing",
                TableOutcome::Failed(_) => "failed",
            };
            writeln!(
                f,
                "{:<14} {:<18} {:>8} {:>8} {:>9}",
                table.table, outcome, table.migrated, table.skipped, table.flattened
            )?;
        }
        for table in &self.tables {
            if let TableOutcome::Failed(reason) = &table.outcome {
                writeln!(f, "error: {}: {reason}", table.table)?;
            }
        }
        Ok(())
    }
}

/// Imports every legacy file found in `legacy_dir` into `store`.
///
/// Failures are per table: a malformed file marks its table as failed and
/// rolls that table back, and the remaining tables are still attempted.
pub fn migrate(legacy_dir: &Path, store: &SqliteStore) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    report.tables.push(import_table(
        store,
        "subjects",
        &legacy_dir.join(SUBJECTS_FILE),
        import_syllabus,
    )?);
    report.tables.push(import_table(
        store,
        "users",
        &legacy_dir.join(USERS_FILE),
        import_users,
    )?);
    report.tables.push(import_table(
        store,
        "leaderboard",
        &legacy_dir.join(LEADERBOARD_FILE),
        import_leaderboard,
    )?);
    report.tables.push(import_table(
        store,
        "user_progress",
        &legacy_dir.join(PROGRESS_FILE),
        import_progress,
    )?);

    Ok(report)
}

type Importer = fn(&Transaction<'_>, Value, &mut TableReport) -> std::result::Result<(), String>;

fn import_table(
    store: &SqliteStore,
    table: &'static str,
    source: &Path,
    importer: Importer,
) -> Result<TableReport> {
    let mut report = TableReport::new(table);
    let mut conn = store.connection();

    let populated: bool = conn.query_row(
        &format!("SELECT EXISTS (SELECT 1 FROM {table})"),
        [],
        |row| row.get(0),
    )?;
    if populated {
        tracing::info!("{table}: destination already has rows, skipping");
        report.outcome = TableOutcome::AlreadyPopulated;
        return Ok(report);
    }

    let value = match read_file(source) {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::warn!("{table}: {} not found, skipping", source.display());
            report.outcome = TableOutcome::SourceMissing;
            return Ok(report);
        }
        Err(reason) => {
            tracing::error!("{table}: {reason}");
            report.outcome = TableOutcome::Failed(reason);
            return Ok(report);
        }
    };

    let tx = conn.transaction()?;
    match importer(&tx, value, &mut report) {
        Ok(()) => {
            tx.commit()?;
            tracing::info!(
                "{table}: migrated {} rows ({} skipped, {} flattened)",
                report.migrated,
                report.skipped,
                report.flattened
            );
        }
        Err(reason) => {
            tx.rollback()?;
            tracing::error!("{table}: {reason}");
            report.outcome = TableOutcome::Failed(reason);
            report.migrated = 0;
        }
    }

    Ok(report)
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn import_users(
    tx: &Transaction<'_>,
    value: Value,
    report: &mut TableReport,
) -> std::result::Result<(), String> {
    let mut seen_names = HashSet::new();
    let mut seen_emails = HashSet::new();

    for record in records(value, USERS_FILE)? {
        let user: LegacyUser = match decode(record) {
            Ok(user) => user,
            Err(reason) => {
                report.skip(reason);
                continue;
            }
        };

        let (Some(raw_name), Some(email), Some(password_hash)) =
            (user.username, user.email, user.password_hash)
        else {
            report.skip("missing username, email or password_hash");
            continue;
        };
        let username = match Username::parse(&raw_name) {
            Ok(username) => username,
            Err(e) => {
                report.skip(format!("user '{raw_name}': {e}"));
                continue;
            }
        };
        let email = email.trim().to_string();
        if email.is_empty() {
            report.skip(format!("user '{username}': empty email"));
            continue;
        }
        if !seen_names.insert(username.key().to_string()) {
            report.skip(format!("duplicate user '{username}'"));
            continue;
        }
        if !seen_emails.insert(canonical_key(&email)) {
            report.skip(format!("duplicate email '{email}'"));
            continue;
        }

        let registered_at = parse_timestamp(user.registered_at.as_deref());
        tx.execute(
            "INSERT INTO users (user_key, username, email, email_key, password_hash, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                username.key(),
                username.as_str(),
                email,
                canonical_key(&email),
                password_hash,
                format_datetime(&registered_at),
            ],
        )
        .map_err(|e| format!("insert failed for '{username}': {e}"))?;
        report.migrated += 1;
    }

    Ok(())
}

fn import_leaderboard(
    tx: &Transaction<'_>,
    value: Value,
    report: &mut TableReport,
) -> std::result::Result<(), String> {
    // Duplicate spellings of one user collapse to their best score; the
    // first spelling seen is kept for display.
    let mut best: HashMap<String, (Username, i64)> = HashMap::new();
    let mut order = Vec::new();

    for record in records(value, LEADERBOARD_FILE)? {
        let entry: LegacyScore = match decode(record) {
            Ok(entry) => entry,
            Err(reason) => {
                report.skip(reason);
                continue;
            }
        };

        let Some(raw_name) = entry.username else {
            report.skip("missing username");
            continue;
        };
        let username = match Username::parse(&raw_name) {
            Ok(username) => username,
            Err(e) => {
                report.skip(format!("entry '{raw_name}': {e}"));
                continue;
            }
        };
        let score = match entry.score.as_ref().map(|v| (score_value(v), v)) {
            Some((Some(score), _)) if score >= 0 => score,
            Some((_, raw)) => {
                report.skip(format!("entry '{username}': invalid score {raw}"));
                continue;
            }
            None => {
                report.skip(format!("entry '{username}': missing score"));
                continue;
            }
        };

        match best.get_mut(username.key()) {
            Some((_, stored)) => {
                tracing::warn!(
                    "leaderboard: merging duplicate entry for '{username}' ({score} vs {stored})"
                );
                *stored = (*stored).max(score);
            }
            None => {
                order.push(username.key().to_string());
                best.insert(username.key().to_string(), (username, score));
            }
        }
    }

    let now = format_datetime(&Utc::now());
    for key in order {
        let Some((username, score)) = best.remove(&key) else {
            continue;
        };
        tx.execute(
            "INSERT INTO leaderboard (user_key, username, total_score, last_updated)
             VALUES (?1, ?2, ?3, ?4)",
            params![username.key(), username.as_str(), score, now],
        )
        .map_err(|e| format!("insert failed for '{username}': {e}"))?;
        report.migrated += 1;
    }

    Ok(())
}

fn import_progress(
    tx: &Transaction<'_>,
    value: Value,
    report: &mut TableReport,
) -> std::result::Result<(), String> {
    let users = match value {
        Value::Object(users) => users,
        other => {
            return Err(format!(
                "{PROGRESS_FILE}: expected an object keyed by username, found {}",
                kind_of(&other)
            ));
        }
    };

    let now = Utc::now();
    let mut seen_users = HashSet::new();

    for (raw_name, topics) in users {
        let username = match Username::parse(&raw_name) {
            Ok(username) => username,
            Err(e) => {
                report.skip(format!("progress for '{raw_name}': {e}"));
                continue;
            }
        };
        if !seen_users.insert(username.key().to_string()) {
            report.skip(format!("duplicate progress for '{username}'"));
            continue;
        }
        let topics = match topics {
            Value::Object(topics) => topics,
            other => {
                report.skip(format!(
                    "progress for '{username}': expected an object, found {}",
                    kind_of(&other)
                ));
                continue;
            }
        };

        let statuses: BTreeMap<String, Value> = topics.into_iter().collect();
        for (topic_id, status) in statuses {
            let Some(status) = status.as_str().and_then(TopicStatus::parse) else {
                report.skip(format!(
                    "progress for '{username}' on '{topic_id}': invalid status {status}"
                ));
                continue;
            };

            // Legacy data has no timestamps; a mastered topic counts as
            // completed at import time.
            let completed_at =
                (status == TopicStatus::Mastered).then(|| format_datetime(&now));

            tx.execute(
                "INSERT INTO user_progress (user_key, topic_id, status, completed_at, last_accessed)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    username.key(),
                    topic_id,
                    status.as_str(),
                    completed_at,
                    format_datetime(&now),
                ],
            )
            .map_err(|e| format!("insert failed for '{username}' on '{topic_id}': {e}"))?;
            report.migrated += 1;
        }
    }

    Ok(())
}

/// A topic ready to insert, after flattening.
struct FlatTopic {
    id: String,
    name: String,
    content_url: Option<String>,
    content_type: Option<String>,
    estimated_time_minutes: Option<i64>,
}

fn import_syllabus(
    tx: &Transaction<'_>,
    value: Value,
    report: &mut TableReport,
) -> std::result::Result<(), String> {
    let file: LegacySubjectFile =
        serde_json::from_value(value).map_err(|e| format!("{SUBJECTS_FILE}: {e}"))?;

    let mut seen_topics = HashSet::new();

    for subject in file.subjects {
        let subject: LegacySubject = match decode(subject) {
            Ok(subject) => subject,
            Err(reason) => {
                report.skip(reason);
                continue;
            }
        };
        let Some(subject_name) = subject.name else {
            report.skip("subject without a name");
            continue;
        };

        tx.execute(
            "INSERT INTO subjects (name, description) VALUES (?1, ?2)",
            params![subject_name, subject.description],
        )
        .map_err(|e| format!("insert failed for subject '{subject_name}': {e}"))?;
        let subject_id = tx.last_insert_rowid();
        report.migrated += 1;

        for (unit_index, unit) in subject.units.into_iter().enumerate() {
            let unit: LegacyUnit = match decode(unit) {
                Ok(unit) => unit,
                Err(reason) => {
                    report.skip(reason);
                    continue;
                }
            };
            let Some(unit_name) = unit.name else {
                report.skip(format!("unit without a name in '{subject_name}'"));
                continue;
            };

            tx.execute(
                "INSERT INTO units (subject_id, name, order_index) VALUES (?1, ?2, ?3)",
                params![
                    subject_id,
                    unit_name,
                    unit.order_index.unwrap_or(unit_index as i64)
                ],
            )
            .map_err(|e| format!("insert failed for unit '{unit_name}': {e}"))?;
            let unit_id = tx.last_insert_rowid();

            let mut flat = Vec::new();
            for topic in unit.topics {
                collect_topics(topic, &unit_name, 0, &mut flat, report);
            }
            // Topics hung directly off a unit are pulled into its topic list.
            for topic in unit.sub_topics {
                collect_topics(topic, &unit_name, 1, &mut flat, report);
            }

            for (order_index, topic) in flat.into_iter().enumerate() {
                if !seen_topics.insert(topic.id.clone()) {
                    report.skip(format!("duplicate topic id '{}'", topic.id));
                    continue;
                }
                tx.execute(
                    "INSERT INTO topics (id, unit_id, name, content_url, content_type,
                                         estimated_time_minutes, order_index)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        topic.id,
                        unit_id,
                        topic.name,
                        topic.content_url,
                        topic.content_type,
                        topic.estimated_time_minutes,
                        order_index as i64,
                    ],
                )
                .map_err(|e| format!("insert failed for topic '{}': {e}", topic.id))?;
            }
        }
    }

    Ok(())
}

/// Walks a topic and its descendants in document order. Every node below
/// `depth` 0 is flattened into the enclosing unit.
fn collect_topics(
    node: Value,
    unit_name: &str,
    depth: usize,
    out: &mut Vec<FlatTopic>,
    report: &mut TableReport,
) {
    let topic: LegacyTopic = match decode(node) {
        Ok(topic) => topic,
        Err(reason) => {
            report.skip(reason);
            return;
        }
    };

    match (&topic.id, &topic.name) {
        (Some(id), Some(name)) if !id.trim().is_empty() => {
            if depth > 0 {
                tracing::warn!(
                    "subjects: flattening nested topic '{id}' into unit '{unit_name}'"
                );
                report.flattened += 1;
            }
            out.push(FlatTopic {
                id: id.trim().to_string(),
                name: name.clone(),
                content_url: topic.content_url.clone(),
                content_type: topic.content_type.clone(),
                estimated_time_minutes: topic.estimated_time_minutes,
            });
        }
        _ => report.skip(format!("topic without an id or name in unit '{unit_name}'")),
    }

    for child in topic.sub_topics {
        collect_topics(child, unit_name, depth + 1, out, report);
    }
}
