//! Lenient readers for the legacy JSON data files.
//!
//! The legacy files were written by hand and by older tooling, so field
//! names vary and individual records may be malformed. Records are decoded
//! one at a time; a bad record is reported and skipped without failing the
//! rest of its file.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct LegacyUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub registered_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyScore {
    pub username: Option<String>,
    #[serde(alias = "total_score")]
    pub score: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LegacySubjectFile {
    #[serde(default)]
    pub subjects: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LegacySubject {
    #[serde(alias = "subject_name", alias = "subjectName")]
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub units: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyUnit {
    #[serde(alias = "unit_name", alias = "unitName")]
    pub name: Option<String>,
    pub order_index: Option<i64>,
    #[serde(default)]
    pub topics: Vec<Value>,
    #[serde(default, alias = "subTopics")]
    pub sub_topics: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyTopic {
    #[serde(alias = "topic_id", alias = "topicId")]
    pub id: Option<String>,
    #[serde(alias = "topic_name", alias = "topicName")]
    pub name: Option<String>,
    pub content_url: Option<String>,
    pub content_type: Option<String>,
    pub estimated_time_minutes: Option<i64>,
    pub order_index: Option<i64>,
    #[serde(default, alias = "subTopics")]
    pub sub_topics: Vec<Value>,
}

/// Reads a legacy file. `Ok(None)` when it does not exist.
pub fn read_file(path: &Path) -> Result<Option<Value>, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(format!("cannot read {}: {e}", path.display())),
    };

    if content.trim().is_empty() {
        return Ok(Some(Value::Array(Vec::new())));
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| format!("invalid JSON in {}: {e}", path.display()))
}

/// Splits a top-level array into its records.
pub fn records(value: Value, file: &str) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(format!(
            "{file}: expected an array of records, found {}",
            kind_of(&other)
        )),
    }
}

/// Decodes one record, describing it on failure.
pub fn decode<T: DeserializeOwned>(record: Value) -> Result<T, String> {
    let preview = preview(&record);
    serde_json::from_value(record).map_err(|e| format!("{e} in {preview}"))
}

/// Interprets a legacy score: an integer, or a string holding one.
pub fn score_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

const PREVIEW_LEN: usize = 80;

fn preview(value: &Value) -> String {
    let text = value.to_string();
    match text.char_indices().nth(PREVIEW_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text,
    }
}
