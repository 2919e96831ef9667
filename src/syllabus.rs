//! The topic tree users track progress against.
//!
//! A syllabus is `subject -> unit -> topic`, and topics may nest sub-topics.
//! Every topic at any depth carries an id and counts toward the score.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Syllabus {
    pub subjects: Vec<Subject>,
}

/// Field names also accept the legacy `subject.json` spellings
/// (`subject_name`, `unit_name`, `topicId`, `topicName`, `subTopics`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    #[serde(alias = "subject_name", alias = "subjectName")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawUnit")]
pub struct Unit {
    pub name: String,
    pub topics: Vec<Topic>,
}

/// Legacy files may hang topics directly off a unit's `subTopics`; they are
/// treated as ordinary topics of that unit.
#[derive(Deserialize)]
struct RawUnit {
    #[serde(alias = "unit_name", alias = "unitName")]
    name: String,
    #[serde(default)]
    topics: Vec<Topic>,
    #[serde(default, alias = "subTopics")]
    sub_topics: Vec<Topic>,
}

impl From<RawUnit> for Unit {
    fn from(raw: RawUnit) -> Self {
        let mut topics = raw.topics;
        topics.extend(raw.sub_topics);
        Self {
            name: raw.name,
            topics,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    #[serde(alias = "topic_id", alias = "topicId")]
    pub id: String,
    #[serde(alias = "topic_name", alias = "topicName")]
    pub name: String,
    #[serde(
        default,
        alias = "subTopics",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub sub_topics: Vec<Topic>,
}

impl Syllabus {
    /// Loads a syllabus from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );

        let syllabus: Syllabus = if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("invalid syllabus {}: {e}", path.display())))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("invalid syllabus {}: {e}", path.display())))?
        };

        syllabus.validate()?;
        Ok(syllabus)
    }

    /// Rejects empty or duplicate topic ids.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for id in self.topic_ids() {
            if id.trim().is_empty() {
                return Err(Error::Config("syllabus contains an empty topic id".to_string()));
            }
            if !seen.insert(id) {
                return Err(Error::Config(format!(
                    "syllabus contains duplicate topic id '{id}'"
                )));
            }
        }
        Ok(())
    }

    /// All topic ids at every depth, in document order.
    #[must_use]
    pub fn topic_ids(&self) -> Vec<&str> {
        fn walk<'a>(topics: &'a [Topic], out: &mut Vec<&'a str>) {
            for topic in topics {
                out.push(&topic.id);
                walk(&topic.sub_topics, out);
            }
        }

        let mut ids = Vec::new();
        for unit in self.subjects.iter().flat_map(|s| &s.units) {
            walk(&unit.topics, &mut ids);
        }
        ids
    }

    #[must_use]
    pub fn contains(&self, topic_id: &str) -> bool {
        self.topic_ids().contains(&topic_id)
    }

    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topic_ids().len()
    }
}
