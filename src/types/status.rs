use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Self-reported mastery of a single syllabus topic.
///
/// Variants are declared in ascending order so the derived `Ord` matches
/// the point weights.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    #[default]
    NotStarted,
    Reviewing,
    Practicing,
    Confident,
    Mastered,
}

impl TopicStatus {
    pub const ALL: [TopicStatus; 5] = [
        TopicStatus::NotStarted,
        TopicStatus::Reviewing,
        TopicStatus::Practicing,
        TopicStatus::Confident,
        TopicStatus::Mastered,
    ];

    /// Point weight used by the progress aggregator.
    #[must_use]
    pub const fn points(self) -> i64 {
        match self {
            TopicStatus::NotStarted => 0,
            TopicStatus::Reviewing => 2,
            TopicStatus::Practicing => 5,
            TopicStatus::Confident => 8,
            TopicStatus::Mastered => 10,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TopicStatus::NotStarted => "not_started",
            TopicStatus::Reviewing => "reviewing",
            TopicStatus::Practicing => "practicing",
            TopicStatus::Confident => "confident",
            TopicStatus::Mastered => "mastered",
        }
    }

    pub fn parse(s: &str) -> Option<TopicStatus> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::Validation(format!("unrecognized status '{s}'")))
    }
}
