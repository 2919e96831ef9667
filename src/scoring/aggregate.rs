use std::collections::BTreeMap;

use serde::Serialize;

use crate::syllabus::Syllabus;
use crate::types::{TopicStatus, UserProgress};

/// Total score across every topic in the syllabus.
///
/// Topics the user never touched count as `not_started`, and progress for
/// topics that are no longer in the syllabus is ignored. Always recomputed
/// from scratch, so calling it twice on the same input is harmless.
#[must_use]
pub fn compute_total(syllabus: &Syllabus, progress: &UserProgress) -> i64 {
    syllabus
        .topic_ids()
        .into_iter()
        .map(|id| status_of(progress, id).points())
        .sum()
}

/// Highest total the current syllabus allows.
#[must_use]
pub fn max_total(syllabus: &Syllabus) -> i64 {
    syllabus.topic_count() as i64 * TopicStatus::Mastered.points()
}

/// How many syllabus topics sit at each status.
#[must_use]
pub fn status_counts(syllabus: &Syllabus, progress: &UserProgress) -> BTreeMap<TopicStatus, usize> {
    let mut counts: BTreeMap<TopicStatus, usize> =
        TopicStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for id in syllabus.topic_ids() {
        *counts.entry(status_of(progress, id)).or_default() += 1;
    }
    counts
}

fn status_of(progress: &UserProgress, topic_id: &str) -> TopicStatus {
    progress
        .get(topic_id)
        .map(|record| record.status)
        .unwrap_or_default()
}

/// Dashboard summary for one user.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub total_score: i64,
    pub max_score: i64,
    pub status_counts: BTreeMap<TopicStatus, usize>,
}

impl ProgressSummary {
    #[must_use]
    pub fn new(syllabus: &Syllabus, progress: &UserProgress) -> Self {
        Self {
            total_score: compute_total(syllabus, progress),
            max_score: max_total(syllabus),
            status_counts: status_counts(syllabus, progress),
        }
    }
}
