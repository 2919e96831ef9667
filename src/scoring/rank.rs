use crate::types::{LeaderboardEntry, Username};

/// Orders `(user, score)` pairs into a leaderboard using standard
/// competition ranking ("1224").
///
/// Entries sort by score descending, then by canonical username ascending
/// so tied users always appear in the same order regardless of how the
/// backend stored them. Tied scores share a rank and the next lower score
/// is ranked `previous_rank + tie_count`.
///
/// A rank only depends on how many scores are strictly higher, so ranking
/// the top-N prefix of a sorted set gives the same ranks as ranking all of it.
pub fn rank_entries<I>(scores: I) -> Vec<LeaderboardEntry>
where
    I: IntoIterator<Item = (Username, i64)>,
{
    let mut scores: Vec<(Username, i64)> = scores.into_iter().collect();
    scores.sort_by(|(a_name, a_score), (b_name, b_score)| {
        b_score.cmp(a_score).then_with(|| a_name.cmp(b_name))
    });

    let mut entries = Vec::with_capacity(scores.len());
    let mut rank = 0u32;
    let mut previous: Option<i64> = None;

    for (position, (username, score)) in scores.into_iter().enumerate() {
        if previous != Some(score) {
            rank = position as u32 + 1;
            previous = Some(score);
        }
        entries.push(LeaderboardEntry {
            username,
            score,
            rank,
        });
    }

    entries
}

/// Ranks then truncates to `limit` entries.
pub fn rank_top<I>(scores: I, limit: Option<usize>) -> Vec<LeaderboardEntry>
where
    I: IntoIterator<Item = (Username, i64)>,
{
    let mut entries = rank_entries(scores);
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    entries
}
