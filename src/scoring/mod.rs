mod aggregate;
mod rank;

pub use aggregate::{ProgressSummary, compute_total, max_total, status_counts};
pub use rank::{rank_entries, rank_top};
