//! Reciprocal Rank Fusion.
//!
//! Merges any number of ranked result lists into one ranking:
//!
//! ```text
//! fused(d) = Σ over lists containing d   1 / (k + rank(d))
//! ```
//!
//! where `rank` is the 1-based position of `d` in that list. Raw scores are
//! ignored; only positions matter, so lists with incomparable score scales
//! (cosine distances, full-text placeholders) fuse cleanly.

use std::collections::HashMap;

use crate::models::SearchResult;

/// Standard RRF constant (Cormack, Clarke & Buettcher, SIGIR 2009).
pub const RRF_K: f64 = 60.0;

/// Fuse ranked lists by [`SearchResult::dedup_key`].
///
/// The first result seen for a key (in list order, then rank order) is kept
/// as the representative and its `score` is replaced by the fused value.
/// Output is sorted by fused score descending; equal scores keep
/// first-insertion order.
pub fn reciprocal_rank_fusion(lists: &[Vec<SearchResult>], k: f64) -> Vec<SearchResult> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<SearchResult> = Vec::new();

    for list in lists {
        for (rank, result) in list.iter().enumerate() {
            let contribution = 1.0 / (k + (rank + 1) as f64);
            match slots.get(result.dedup_key()) {
                Some(&slot) => fused[slot].score += contribution,
                None => {
                    slots.insert(result.dedup_key().to_string(), fused.len());
                    let mut representative = result.clone();
                    representative.score = contribution;
                    fused.push(representative);
                }
            }
        }
    }

    // sort_by is stable.
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}
