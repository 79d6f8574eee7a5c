//! Cosine similarity ranking over stored photo embeddings.
//!
//! Ranking is a pure function of the query and the candidate set: the output
//! is sorted by score descending with ties broken by photo id ascending, so
//! it does not depend on the order candidates are supplied in.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use super::types::{AlbumId, EmbeddingRecord, PhotoId};

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPhoto {
    pub photo_id: PhotoId,
    pub album_id: AlbumId,
    /// Cosine similarity score (-1.0 to 1.0)
    pub score: f32,
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn similarity(query: &[f32], query_norm: f32, target: &[f32]) -> f32 {
    if query.len() != target.len() {
        return 0.0;
    }
    // zero only for an all-zero vector, or one whose norm underflows
    let norms = query_norm * l2_norm(target);
    if norms == 0.0 {
        return 0.0;
    }

    let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    dot_product / norms
}

/// Heap entry; greater means a better hit.
struct Scored<'a> {
    score: f32,
    record: &'a EmbeddingRecord,
}

impl Ord for Scored<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.record.photo_id.cmp(&self.record.photo_id))
    }
}

impl PartialOrd for Scored<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scored<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored<'_> {}

/// Ranks candidates against one query vector.
///
/// The query norm is computed once, not per candidate.
pub struct SimilarityRanker<'q> {
    query: &'q [f32],
    query_norm: f32,
}

impl<'q> SimilarityRanker<'q> {
    pub fn new(query: &'q [f32]) -> Self {
        Self {
            query,
            query_norm: l2_norm(query),
        }
    }

    /// Cosine similarity of the query and `target`.
    ///
    /// Zero-norm vectors, and vectors of different length, score 0.
    pub fn score(&self, target: &[f32]) -> f32 {
        similarity(self.query, self.query_norm, target)
    }

    /// Top `top_k` candidates, leaving out any scoring below `min_score`.
    pub fn rank<'a, I>(
        &self,
        candidates: I,
        top_k: usize,
        min_score: Option<f32>,
    ) -> Vec<RankedPhoto>
    where
        I: IntoIterator<Item = &'a EmbeddingRecord>,
    {
        if top_k == 0 {
            return Vec::new();
        }

        // Min-heap of the best `top_k` seen so far; the root is the worst kept hit.
        let mut heap: BinaryHeap<Reverse<Scored<'a>>> = BinaryHeap::with_capacity(top_k + 1);

        for record in candidates {
            let score = self.score(record.vector.as_slice());
            if min_score.is_some_and(|min| score < min) {
                continue;
            }

            let entry = Scored { score, record };
            if heap.len() < top_k {
                heap.push(Reverse(entry));
            } else if let Some(Reverse(worst)) = heap.peek() {
                if entry > *worst {
                    heap.pop();
                    heap.push(Reverse(entry));
                }
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|Reverse(s)| RankedPhoto {
                photo_id: s.record.photo_id.clone(),
                album_id: s.record.album_id.clone(),
                score: s.score,
            })
            .collect()
    }
}
