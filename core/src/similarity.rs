//! Cosine similarity and the final ordering of scored documents.

use crate::weight::WeightVector;
use crate::DocId;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored {
    pub doc_id: DocId,
    pub score: f64,
}

/// Cosine of the angle between two sparse vectors. Missing keys weigh zero;
/// a zero-norm side yields `0.0`.
pub fn cosine(a: &WeightVector, b: &WeightVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small.iter().filter_map(|(k, w)| large.get(k).map(|v| w * v)).sum();
    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Highest score first; equal scores by ascending document id.
pub fn rank(scores: impl IntoIterator<Item = (DocId, f64)>) -> Vec<Scored> {
    let mut out: Vec<Scored> = scores.into_iter().map(|(doc_id, score)| Scored { doc_id, score }).collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
    out
}
