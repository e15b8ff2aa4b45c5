//! Cosine-similarity ranking over stored embedding vectors.
//!
//! The store keeps vectors in their own table so that re-ingesting a file
//! never clobbers them; ranking is brute force, which is fine at the scale
//! of one repository's symbols.

/// Cosine similarity of two vectors. Dimension mismatches and zero vectors
/// rank at 0.0 instead of erroring; a stale vector should lose, not abort.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Top-`k` node ids by cosine similarity to `query`, best first. Ties break
/// on node id so results are stable across runs.
pub fn nearest(
    embeddings: &[(String, Vec<f64>)],
    query: &[f64],
    k: usize,
) -> Vec<(String, f64)> {
    let mut scored: Vec<(String, f64)> = embeddings
        .iter()
        .map(|(node_id, vector)| (node_id.clone(), cosine_similarity(vector, query)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}
