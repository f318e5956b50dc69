use crate::error::RagError;
use crate::models::{RankedChunk, StoredChunk};

/// Cosine similarity, or `None` when the widths differ or either vector has zero norm.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Option<f32> {
    if left.len() != right.len() || left.is_empty() {
        return None;
    }

    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        return None;
    }

    let similarity = dot / (left_norm * right_norm);
    similarity.is_finite().then_some(similarity)
}

/// Exhaustive scan over `corpus`. Ties keep corpus order.
pub fn rank_by_similarity(
    query: &[f32],
    corpus: Vec<StoredChunk>,
    top_k: usize,
) -> Result<Vec<RankedChunk>, RagError> {
    if corpus.is_empty() {
        return Err(RagError::EmptyCorpus);
    }

    let mut ranked: Vec<RankedChunk> = corpus
        .into_iter()
        .filter_map(|chunk| {
            cosine_similarity(query, &chunk.embedding)
                .map(|similarity| RankedChunk { chunk, similarity })
        })
        .collect();

    ranked.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
    ranked.truncate(top_k);

    if ranked.is_empty() {
        return Err(RagError::NoRelevantContent);
    }

    Ok(ranked)
}
