use crate::models::Chunk;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Cosine similarity accumulated in f64.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }

    (dot / denominator).clamp(-1.0, 1.0)
}

/// Chunk embeddings keyed by chunk id. Writes are last-write-wins: two
/// searches racing on the same chunk both store an equivalent vector.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    vectors: RwLock<HashMap<String, Arc<Vec<f32>>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chunk_id: &str) -> Option<Arc<Vec<f32>>> {
        self.vectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chunk_id)
            .cloned()
    }

    pub fn insert(&self, chunk_id: impl Into<String>, vector: Vec<f32>) {
        self.vectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chunk_id.into(), Arc::new(vector));
    }

    /// Chunks with no cached vector, in input order.
    pub fn missing<'a>(&self, chunks: &'a [Chunk]) -> Vec<&'a Chunk> {
        let vectors = self.vectors.read().unwrap_or_else(PoisonError::into_inner);
        chunks
            .iter()
            .filter(|chunk| !vectors.contains_key(&chunk.id))
            .collect()
    }

    pub fn evict<S: AsRef<str>>(&self, chunk_ids: &[S]) -> usize {
        let mut vectors = self.vectors.write().unwrap_or_else(PoisonError::into_inner);
        chunk_ids
            .iter()
            .filter(|id| vectors.remove(id.as_ref()).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.vectors.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.vectors.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[derive(Debug, Default)]
pub struct SimilarityEngine {
    cache: EmbeddingCache,
}

impl SimilarityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Scores every chunk with a cached vector against `query_vector`.
    ///
    /// Sorted by descending score, ties broken by ascending `chunk_index`.
    pub fn rank<'a>(
        &self,
        query_vector: &[f32],
        chunks: &'a [Chunk],
        top_k: usize,
    ) -> Vec<(&'a Chunk, f64)> {
        let mut scored: Vec<(&Chunk, f64)> = chunks
            .iter()
            .filter_map(|chunk| {
                let vector = self.cache.get(&chunk.id)?;
                if vector.len() != query_vector.len() {
                    warn!(
                        chunk_id = %chunk.id,
                        chunk_dims = vector.len(),
                        query_dims = query_vector.len(),
                        "skipping chunk with mismatched embedding dimensions"
                    );
                    return None;
                }
                Some((chunk, cosine_similarity(query_vector, &vector)))
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .1
                .total_cmp(&left.1)
                .then_with(|| left.0.chunk_index.cmp(&right.0.chunk_index))
        });
        scored.truncate(top_k);
        scored
    }
}

/// Widens `chunk` with the tail of the previous and the head of the next
/// chunk on the same page, joined by `" ... "`.
pub fn extract_context(chunk: &Chunk, all_chunks: &[Chunk], context_chars: usize) -> String {
    let same_page: Vec<&Chunk> = all_chunks
        .iter()
        .filter(|candidate| candidate.page_number == chunk.page_number)
        .collect();

    let position = same_page.iter().position(|candidate| candidate.id == chunk.id);
    let previous = position
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| same_page.get(index));
    let next = position.and_then(|index| same_page.get(index + 1));

    let mut context = String::new();
    if let Some(previous) = previous {
        context.push_str(&tail_chars(&previous.text, context_chars));
        context.push_str(" ... ");
    }
    context.push_str(&chunk.text);
    if let Some(next) = next {
        context.push_str(" ... ");
        context.push_str(&head_chars(&next.text, context_chars));
    }

    context
}

fn head_chars(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}

fn tail_chars(text: &str, count: usize) -> String {
    let skip = text.chars().count().saturating_sub(count);
    text.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str, page_number: u32, chunk_index: u64) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            page_number,
            chunk_index,
        }
    }

    #[test]
    fn identical_vectors_score_one() {
        let v = [0.3f32, -1.2, 4.0, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let v = [1.0f32, 2.0, 3.0];
        let negated: Vec<f32> = v.iter().map(|value| -value).collect();
        assert!((cosine_similarity(&v, &negated) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let score = cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]);
        assert_eq!(score, 0.0);
        assert!(!score.is_nan());
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn rank_sorts_descending_and_breaks_ties_by_index() {
        let engine = SimilarityEngine::new();
        let chunks = vec![
            chunk("a", "a", 1, 0),
            chunk("b", "b", 1, 1),
            chunk("c", "c", 1, 2),
            chunk("d", "d", 2, 3),
        ];
        engine.cache().insert("a", vec![0.0, 1.0]);
        engine.cache().insert("b", vec![1.0, 0.0]);
        engine.cache().insert("c", vec![2.0, 0.0]);

        let ranked = engine.rank(&[1.0, 0.0], &chunks, 10);
        let ids: Vec<&str> = ranked.iter().map(|(chunk, _)| chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(ranked.windows(2).all(|pair| pair[0].1 >= pair[1].1));
    }

    #[test]
    fn rank_respects_top_k_and_skips_wrong_dimensions() {
        let engine = SimilarityEngine::new();
        let chunks = vec![chunk("a", "a", 1, 0), chunk("b", "b", 1, 1)];
        engine.cache().insert("a", vec![1.0, 0.0, 0.0]);
        engine.cache().insert("b", vec![1.0, 0.0]);

        let ranked = engine.rank(&[1.0, 0.0], &chunks, 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.id, "b");

        engine.cache().insert("a", vec![0.5, 0.5]);
        assert_eq!(engine.rank(&[1.0, 0.0], &chunks, 1).len(), 1);
    }

    #[test]
    fn cache_reports_missing_and_evicts() {
        let cache = EmbeddingCache::new();
        let chunks = vec![chunk("a", "a", 1, 0), chunk("b", "b", 1, 1)];
        cache.insert("a", vec![1.0]);

        let missing: Vec<&str> = cache
            .missing(&chunks)
            .into_iter()
            .map(|chunk| chunk.id.as_str())
            .collect();
        assert_eq!(missing, vec!["b"]);

        assert_eq!(cache.evict(&["a", "zzz"]), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn context_includes_same_page_neighbours_only() {
        let chunks = vec![
            chunk("p1", "previous page text", 1, 0),
            chunk("a", "alpha text", 2, 1),
            chunk("b", "bravo text", 2, 2),
            chunk("c", "charlie text", 2, 3),
            chunk("n", "next page text", 3, 4),
        ];

        assert_eq!(
            extract_context(&chunks[2], &chunks, 100),
            "alpha text ... bravo text ... charlie text"
        );
        assert_eq!(extract_context(&chunks[1], &chunks, 100), "alpha text ... bravo text");
        assert_eq!(extract_context(&chunks[4], &chunks, 100), "next page text");
    }

    #[test]
    fn context_clips_neighbours() {
        let previous = "p".repeat(150);
        let next = format!("{}{}", "n".repeat(100), "tail");
        let chunks = vec![
            chunk("a", &previous, 1, 0),
            chunk("b", "middle", 1, 1),
            chunk("c", &next, 1, 2),
        ];

        let context = extract_context(&chunks[1], &chunks, 100);
        assert_eq!(
            context,
            format!("{} ... middle ... {}", "p".repeat(100), "n".repeat(100))
        );
    }
}
