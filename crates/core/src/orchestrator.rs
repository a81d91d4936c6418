use crate::embeddings::EmbeddingProvider;
use crate::similarity::{extract_context, SimilarityEngine};
use crate::{Chunk, QueryResult, SearchError, SearchMatch, SearchOptions};
use std::future::Future;
use tracing::debug;

/// Exact-match-first retrieval with an embedding fallback.
///
/// A query contained (case-insensitively) in any chunk returns only those
/// chunks, in document order, and never calls the provider. Semantic ranking
/// runs only when no chunk contains the query.
pub struct HybridSearcher<P>
where
    P: EmbeddingProvider,
{
    provider: P,
    engine: SimilarityEngine,
    options: SearchOptions,
}

impl<P> HybridSearcher<P>
where
    P: EmbeddingProvider,
{
    pub fn new(provider: P, options: SearchOptions) -> Self {
        Self {
            provider,
            engine: SimilarityEngine::new(),
            options,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub async fn search(
        &self,
        query: &str,
        chunks: &[Chunk],
        top_k: usize,
    ) -> Result<Vec<QueryResult>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::Validation("query is empty".to_string()));
        }

        if chunks.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let exact = exact_matches(query, chunks);
        if !exact.is_empty() {
            debug!(query, matches = exact.len(), "exact match short-circuit");
            return Ok(exact
                .into_iter()
                .take(top_k)
                .map(|chunk| self.to_result(chunk, chunks, 1.0, SearchMatch::Exact))
                .collect());
        }

        debug!(query, chunk_count = chunks.len(), "no exact match, falling back to embeddings");
        self.fill_missing_embeddings(chunks).await?;
        let query_vector = self.bounded(self.provider.embed_one(query)).await?;

        Ok(self
            .engine
            .rank(&query_vector, chunks, top_k)
            .into_iter()
            .map(|(chunk, score)| self.to_result(chunk, chunks, score, SearchMatch::Semantic))
            .collect())
    }

    /// Drops cached vectors, e.g. when their document is deleted.
    pub fn forget<S: AsRef<str>>(&self, chunk_ids: &[S]) -> usize {
        self.engine.cache().evict(chunk_ids)
    }

    async fn fill_missing_embeddings(&self, chunks: &[Chunk]) -> Result<(), SearchError> {
        let missing = self.engine.cache().missing(chunks);
        if missing.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = missing.iter().map(|chunk| chunk.text.clone()).collect();
        debug!(provider = self.provider.name(), batch_size = texts.len(), "embedding uncached chunks");
        let vectors = self.bounded(self.provider.embed(&texts)).await?;

        if vectors.len() != missing.len() {
            return Err(SearchError::provider(
                self.provider.name(),
                format!(
                    "requested {} embeddings, received {}",
                    missing.len(),
                    vectors.len()
                ),
            ));
        }

        for (chunk, vector) in missing.into_iter().zip(vectors) {
            self.engine.cache().insert(chunk.id.clone(), vector);
        }

        Ok(())
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, SearchError>
    where
        F: Future<Output = Result<T, SearchError>>,
    {
        let timeout = self.options.provider_timeout;
        tokio::time::timeout(timeout, call).await.map_err(|_| {
            SearchError::provider(
                self.provider.name(),
                format!("no response within {timeout:?}"),
            )
        })?
    }

    fn to_result(
        &self,
        chunk: &Chunk,
        chunks: &[Chunk],
        score: f64,
        matched_by: SearchMatch,
    ) -> QueryResult {
        QueryResult {
            text: chunk.text.clone(),
            page_number: chunk.page_number,
            score,
            context: extract_context(chunk, chunks, self.options.context_chars),
            matched_by,
        }
    }
}

fn exact_matches<'a>(query: &str, chunks: &'a [Chunk]) -> Vec<&'a Chunk> {
    let needle = query.to_lowercase();
    chunks
        .iter()
        .filter(|chunk| chunk.text.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn chunk(id: &str, text: &str, page_number: u32, chunk_index: u64) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            page_number,
            chunk_index,
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        embedded_texts: AtomicUsize,
        inner: CharacterNgramEmbedder,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed(texts).await
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            Err(SearchError::provider("failing", "quota exceeded"))
        }
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn name(&self) -> &str {
            "short"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            Ok(vec![vec![1.0, 0.0]])
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("c0", "The hydraulic pump must be primed before start-up.", 1, 0),
            chunk("c1", "Check the pump seals every 500 hours.", 1, 1),
            chunk("c2", "Electrical wiring diagram for the control cabinet.", 2, 2),
            chunk("c3", "Replace the air filter when the indicator turns red.", 3, 3),
        ]
    }

    #[tokio::test]
    async fn exact_match_returns_verbatim_text_with_full_score() {
        let searcher = HybridSearcher::new(CountingProvider::default(), SearchOptions::default());
        let chunks = vec![
            chunk("a", "The dog ran.", 1, 0),
            chunk("b", "unrelated text", 1, 1),
        ];

        let results = searcher.search("dog", &chunks, 5).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "The dog ran.");
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[0].page_number, 1);
        assert_eq!(results[0].matched_by, SearchMatch::Exact);
        assert_eq!(results[0].context, "The dog ran. ... unrelated text");
        assert_eq!(searcher.provider().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exact_matches_keep_document_order_and_respect_top_k() {
        let searcher = HybridSearcher::new(CountingProvider::default(), SearchOptions::default());

        let results = searcher.search("PUMP", &corpus(), 1).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].text.starts_with("The hydraulic pump"));
        assert_eq!(searcher.provider().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exact_path_never_touches_a_failing_provider() {
        let searcher = HybridSearcher::new(FailingProvider, SearchOptions::default());

        let results = searcher.search("air filter", &corpus(), 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].page_number, 3);
    }

    #[tokio::test]
    async fn semantic_fallback_orders_by_score() {
        let searcher = HybridSearcher::new(CountingProvider::default(), SearchOptions::default());

        let results = searcher
            .search("priming the hydraulic pumps", &corpus(), 3)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|result| result.matched_by == SearchMatch::Semantic));
        assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
        assert!(results[0].text.contains("hydraulic pump"));
        // one batched call for the chunks, one for the query
        assert_eq!(searcher.provider().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn chunk_embeddings_are_cached_between_searches() {
        let searcher = HybridSearcher::new(CountingProvider::default(), SearchOptions::default());
        let chunks = corpus();

        searcher.search("wiring schematics", &chunks, 2).await.unwrap();
        searcher.search("seal inspection interval", &chunks, 2).await.unwrap();

        let provider = searcher.provider();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(provider.embedded_texts.load(Ordering::SeqCst), chunks.len() + 2);
        assert_eq!(searcher.engine().cache().len(), chunks.len());

        let ids: Vec<String> = chunks.iter().map(|chunk| chunk.id.clone()).collect();
        assert_eq!(searcher.forget(ids.as_slice()), 4);
        assert!(searcher.engine().cache().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_surfaces_on_semantic_path() {
        let searcher = HybridSearcher::new(FailingProvider, SearchOptions::default());

        let error = searcher
            .search("lubrication schedule", &corpus(), 5)
            .await
            .expect_err("provider failure should propagate");
        assert!(error.is_provider_failure());
    }

    #[tokio::test]
    async fn short_provider_response_is_rejected() {
        let searcher = HybridSearcher::new(ShortProvider, SearchOptions::default());

        let error = searcher
            .search("lubrication schedule", &corpus(), 5)
            .await
            .expect_err("count mismatch should fail");
        assert!(error.is_provider_failure());
        assert!(searcher.engine().cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let options = SearchOptions {
            provider_timeout: Duration::from_millis(100),
            ..SearchOptions::default()
        };
        let searcher = HybridSearcher::new(SlowProvider, options);

        let error = searcher
            .search("lubrication schedule", &corpus(), 5)
            .await
            .expect_err("timeout should fail the search");
        assert!(error.is_provider_failure());
    }

    #[tokio::test]
    async fn empty_chunk_set_returns_no_results() {
        let searcher = HybridSearcher::new(FailingProvider, SearchOptions::default());
        let results = searcher.search("anything", &[], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let searcher = HybridSearcher::new(CountingProvider::default(), SearchOptions::default());
        let error = searcher.search("   ", &corpus(), 5).await.unwrap_err();
        assert!(matches!(error, SearchError::Validation(_)));
    }
}
