use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A page-attributed passage of a document. Immutable once produced by the
/// chunker; embeddings live in [`crate::EmbeddingCache`], keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub page_number: u32,
    pub chunk_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub checksum: String,
    pub chunks: Vec<Chunk>,
    pub total_pages: u32,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            total_pages: self.total_pages,
            chunk_count: self.chunks.len(),
            created_at: self.created_at,
        }
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|chunk| chunk.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub total_pages: u32,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SearchMatch {
    Exact,
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub text: String,
    pub page_number: u32,
    pub score: f64,
    pub context: String,
    pub matched_by: SearchMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub document_id: String,
    pub document_name: String,
    pub query: String,
    pub results: Vec<QueryResult>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub parse_timeout: Duration,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            parse_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub context_chars: usize,
    pub provider_timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            context_chars: 100,
            provider_timeout: Duration::from_secs(60),
        }
    }
}
