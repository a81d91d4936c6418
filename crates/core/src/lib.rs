pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod service;
pub mod similarity;
pub mod store;

pub use chunking::{build_document_chunks, chunk_page, split_into_pages, ChunkingConfig, PAGE_BREAK};
pub use embeddings::{
    CharacterNgramEmbedder, EmbeddingProvider, OpenAiEmbeddingProvider, ProviderConfig,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_ENDPOINT, DEFAULT_EMBEDDING_MODEL,
};
pub use error::{IngestError, SearchError};
pub use extractor::{ExtractedText, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{build_document, digest_bytes, discover_pdf_files, is_pdf_path};
pub use models::{
    Chunk, Document, DocumentSummary, IngestionOptions, QueryResponse, QueryResult, SearchMatch,
    SearchOptions,
};
pub use orchestrator::HybridSearcher;
pub use service::{DocumentService, IngestionReport, SkippedPdf};
pub use similarity::{cosine_similarity, extract_context, EmbeddingCache, SimilarityEngine};
pub use store::DocumentStore;
