use crate::embeddings::EmbeddingProvider;
use crate::extractor::PdfExtractor;
use crate::ingest::{build_document, discover_pdf_files};
use crate::orchestrator::HybridSearcher;
use crate::store::DocumentStore;
use crate::{
    Document, DocumentSummary, IngestError, IngestionOptions, QueryResponse, SearchError,
    SearchOptions,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub documents: Vec<DocumentSummary>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Entry points used by request handlers: upload, query, list, delete.
pub struct DocumentService<P>
where
    P: EmbeddingProvider,
{
    store: DocumentStore,
    searcher: HybridSearcher<P>,
    extractor: Arc<dyn PdfExtractor>,
    options: IngestionOptions,
}

impl<P> DocumentService<P>
where
    P: EmbeddingProvider,
{
    pub fn new(
        provider: P,
        extractor: Arc<dyn PdfExtractor>,
        ingestion: IngestionOptions,
        search: SearchOptions,
    ) -> Self {
        Self {
            store: DocumentStore::new(),
            searcher: HybridSearcher::new(provider, search),
            extractor,
            options: ingestion,
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn searcher(&self) -> &HybridSearcher<P> {
        &self.searcher
    }

    /// Extracts, chunks and stores one upload. The document only becomes
    /// visible in the store once it is complete.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<DocumentSummary, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "{file_name} is empty"
            )));
        }

        let extractor = Arc::clone(&self.extractor);
        let name = file_name.to_string();
        let task = tokio::task::spawn_blocking(move || {
            let extracted = extractor.extract(&bytes, &name);
            (bytes, extracted)
        });

        let timeout = self.options.parse_timeout;
        let (bytes, extracted) = tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| IngestError::Timeout(timeout))?
            .map_err(|error| IngestError::PdfParse(format!("extraction task failed: {error}")))?;

        let document = build_document(file_name, &bytes, &extracted?, &self.options)?;
        let stored = self.store.put(document)?;

        info!(
            document_id = %stored.id,
            name = %stored.name,
            total_pages = stored.total_pages,
            chunk_count = stored.chunks.len(),
            "document ingested"
        );

        Ok(stored.summary())
    }

    /// Ingests every PDF under `folder`, skipping files that fail.
    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut documents = Vec::new();
        let mut skipped_files = Vec::new();

        for path in files {
            match self.ingest_path(&path).await {
                Ok(summary) => documents.push(summary),
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipped pdf");
                    skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(IngestionReport {
            documents,
            skipped_files,
        })
    }

    pub async fn ingest_path(&self, path: &Path) -> Result<DocumentSummary, IngestError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        self.ingest(bytes, &name).await
    }

    /// Runs a hybrid search over one stored document. `top_k` falls back to
    /// [`SearchOptions::top_k`].
    pub async fn query(
        &self,
        document_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<QueryResponse, SearchError> {
        let document_id = document_id.trim();
        if document_id.is_empty() {
            return Err(SearchError::Validation("document id is required".to_string()));
        }
        if query.trim().is_empty() {
            return Err(SearchError::Validation("query is required".to_string()));
        }

        let document = self
            .store
            .get(document_id)
            .ok_or_else(|| SearchError::DocumentNotFound(document_id.to_string()))?;

        let top_k = top_k.unwrap_or(self.searcher.options().top_k);
        let started = Instant::now();
        let outcome = self.searcher.search(query, &document.chunks, top_k).await;

        // A delete that landed while embeddings were in flight has already
        // evicted; drop whatever this search cached after it.
        if self.store.get(&document.id).is_none() {
            let evicted = self.searcher.forget(document.chunk_ids().as_slice());
            debug!(document_id = %document.id, evicted, "document deleted during query");
        }
        let results = outcome?;

        Ok(QueryResponse {
            document_id: document.id.clone(),
            document_name: document.name.clone(),
            query: query.to_string(),
            results,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    pub fn get_document(&self, document_id: &str) -> Option<Arc<Document>> {
        self.store.get(document_id)
    }

    /// Sorted by creation time, then id.
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        let mut summaries: Vec<DocumentSummary> = self
            .store
            .list_all()
            .iter()
            .map(|document| document.summary())
            .collect();
        summaries.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        summaries
    }

    pub fn delete_document(&self, document_id: &str) -> bool {
        match self.store.remove(document_id) {
            Some(document) => {
                let evicted = self.searcher.forget(document.chunk_ids().as_slice());
                info!(document_id, evicted_embeddings = evicted, "document deleted");
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.store.clear();
        self.searcher.engine().cache().clear();
    }
}
