use crate::chunking::{build_document_chunks, split_into_pages, ChunkingConfig};
use crate::extractor::ExtractedText;
use crate::{Document, IngestError, IngestionOptions};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if is_pdf_path(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Turns extracted text into a fully chunked document with a fresh id.
pub fn build_document(
    file_name: &str,
    bytes: &[u8],
    extracted: &ExtractedText,
    options: &IngestionOptions,
) -> Result<Document, IngestError> {
    let name = file_name.trim();
    if name.is_empty() {
        return Err(IngestError::MissingFileName(
            "uploaded document has an empty file name".to_string(),
        ));
    }

    let config = ChunkingConfig::from(options);
    config.validate()?;

    let pages = split_into_pages(&extracted.full_text, extracted.page_count);
    let chunks = build_document_chunks(&pages, config);

    Ok(Document {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        checksum: digest_bytes(bytes),
        chunks,
        total_pages: extracted.page_count,
        created_at: Utc::now(),
    })
}
