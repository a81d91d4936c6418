use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{Chunk, IngestionOptions};
use uuid::Uuid;

pub const PAGE_BREAK: char = '\u{000c}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.chunk_overlap,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&IngestionOptions::default())
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits extracted document text into numbered pages.
///
/// When the text carries form-feed page breaks, pages are exactly the
/// non-empty segments between them. Otherwise the text is cut into
/// `reported_page_count` runs of roughly equal character length. That
/// fallback is an estimate: page numbers attributed to chunks may be off
/// by one near page edges.
pub fn split_into_pages(full_text: &str, reported_page_count: u32) -> Vec<PageText> {
    if full_text.contains(PAGE_BREAK) {
        return full_text
            .split(PAGE_BREAK)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .enumerate()
            .map(|(index, segment)| PageText {
                number: (index + 1) as u32,
                text: segment.to_string(),
            })
            .collect();
    }

    estimate_pages(full_text, reported_page_count.max(1))
}

fn estimate_pages(full_text: &str, page_count: u32) -> Vec<PageText> {
    let total_chars = full_text.chars().count();
    if total_chars == 0 {
        return Vec::new();
    }

    let average = total_chars as f64 / f64::from(page_count);
    let mut pages = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    let mut page = 1u32;

    for ch in full_text.chars() {
        current.push(ch);
        current_len += 1;

        if current_len as f64 >= average && page < page_count {
            push_page(&mut pages, page, &current);
            current.clear();
            current_len = 0;
            page += 1;
        }
    }

    push_page(&mut pages, page, &current);
    pages
}

fn push_page(pages: &mut Vec<PageText>, number: u32, raw: &str) {
    let text = raw.trim();
    if !text.is_empty() {
        pages.push(PageText {
            number,
            text: text.to_string(),
        });
    }
}

/// Cuts one page into overlapping chunks, preferring to end each chunk on
/// a period or newline found past the middle of the window.
///
/// Offsets are counted in chars. `start_index` continues the document-wide
/// chunk counter.
pub fn chunk_page(
    page_text: &str,
    page_number: u32,
    start_index: u64,
    config: ChunkingConfig,
) -> Vec<Chunk> {
    let chars: Vec<char> = page_text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = start_index;

    while start < chars.len() {
        let end = start.saturating_add(config.chunk_size).min(chars.len());
        let reaches_end = end == chars.len();
        let mut window = &chars[start..end];

        if !reaches_end {
            if let Some(boundary) = window.iter().rposition(|ch| *ch == '.' || *ch == '\n') {
                if boundary > config.chunk_size / 2 {
                    window = &window[..=boundary];
                }
            }
        }

        let raw: String = window.iter().collect();
        let text = raw.trim();
        if !text.is_empty() {
            chunks.push(Chunk {
                id: Uuid::new_v4().to_string(),
                text: text.to_string(),
                page_number,
                chunk_index: index,
            });
            index = index.saturating_add(1);
        }

        if reaches_end {
            break;
        }

        // Non-final windows are longer than half the chunk size, so this
        // only falls back to 1 under a config where overlap >= chunk_size / 2.
        start += window.len().saturating_sub(config.overlap).max(1);
    }

    chunks
}

pub fn build_document_chunks(pages: &[PageText], config: ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        let page_chunks = chunk_page(&page.text, page.number, cursor, config);
        cursor = cursor.saturating_add(page_chunks.len() as u64);
        chunks.extend(page_chunks);
    }

    chunks
}
