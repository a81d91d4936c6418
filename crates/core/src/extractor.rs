use crate::chunking::PAGE_BREAK;
use crate::error::IngestError;
use lopdf::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Raw text pulled out of an uploaded file, before page splitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub full_text: String,
    pub page_count: u32,
}

pub trait PdfExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], file_name: &str) -> Result<ExtractedText, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8], file_name: &str) -> Result<ExtractedText, IngestError> {
        let document = Document::load_mem(bytes)
            .map_err(|error| IngestError::PdfParse(format!("{file_name}: {error}")))?;

        let pages = document.get_pages();
        let mut texts = Vec::with_capacity(pages.len());
        for page_no in pages.keys() {
            let text = document
                .extract_text(&[*page_no])
                .map_err(|error| IngestError::PdfParse(format!("{file_name}: {error}")))?;
            texts.push(text);
        }

        if texts.iter().all(|text| text.trim().is_empty()) {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {file_name}"
            )));
        }

        Ok(ExtractedText {
            full_text: join_pages(&texts),
            page_count: pages.len() as u32,
        })
    }
}

fn join_pages(texts: &[String]) -> String {
    texts.join(PAGE_BREAK.to_string().as_str())
}
