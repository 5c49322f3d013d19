use crate::error::{PipelineError, Result};
use lopdf::Document;

/// Preview returned by the extraction stage: the first lines of the
/// text, falling back to a character prefix when the text has no line
/// breaks. Purely for user feedback.
pub const PREVIEW_MAX_LINES: usize = 20;
pub const PREVIEW_MAX_CHARS: usize = 1000;

/// Boundary to the PDF parsing collaborator. Operates on the raw byte
/// stream so callers decide where bytes live.
pub trait PdfExtractor: Send + Sync {
    /// Number of pages in the document, without extracting text.
    fn page_count(&self, bytes: &[u8]) -> Result<usize>;

    /// Full text content of the document, pages concatenated in order.
    fn extract_text(&self, bytes: &[u8]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    fn load(&self, bytes: &[u8]) -> Result<Document> {
        let document = Document::load_mem(bytes)
            .map_err(|error| PipelineError::Corrupted(error.to_string()))?;

        if document.is_encrypted() {
            return Err(PipelineError::Corrupted(
                "document is encrypted".to_string(),
            ));
        }

        Ok(document)
    }
}

impl PdfExtractor for LopdfExtractor {
    fn page_count(&self, bytes: &[u8]) -> Result<usize> {
        let document = self.load(bytes)?;
        let pages = document.get_pages();

        if pages.is_empty() {
            return Err(PipelineError::EmptyDocument("pdf has no pages".to_string()));
        }

        Ok(pages.len())
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        let document = self.load(bytes)?;
        let pages = document.get_pages();

        if pages.is_empty() {
            return Err(PipelineError::EmptyDocument("pdf has no pages".to_string()));
        }

        let mut text = String::new();
        for (page_no, _page_id) in pages {
            let page_text = document
                .extract_text(&[page_no])
                .map_err(|error| PipelineError::Corrupted(error.to_string()))?;
            text.push_str(&page_text);
        }

        if text.trim().is_empty() {
            return Err(PipelineError::EmptyDocument(
                "pdf had no readable page text".to_string(),
            ));
        }

        Ok(text)
    }
}

/// First `PREVIEW_MAX_LINES` lines of the text, or the first
/// `PREVIEW_MAX_CHARS` characters when the text has no line breaks.
pub fn preview_text(text: &str) -> String {
    let preview = if text.contains('\n') {
        text.lines()
            .take(PREVIEW_MAX_LINES)
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        text.chars().take(PREVIEW_MAX_CHARS).collect()
    };

    preview.trim().to_string()
}
