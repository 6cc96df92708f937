use lopdf::Document;
use pactum_agent::errors::BackendError;
use pactum_agent::retrieval::TextExtractor;
use tracing::warn;

/// Page text extraction for PDF agreements.
#[derive(Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, BackendError> {
        let document = Document::load_mem(bytes)
            .map_err(|error| BackendError::invalid_response("extraction", error.to_string()))?;

        let mut pages = Vec::new();
        for page_number in document.get_pages().into_keys() {
            match document.extract_text(&[page_number]) {
                Ok(text) => pages.push(text),
                Err(error) => {
                    warn!(page = page_number, error = %error, "page text could not be extracted");
                    pages.push(String::new());
                }
            }
        }
        Ok(pages)
    }
}
