//! PDF text extraction.

use crate::error::{Error, Result};
use crate::extract::TextExtractor;

/// Extractor for PDF documents, backed by `pdf-extract`.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supports(&self, extension: &str) -> bool {
        extension == "pdf"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| Error::invalid_input(format!("cannot extract PDF text: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pdf_bytes() {
        assert!(PdfExtractor.extract(b"definitely not a pdf").is_err());
    }

    #[test]
    fn test_supported_extension() {
        assert!(PdfExtractor.supports("pdf"));
        assert!(!PdfExtractor.supports("txt"));
    }
}
