//! Plain text extraction.

use crate::error::{Error, Result};
use crate::extract::TextExtractor;

/// Extractor for plain-text formats (txt, markdown, logs).
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "txt" | "text" | "md" | "markdown" | "log")
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| {
                Error::invalid_input(format!(
                    "document is not valid UTF-8 (error at byte {})",
                    e.utf8_error().valid_up_to()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_utf8() {
        let text = PlainTextExtractor.extract("héllo wörld".as_bytes()).unwrap();
        assert_eq!(text, "héllo wörld");
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let err = PlainTextExtractor.extract(&[0xff, 0xfe]).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(PlainTextExtractor.supports("txt"));
        assert!(PlainTextExtractor.supports("md"));
        assert!(!PlainTextExtractor.supports("pdf"));
    }
}
