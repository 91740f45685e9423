//! Format-dispatched text extraction.
//!
//! Uploads arrive as raw bytes plus a filename; the registry picks an
//! extractor by lowercase suffix and produces the plain text the cleaning
//! pipeline consumes. Supported out of the box: plain text, PDF, and
//! word-processor (DOCX) documents.

mod docx;
mod pdf;
mod plain;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;
pub use plain::PlainTextExtractor;

use crate::error::{Error, Result};

/// Trait for format-specific text extraction.
pub trait TextExtractor: Send + Sync {
    /// Extractor name for diagnostics.
    fn name(&self) -> &'static str;

    /// Whether this extractor handles the (lowercase) file extension.
    fn supports(&self, extension: &str) -> bool;

    /// Extracts plain text from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the bytes are not a valid
    /// instance of the format.
    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// Suffix-dispatched extractor registry.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self {
            extractors: vec![
                Box::new(PlainTextExtractor),
                Box::new(PdfExtractor),
                Box::new(DocxExtractor),
            ],
        }
    }
}

impl ExtractorRegistry {
    /// Creates the registry with the built-in extractors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an additional extractor; later registrations win over
    /// built-ins for overlapping extensions.
    pub fn register(&mut self, extractor: Box<dyn TextExtractor>) {
        self.extractors.insert(0, extractor);
    }

    /// Extracts text from `bytes`, dispatching on the filename suffix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the filename has no extension,
    /// no extractor supports it, or extraction itself fails.
    pub fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .ok_or_else(|| {
                Error::invalid_input(format!("filename {filename} has no extension"))
            })?;

        let extractor = self
            .extractors
            .iter()
            .find(|e| e.supports(&extension))
            .ok_or_else(|| {
                Error::invalid_input(format!("unsupported document format: .{extension}"))
            })?;

        tracing::debug!(extractor = extractor.name(), %filename, "extracting text");
        extractor.extract(bytes)
    }
}
