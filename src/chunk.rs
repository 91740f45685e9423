//! Sliding-window chunking.
//!
//! Splits cleaned document text into fixed-size character windows with
//! overlap, preserving character offsets so citations can be traced back
//! to exact spans. Ordinals are 0-based and contiguous; offsets are
//! monotonically non-decreasing across the sequence.

use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::core::{DocumentChunk, TenantId};
use crate::error::{Error, Result};

/// Sliding-window chunker with character-based windows.
///
/// # Examples
///
/// ```
/// use ragpipe::chunk::SlidingWindowChunker;
/// use ragpipe::config::ChunkingConfig;
/// use ragpipe::core::TenantId;
/// use uuid::Uuid;
///
/// let chunker = SlidingWindowChunker::new(&ChunkingConfig { window: 10, overlap: 2 }).unwrap();
/// let tenant = TenantId::new("t1").unwrap();
/// let chunks = chunker.chunk(Uuid::new_v4(), &tenant, &"x".repeat(25)).unwrap();
/// assert_eq!(chunks[0].start_offset, 0);
/// assert_eq!(chunks[1].start_offset, 8); // window - overlap
/// ```
#[derive(Debug, Clone)]
pub struct SlidingWindowChunker {
    window: usize,
    overlap: usize,
}

impl SlidingWindowChunker {
    /// Creates a chunker from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the window is zero or the
    /// overlap does not leave room for forward progress.
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        if config.window == 0 {
            return Err(Error::invalid_input("chunk window must be > 0"));
        }
        if config.overlap >= config.window {
            return Err(Error::invalid_input(format!(
                "chunk overlap {} must be less than window {}",
                config.overlap, config.window
            )));
        }
        Ok(Self {
            window: config.window,
            overlap: config.overlap,
        })
    }

    /// Splits `text` into chunks for `document_id`.
    ///
    /// Empty text produces no chunks. The final window is allowed to be
    /// short; a tail that is entirely covered by the previous window's
    /// overlap is not emitted again.
    ///
    /// # Errors
    ///
    /// Currently infallible after construction; kept fallible to match
    /// the pipeline contract.
    pub fn chunk(
        &self,
        document_id: Uuid,
        tenant: &TenantId,
        text: &str,
    ) -> Result<Vec<DocumentChunk>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        // Byte offset of every char plus a sentinel, so char windows can
        // be sliced without re-walking the string.
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        byte_offsets.push(text.len());
        let char_len = byte_offsets.len() - 1;

        let step = self.window - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut ordinal = 0usize;

        while start < char_len {
            let end = (start + self.window).min(char_len);
            let slice = &text[byte_offsets[start]..byte_offsets[end]];
            chunks.push(DocumentChunk::new(
                document_id,
                tenant.clone(),
                ordinal,
                slice,
                start,
                end,
            ));

            if end == char_len {
                break;
            }
            start += step;
            ordinal += 1;
        }

        Ok(chunks)
    }

    /// Window size in characters.
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Overlap in characters.
    #[must_use]
    pub const fn overlap(&self) -> usize {
        self.overlap
    }
}
