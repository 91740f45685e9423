//! Document and chunk entities.
//!
//! Documents are created by the indexing pipeline and immutable afterwards
//! except for `updated_at`. Chunks carry their position in the cleaned
//! document so citations can be traced back to exact spans.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tenant::TenantId;

/// An indexed document.
///
/// `(tenant, content_hash)` is unique: re-uploads of identical bytes
/// resolve to the existing document instead of creating a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier, shared with the object store key.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant: TenantId,
    /// Uploading principal, when known.
    pub owner: Option<String>,
    /// Human-readable title (defaults to the upload filename).
    pub title: String,
    /// Source URI, when the document was fetched rather than uploaded.
    pub source_uri: Option<String>,
    /// Hex SHA-256 of the raw uploaded bytes.
    pub content_hash: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Whether the document is readable by every principal of the tenant.
    pub public: bool,
}

impl Document {
    /// Creates a new document with a fresh id and current timestamps.
    #[must_use]
    pub fn new(tenant: TenantId, title: impl Into<String>, content_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant,
            owner: None,
            title: title.into(),
            source_uri: None,
            content_hash: content_hash.into(),
            created_at: now,
            updated_at: now,
            public: false,
        }
    }

    /// Sets the owning principal.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets the source URI.
    #[must_use]
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }
}

/// A contiguous span of a cleaned document produced by the chunker.
///
/// Ordinals are 0-based and contiguous per document; offsets are character
/// offsets into the cleaned text and monotonically non-decreasing across
/// the chunk sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique identifier, shared as the lexical doc id, the vector point
    /// id, and the relational primary key.
    pub id: Uuid,
    /// Parent document.
    pub document_id: Uuid,
    /// Owning tenant.
    pub tenant: TenantId,
    /// 0-based position within the document.
    pub ordinal: usize,
    /// Chunk text.
    pub text: String,
    /// Start character offset in the cleaned document.
    pub start_offset: usize,
    /// End character offset (exclusive) in the cleaned document.
    pub end_offset: usize,
    /// Optional free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl DocumentChunk {
    /// Creates a chunk with a fresh id.
    #[must_use]
    pub fn new(
        document_id: Uuid,
        tenant: TenantId,
        ordinal: usize,
        text: impl Into<String>,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            tenant,
            ordinal,
            text: text.into(),
            start_offset,
            end_offset,
            metadata: BTreeMap::new(),
        }
    }

    /// Character length of the chunk span.
    #[must_use]
    pub const fn span_len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Whether the chunk carries no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
