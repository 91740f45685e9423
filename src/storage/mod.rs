//! Relational repository and object store contracts.
//!
//! The repository persists documents, chunks (without vectors), job
//! records, audit entries, and evaluation runs. Two implementations ship:
//! [`SqliteRepository`] for single-node deployments and
//! [`MemoryRepository`] for tests. Raw document bytes live in an
//! [`ObjectStore`] keyed by `(tenant, document_id, filename)`.

mod memory;
mod schema;
mod sqlite;

pub use memory::{MemoryObjectStore, MemoryRepository};
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Document, DocumentChunk, JobRecord, JobStatus, TenantId};
use crate::error::Result;
use crate::eval::EvaluationRun;

/// Filter for document listings.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Case-insensitive title substring.
    pub title_contains: Option<String>,
    /// Maximum rows returned (0 = unbounded).
    pub limit: usize,
}

/// An audit log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry id.
    pub id: Uuid,
    /// Tenant the action happened in.
    pub tenant: TenantId,
    /// Action tag (`index`, `delete`, `ask`, `job`).
    pub action: String,
    /// Affected entity (document id, job id), when applicable.
    pub entity_id: Option<Uuid>,
    /// Free-form detail.
    pub detail: String,
    /// When it happened.
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Creates an audit entry stamped now.
    #[must_use]
    pub fn new(
        tenant: TenantId,
        action: impl Into<String>,
        entity_id: Option<Uuid>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant,
            action: action.into(),
            entity_id,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }
}

/// Relational store contract.
///
/// Implementations are interior-mutable (`&self`) so one handle can be
/// shared behind an `Arc` across async tasks; individual calls are
/// short and never held across awaits.
pub trait Repository: Send + Sync {
    /// Creates schema/state. Idempotent.
    fn init(&self) -> Result<()>;

    // ==================== Documents ====================

    /// Inserts a document; `(tenant, content_hash)` must be unique.
    fn insert_document(&self, document: &Document) -> Result<()>;

    /// Fetches a document by id, scoped to the tenant.
    fn document(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Document>>;

    /// Resolves a content hash to the existing document, if any.
    fn document_by_hash(&self, tenant: &TenantId, content_hash: &str) -> Result<Option<Document>>;

    /// Lists the tenant's documents, newest first.
    fn list_documents(&self, tenant: &TenantId, filter: &DocumentFilter) -> Result<Vec<Document>>;

    /// Deletes a document and (cascading) its chunks.
    fn delete_document(&self, tenant: &TenantId, id: Uuid) -> Result<()>;

    // ==================== Chunks ====================

    /// Inserts a batch of chunks.
    fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()>;

    /// Fetches a document's chunks in ordinal order.
    fn chunks_for_document(
        &self,
        tenant: &TenantId,
        document_id: Uuid,
    ) -> Result<Vec<DocumentChunk>>;

    /// Number of chunks stored for a document.
    fn chunk_count(&self, tenant: &TenantId, document_id: Uuid) -> Result<usize>;

    // ==================== Jobs ====================

    /// Inserts a job record.
    fn insert_job(&self, job: &JobRecord) -> Result<()>;

    /// Replaces a job record (status, progress, timestamps).
    fn update_job(&self, job: &JobRecord) -> Result<()>;

    /// Fetches a job by id.
    fn job(&self, id: Uuid) -> Result<Option<JobRecord>>;

    /// All jobs currently in `status`, any tenant (startup recovery).
    fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<JobRecord>>;

    /// The tenant's jobs, newest first.
    fn list_jobs(&self, tenant: &TenantId) -> Result<Vec<JobRecord>>;

    // ==================== Audit ====================

    /// Appends an audit entry.
    fn record_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// The tenant's audit entries, newest first, up to `limit`.
    fn audit_log(&self, tenant: &TenantId, limit: usize) -> Result<Vec<AuditEntry>>;

    // ==================== Evaluation runs ====================

    /// Persists an evaluation run.
    fn insert_eval_run(&self, run: &EvaluationRun) -> Result<()>;

    /// Fetches an evaluation run by id.
    fn eval_run(&self, id: Uuid) -> Result<Option<EvaluationRun>>;
}

/// Object store contract for raw document bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores raw bytes under `(tenant, document_id, filename)`.
    async fn put(
        &self,
        tenant: &TenantId,
        document_id: Uuid,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<()>;

    /// Fetches raw bytes, if present.
    async fn get(
        &self,
        tenant: &TenantId,
        document_id: Uuid,
        filename: &str,
    ) -> Result<Option<Vec<u8>>>;

    /// Removes every object of a document.
    async fn delete_document(&self, tenant: &TenantId, document_id: Uuid) -> Result<()>;
}

/// Infers a MIME content type from a filename suffix.
#[must_use]
pub fn content_type_for(filename: &str) -> &'static str {
    match filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("txt" | "text" | "log") => "text/plain",
        Some("md" | "markdown") => "text/markdown",
        Some("pdf") => "application/pdf",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
