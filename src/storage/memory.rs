//! In-memory repository and object store for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::{Document, DocumentChunk, JobRecord, JobStatus, TenantId};
use crate::error::{Result, StorageError};
use crate::eval::EvaluationRun;
use crate::storage::{AuditEntry, DocumentFilter, ObjectStore, Repository};

#[derive(Default)]
struct State {
    documents: HashMap<Uuid, Document>,
    chunks: HashMap<Uuid, DocumentChunk>,
    jobs: HashMap<Uuid, JobRecord>,
    audit: Vec<AuditEntry>,
    eval_runs: HashMap<Uuid, EvaluationRun>,
}

/// In-memory [`Repository`].
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted evaluation runs.
    #[must_use]
    pub fn eval_run_count(&self) -> usize {
        self.state.read().map(|s| s.eval_runs.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StorageError::Database("repository lock poisoned".to_string()).into())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StorageError::Database("repository lock poisoned".to_string()).into())
    }
}

impl Repository for MemoryRepository {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn insert_document(&self, document: &Document) -> Result<()> {
        let mut state = self.write()?;
        let duplicate = state.documents.values().any(|d| {
            d.tenant == document.tenant && d.content_hash == document.content_hash
        });
        if duplicate {
            return Err(StorageError::Database(format!(
                "unique constraint violated: (tenant, content_hash) for {}",
                document.content_hash
            ))
            .into());
        }
        state.documents.insert(document.id, document.clone());
        Ok(())
    }

    fn document(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Document>> {
        Ok(self
            .read()?
            .documents
            .get(&id)
            .filter(|d| &d.tenant == tenant)
            .cloned())
    }

    fn document_by_hash(&self, tenant: &TenantId, content_hash: &str) -> Result<Option<Document>> {
        Ok(self
            .read()?
            .documents
            .values()
            .find(|d| &d.tenant == tenant && d.content_hash == content_hash)
            .cloned())
    }

    fn list_documents(&self, tenant: &TenantId, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let state = self.read()?;
        let needle = filter.title_contains.as_ref().map(|t| t.to_lowercase());
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|d| &d.tenant == tenant)
            .filter(|d| {
                needle
                    .as_ref()
                    .is_none_or(|n| d.title.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if filter.limit > 0 {
            documents.truncate(filter.limit);
        }
        Ok(documents)
    }

    fn delete_document(&self, tenant: &TenantId, id: Uuid) -> Result<()> {
        let mut state = self.write()?;
        if state
            .documents
            .get(&id)
            .is_some_and(|d| &d.tenant == tenant)
        {
            state.documents.remove(&id);
            state.chunks.retain(|_, c| c.document_id != id);
        }
        Ok(())
    }

    fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let mut state = self.write()?;
        for chunk in chunks {
            state.chunks.insert(chunk.id, chunk.clone());
        }
        Ok(())
    }

    fn chunks_for_document(
        &self,
        tenant: &TenantId,
        document_id: Uuid,
    ) -> Result<Vec<DocumentChunk>> {
        let state = self.read()?;
        let mut chunks: Vec<DocumentChunk> = state
            .chunks
            .values()
            .filter(|c| c.document_id == document_id && &c.tenant == tenant)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.ordinal);
        Ok(chunks)
    }

    fn chunk_count(&self, tenant: &TenantId, document_id: Uuid) -> Result<usize> {
        Ok(self
            .read()?
            .chunks
            .values()
            .filter(|c| c.document_id == document_id && &c.tenant == tenant)
            .count())
    }

    fn insert_job(&self, job: &JobRecord) -> Result<()> {
        self.write()?.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn update_job(&self, job: &JobRecord) -> Result<()> {
        self.write()?.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn job(&self, id: Uuid) -> Result<Option<JobRecord>> {
        Ok(self.read()?.jobs.get(&id).cloned())
    }

    fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<JobRecord>> {
        Ok(self
            .read()?
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }

    fn list_jobs(&self, tenant: &TenantId) -> Result<Vec<JobRecord>> {
        let mut jobs: Vec<JobRecord> = self
            .read()?
            .jobs
            .values()
            .filter(|j| &j.tenant == tenant)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    fn record_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.write()?.audit.push(entry.clone());
        Ok(())
    }

    fn audit_log(&self, tenant: &TenantId, limit: usize) -> Result<Vec<AuditEntry>> {
        let state = self.read()?;
        let mut entries: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| &e.tenant == tenant)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    fn insert_eval_run(&self, run: &EvaluationRun) -> Result<()> {
        self.write()?.eval_runs.insert(run.id, run.clone());
        Ok(())
    }

    fn eval_run(&self, id: Uuid) -> Result<Option<EvaluationRun>> {
        Ok(self.read()?.eval_runs.get(&id).cloned())
    }
}

/// In-memory [`ObjectStore`].
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(TenantId, Uuid, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    /// Creates an empty object store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all tenants.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        tenant: &TenantId,
        document_id: Uuid,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| StorageError::Database("object store lock poisoned".to_string()))?
            .insert((tenant.clone(), document_id, filename.to_string()), bytes);
        Ok(())
    }

    async fn get(
        &self,
        tenant: &TenantId,
        document_id: Uuid,
        filename: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .read()
            .map_err(|_| StorageError::Database("object store lock poisoned".to_string()))?
            .get(&(tenant.clone(), document_id, filename.to_string()))
            .cloned())
    }

    async fn delete_document(&self, tenant: &TenantId, document_id: Uuid) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| StorageError::Database("object store lock poisoned".to_string()))?
            .retain(|(t, d, _), _| !(t == tenant && *d == document_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobKind;

    fn tenant() -> TenantId {
        TenantId::new("t1").unwrap()
    }

    #[test]
    fn test_document_hash_uniqueness() {
        let repo = MemoryRepository::new();
        let doc = Document::new(tenant(), "a.txt", "hash-1");
        repo.insert_document(&doc).unwrap();

        let dup = Document::new(tenant(), "b.txt", "hash-1");
        assert!(repo.insert_document(&dup).is_err());

        // Same hash under another tenant is fine.
        let other = Document::new(TenantId::new("t2").unwrap(), "c.txt", "hash-1");
        repo.insert_document(&other).unwrap();
    }

    #[test]
    fn test_document_tenant_scoping() {
        let repo = MemoryRepository::new();
        let doc = Document::new(tenant(), "a.txt", "h");
        repo.insert_document(&doc).unwrap();

        assert!(repo.document(&tenant(), doc.id).unwrap().is_some());
        let other = TenantId::new("t2").unwrap();
        assert!(repo.document(&other, doc.id).unwrap().is_none());
        assert!(repo.document_by_hash(&other, "h").unwrap().is_none());
    }

    #[test]
    fn test_delete_document_cascades_chunks() {
        let repo = MemoryRepository::new();
        let doc = Document::new(tenant(), "a.txt", "h");
        repo.insert_document(&doc).unwrap();
        let chunks = vec![
            DocumentChunk::new(doc.id, tenant(), 0, "one", 0, 3),
            DocumentChunk::new(doc.id, tenant(), 1, "two", 3, 6),
        ];
        repo.insert_chunks(&chunks).unwrap();
        assert_eq!(repo.chunk_count(&tenant(), doc.id).unwrap(), 2);

        repo.delete_document(&tenant(), doc.id).unwrap();
        assert_eq!(repo.chunk_count(&tenant(), doc.id).unwrap(), 0);
        assert!(repo.document(&tenant(), doc.id).unwrap().is_none());
    }

    #[test]
    fn test_chunks_returned_in_ordinal_order() {
        let repo = MemoryRepository::new();
        let doc = Document::new(tenant(), "a.txt", "h");
        repo.insert_document(&doc).unwrap();
        let chunks = vec![
            DocumentChunk::new(doc.id, tenant(), 2, "c", 8, 9),
            DocumentChunk::new(doc.id, tenant(), 0, "a", 0, 1),
            DocumentChunk::new(doc.id, tenant(), 1, "b", 4, 5),
        ];
        repo.insert_chunks(&chunks).unwrap();
        let fetched = repo.chunks_for_document(&tenant(), doc.id).unwrap();
        let ordinals: Vec<usize> = fetched.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn test_list_documents_filter_and_limit() {
        let repo = MemoryRepository::new();
        repo.insert_document(&Document::new(tenant(), "Alpha Report", "h1"))
            .unwrap();
        repo.insert_document(&Document::new(tenant(), "Beta Report", "h2"))
            .unwrap();
        repo.insert_document(&Document::new(tenant(), "Notes", "h3"))
            .unwrap();

        let filter = DocumentFilter {
            title_contains: Some("report".to_string()),
            limit: 0,
        };
        assert_eq!(repo.list_documents(&tenant(), &filter).unwrap().len(), 2);

        let filter = DocumentFilter {
            title_contains: None,
            limit: 1,
        };
        assert_eq!(repo.list_documents(&tenant(), &filter).unwrap().len(), 1);
    }

    #[test]
    fn test_job_round_trip() {
        let repo = MemoryRepository::new();
        let mut job = JobRecord::new(JobKind::Benchmark, tenant(), None);
        repo.insert_job(&job).unwrap();

        job.transition(JobStatus::Running).unwrap();
        repo.update_job(&job).unwrap();

        let fetched = repo.job(job.id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Running);
        assert_eq!(repo.jobs_with_status(JobStatus::Running).unwrap().len(), 1);
        assert_eq!(repo.list_jobs(&tenant()).unwrap().len(), 1);
    }

    #[test]
    fn test_audit_log_scoped_and_limited() {
        let repo = MemoryRepository::new();
        for i in 0..5 {
            repo.record_audit(&AuditEntry::new(
                tenant(),
                "index",
                None,
                format!("doc {i}"),
            ))
            .unwrap();
        }
        repo.record_audit(&AuditEntry::new(
            TenantId::new("t2").unwrap(),
            "index",
            None,
            "other tenant",
        ))
        .unwrap();

        let entries = repo.audit_log(&tenant(), 3).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.tenant == tenant()));
    }

    #[test]
    fn test_eval_run_round_trip() {
        use crate::eval::EvaluationRun;
        use chrono::Utc;
        use std::collections::BTreeMap;

        let repo = MemoryRepository::new();
        let run = EvaluationRun {
            id: Uuid::new_v4(),
            config_id: "dense".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            stats: BTreeMap::new(),
            composite: 0.3,
            notes: vec![],
            samples: vec![],
        };
        repo.insert_eval_run(&run).unwrap();
        assert_eq!(repo.eval_run_count(), 1);
        assert_eq!(
            repo.eval_run(run.id).unwrap().unwrap().config_id,
            "dense"
        );
    }

    #[tokio::test]
    async fn test_object_store_round_trip() {
        let store = MemoryObjectStore::new();
        let doc = Uuid::new_v4();
        store
            .put(&tenant(), doc, "a.txt", b"bytes".to_vec())
            .await
            .unwrap();
        assert_eq!(
            store.get(&tenant(), doc, "a.txt").await.unwrap().unwrap(),
            b"bytes"
        );
        assert!(
            store
                .get(&TenantId::new("t2").unwrap(), doc, "a.txt")
                .await
                .unwrap()
                .is_none()
        );

        store.delete_document(&tenant(), doc).await.unwrap();
        assert_eq!(store.object_count(), 0);
    }
}
