//! Indexing orchestrator.
//!
//! Drives upload bytes through extract → clean → chunk → embed → upsert.
//! Idempotency hangs on the content hash: identical bytes for the same
//! tenant resolve to the existing document. Cross-store writes are not
//! transactional; partial failure triggers compensating deletes in
//! reverse order, and a full rebuild remains the recovery tool of last
//! resort.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::chunk::SlidingWindowChunker;
use crate::clean::CleaningPipeline;
use crate::config::RagConfig;
use crate::core::{CancelToken, Document, DocumentChunk, TenantId};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::extract::ExtractorRegistry;
use crate::index::{LexicalIndex, VectorIndex, VectorPayload};
use crate::storage::{AuditEntry, ObjectStore, Repository};

/// Outcome of an indexing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The document was extracted, chunked, embedded, and persisted.
    Indexed {
        /// New document id.
        document_id: Uuid,
        /// Number of chunks produced.
        chunks: usize,
    },
    /// Identical bytes were already indexed for this tenant.
    AlreadyIndexed {
        /// The existing document.
        document_id: Uuid,
    },
}

/// An upload to index.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    /// Filename, used for format dispatch and as the default title.
    pub filename: String,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
    /// Optional explicit title.
    pub title: Option<String>,
    /// Uploading principal.
    pub owner: Option<String>,
    /// Source URI for fetched documents.
    pub source_uri: Option<String>,
    /// Tenant-wide readability flag.
    pub public: bool,
}

impl IndexRequest {
    /// Creates a request with just a filename and bytes.
    #[must_use]
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            title: None,
            owner: None,
            source_uri: None,
            public: false,
        }
    }
}

/// Extract → clean → chunk → embed → upsert pipeline.
pub struct IndexingOrchestrator {
    repository: Arc<dyn Repository>,
    object_store: Arc<dyn ObjectStore>,
    lexical: Arc<dyn LexicalIndex>,
    vector: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    extractors: Arc<ExtractorRegistry>,
    cleaner: Arc<CleaningPipeline>,
    chunker: SlidingWindowChunker,
    workers: Arc<Semaphore>,
}

impl IndexingOrchestrator {
    /// Wires the pipeline from its collaborators and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for inconsistent chunking
    /// configuration.
    pub fn new(
        repository: Arc<dyn Repository>,
        object_store: Arc<dyn ObjectStore>,
        lexical: Arc<dyn LexicalIndex>,
        vector: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: &RagConfig,
    ) -> Result<Self> {
        Ok(Self {
            repository,
            object_store,
            lexical,
            vector,
            embedder,
            extractors: Arc::new(ExtractorRegistry::new()),
            cleaner: Arc::new(CleaningPipeline::standard()),
            chunker: SlidingWindowChunker::new(&config.chunking)?,
            workers: Arc::new(Semaphore::new(config.indexing.effective_parallelism())),
        })
    }

    /// Hex SHA-256 of raw bytes.
    #[must_use]
    pub fn content_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Indexes one document end to end.
    ///
    /// Multiple documents may index in parallel, bounded by the
    /// configured worker pool; each document runs its stages
    /// sequentially.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on empty uploads or unsupported formats;
    /// `ExternalUnavailable` when a store write fails after compensation;
    /// `Cancelled` when the token fires between stages.
    pub async fn index_document(
        &self,
        tenant: &TenantId,
        request: IndexRequest,
        cancel: &CancelToken,
    ) -> Result<IndexOutcome> {
        if request.bytes.is_empty() {
            return Err(Error::invalid_input("upload is empty"));
        }

        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|e| Error::internal(format!("worker pool closed: {e}")))?;
        cancel.check()?;

        // Hash before any parsing so duplicate uploads short-circuit
        // cheaply.
        let content_hash = Self::content_hash(&request.bytes);
        if let Some(existing) = self.repository.document_by_hash(tenant, &content_hash)? {
            tracing::debug!(
                document_id = %existing.id,
                "duplicate content hash, skipping"
            );
            return Ok(IndexOutcome::AlreadyIndexed {
                document_id: existing.id,
            });
        }

        // Extract and clean off the async thread; PDF parsing can be
        // CPU-heavy.
        let extractors = Arc::clone(&self.extractors);
        let cleaner = Arc::clone(&self.cleaner);
        let filename = request.filename.clone();
        let bytes = request.bytes.clone();
        let cleaned = tokio::task::spawn_blocking(move || {
            let raw = extractors.extract(&filename, &bytes)?;
            Ok::<String, Error>(cleaner.clean(&raw))
        })
        .await
        .map_err(|e| Error::internal(format!("extraction task failed: {e}")))??;
        cancel.check()?;

        let mut document = Document::new(
            tenant.clone(),
            request.title.clone().unwrap_or_else(|| request.filename.clone()),
            content_hash,
        );
        document.owner = request.owner.clone();
        document.source_uri = request.source_uri.clone();
        document.public = request.public;

        let chunks = self.chunker.chunk(document.id, tenant, &cleaned)?;
        if chunks.is_empty() {
            return Err(Error::invalid_input(
                "document contains no extractable text",
            ));
        }

        let vectors = self.embed_chunks(&chunks, cancel).await?;
        cancel.check()?;

        self.upsert_all(&document, &chunks, vectors, &request, cancel)
            .await?;

        self.repository.record_audit(&AuditEntry::new(
            tenant.clone(),
            "index",
            Some(document.id),
            format!(
                "indexed {} ({}, {} chunks)",
                request.filename,
                crate::storage::content_type_for(&request.filename),
                chunks.len()
            ),
        ))?;
        tracing::info!(
            document_id = %document.id,
            chunks = chunks.len(),
            "document indexed"
        );

        Ok(IndexOutcome::Indexed {
            document_id: document.id,
            chunks: chunks.len(),
        })
    }

    /// Embeds chunk texts in batches bounded by the embedder's limit.
    async fn embed_chunks(
        &self,
        chunks: &[DocumentChunk],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.embedder.max_batch_size().max(1);
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            vectors.extend(self.embedder.embed(&texts, cancel).await?);
        }
        Ok(vectors)
    }

    /// Upserts into lexical, vector, relational, and object stores in
    /// that order, compensating earlier writes when a later one fails.
    async fn upsert_all(
        &self,
        document: &Document,
        chunks: &[DocumentChunk],
        vectors: Vec<Vec<f32>>,
        request: &IndexRequest,
        cancel: &CancelToken,
    ) -> Result<()> {
        let tenant = &document.tenant;
        self.lexical.ensure_index(tenant).await?;
        self.vector.ensure_collection(tenant).await?;
        cancel.check()?;

        self.lexical.bulk_upsert(chunks).await?;

        let points: Vec<(Uuid, Vec<f32>, VectorPayload)> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                (
                    chunk.id,
                    vector,
                    VectorPayload {
                        tenant: tenant.clone(),
                        document_id: chunk.document_id,
                        text: chunk.text.clone(),
                    },
                )
            })
            .collect();
        if let Err(e) = self.vector.bulk_upsert(points).await {
            tracing::warn!(error = %e, "vector upsert failed, rolling back lexical");
            let _ = self.lexical.delete_document(document.id, tenant).await;
            return Err(e);
        }

        if let Err(e) = self
            .repository
            .insert_document(document)
            .and_then(|()| self.repository.insert_chunks(chunks))
        {
            tracing::warn!(error = %e, "relational write failed, rolling back indexes");
            let _ = self.vector.delete_document_vectors(document.id, tenant).await;
            let _ = self.lexical.delete_document(document.id, tenant).await;
            let _ = self.repository.delete_document(tenant, document.id);
            return Err(e);
        }

        if let Err(e) = self
            .object_store
            .put(
                tenant,
                document.id,
                &request.filename,
                request.bytes.clone(),
            )
            .await
        {
            tracing::warn!(error = %e, "object store write failed, rolling back");
            let _ = self.repository.delete_document(tenant, document.id);
            let _ = self.vector.delete_document_vectors(document.id, tenant).await;
            let _ = self.lexical.delete_document(document.id, tenant).await;
            return Err(e);
        }

        Ok(())
    }

    /// Deletes a document from every store, inverse order of indexing.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the document does not exist for the
    /// tenant.
    pub async fn delete_document(
        &self,
        tenant: &TenantId,
        document_id: Uuid,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check()?;
        let Some(document) = self.repository.document(tenant, document_id)? else {
            return Err(Error::NotFound {
                entity: "document",
                id: document_id.to_string(),
            });
        };

        self.object_store.delete_document(tenant, document_id).await?;
        self.repository.delete_document(tenant, document_id)?;
        self.vector
            .delete_document_vectors(document_id, tenant)
            .await?;
        self.lexical.delete_document(document_id, tenant).await?;

        self.repository.record_audit(&AuditEntry::new(
            tenant.clone(),
            "delete",
            Some(document_id),
            format!("deleted {}", document.title),
        ))?;
        Ok(())
    }

    /// Re-embeds and re-upserts one document's chunks from the
    /// relational store into the lexical and vector indexes. Used by the
    /// rebuild job; returns the chunk count.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown documents; store errors otherwise.
    pub async fn reindex_document(
        &self,
        tenant: &TenantId,
        document_id: Uuid,
        cancel: &CancelToken,
    ) -> Result<usize> {
        cancel.check()?;
        if self.repository.document(tenant, document_id)?.is_none() {
            return Err(Error::NotFound {
                entity: "document",
                id: document_id.to_string(),
            });
        }
        let chunks = self.repository.chunks_for_document(tenant, document_id)?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let vectors = self.embed_chunks(&chunks, cancel).await?;
        self.lexical.ensure_index(tenant).await?;
        self.vector.ensure_collection(tenant).await?;
        self.lexical.bulk_upsert(&chunks).await?;
        let points: Vec<(Uuid, Vec<f32>, VectorPayload)> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                (
                    chunk.id,
                    vector,
                    VectorPayload {
                        tenant: tenant.clone(),
                        document_id,
                        text: chunk.text.clone(),
                    },
                )
            })
            .collect();
        self.vector.bulk_upsert(points).await?;
        Ok(chunks.len())
    }
}
