//! `SQLite` repository implementation.
//!
//! Single-connection repository behind a mutex; calls are short and
//! never held across awaits, so contention stays negligible at this
//! tier. WAL mode keeps concurrent readers cheap.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit in usize/u64.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::core::{Document, DocumentChunk, JobKind, JobRecord, JobStatus, TenantId};
use crate::error::{Result, StorageError};
use crate::eval::EvaluationRun;
use crate::storage::schema::{CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL};
use crate::storage::{AuditEntry, DocumentFilter, Repository};

/// `SQLite`-backed [`Repository`].
///
/// # Examples
///
/// ```no_run
/// use ragpipe::storage::{Repository, SqliteRepository};
///
/// let repo = SqliteRepository::open("ragpipe.db").unwrap();
/// repo.init().unwrap();
/// ```
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteRepository {
    /// Opens or creates a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Database(e.to_string()))?;
        }

        let conn = Connection::open(&path).map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Creates an in-memory database (tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Returns the database path (`None` for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()).into())
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StorageError::Serialization(format!("bad timestamp {raw}: {e}")).into())
    }

    fn parse_uuid(raw: &str) -> Result<Uuid> {
        Uuid::parse_str(raw)
            .map_err(|e| StorageError::Serialization(format!("bad uuid {raw}: {e}")).into())
    }

    fn read_document(row: &Row<'_>) -> Result<Document> {
        let id: String = row.get(0).map_err(StorageError::from)?;
        let tenant: String = row.get(1).map_err(StorageError::from)?;
        let owner: Option<String> = row.get(2).map_err(StorageError::from)?;
        let title: String = row.get(3).map_err(StorageError::from)?;
        let source_uri: Option<String> = row.get(4).map_err(StorageError::from)?;
        let content_hash: String = row.get(5).map_err(StorageError::from)?;
        let created_at: String = row.get(6).map_err(StorageError::from)?;
        let updated_at: String = row.get(7).map_err(StorageError::from)?;
        let public: i64 = row.get(8).map_err(StorageError::from)?;

        Ok(Document {
            id: Self::parse_uuid(&id)?,
            tenant: TenantId::new(tenant)?,
            owner,
            title,
            source_uri,
            content_hash,
            created_at: Self::parse_timestamp(&created_at)?,
            updated_at: Self::parse_timestamp(&updated_at)?,
            public: public != 0,
        })
    }
}

const SELECT_DOCUMENT: &str = "SELECT id, tenant, owner, title, source_uri, content_hash, \
created_at, updated_at, public FROM documents";

impl Repository for SqliteRepository {
    fn init(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL).map_err(StorageError::from)?;
        let version: Option<String> = conn
            .query_row(GET_VERSION_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)?;
        if version.is_none() {
            conn.execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()])
                .map_err(StorageError::from)?;
        }
        Ok(())
    }

    fn insert_document(&self, document: &Document) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO documents (id, tenant, owner, title, source_uri, content_hash, \
                 created_at, updated_at, public) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    document.id.to_string(),
                    document.tenant.as_str(),
                    document.owner,
                    document.title,
                    document.source_uri,
                    document.content_hash,
                    document.created_at.to_rfc3339(),
                    document.updated_at.to_rfc3339(),
                    i64::from(document.public),
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn document(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Document>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_DOCUMENT} WHERE id = ?1 AND tenant = ?2"))
            .map_err(StorageError::from)?;
        let mut rows = stmt
            .query(params![id.to_string(), tenant.as_str()])
            .map_err(StorageError::from)?;
        match rows.next().map_err(StorageError::from)? {
            Some(row) => Ok(Some(Self::read_document(row)?)),
            None => Ok(None),
        }
    }

    fn document_by_hash(&self, tenant: &TenantId, content_hash: &str) -> Result<Option<Document>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_DOCUMENT} WHERE tenant = ?1 AND content_hash = ?2"
            ))
            .map_err(StorageError::from)?;
        let mut rows = stmt
            .query(params![tenant.as_str(), content_hash])
            .map_err(StorageError::from)?;
        match rows.next().map_err(StorageError::from)? {
            Some(row) => Ok(Some(Self::read_document(row)?)),
            None => Ok(None),
        }
    }

    fn list_documents(&self, tenant: &TenantId, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let conn = self.lock()?;
        let limit = if filter.limit == 0 {
            i64::MAX
        } else {
            filter.limit as i64
        };
        let needle = filter
            .title_contains
            .as_ref()
            .map_or_else(|| "%".to_string(), |t| format!("%{}%", t.to_lowercase()));
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_DOCUMENT} WHERE tenant = ?1 AND lower(title) LIKE ?2 \
                 ORDER BY created_at DESC LIMIT ?3"
            ))
            .map_err(StorageError::from)?;
        let mut rows = stmt
            .query(params![tenant.as_str(), needle, limit])
            .map_err(StorageError::from)?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next().map_err(StorageError::from)? {
            documents.push(Self::read_document(row)?);
        }
        Ok(documents)
    }

    fn delete_document(&self, tenant: &TenantId, id: Uuid) -> Result<()> {
        self.lock()?
            .execute(
                "DELETE FROM documents WHERE id = ?1 AND tenant = ?2",
                params![id.to_string(), tenant.as_str()],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StorageError::from)?;
        for chunk in chunks {
            let metadata = if chunk.metadata.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&chunk.metadata).map_err(StorageError::from)?)
            };
            tx.execute(
                "INSERT INTO chunks (id, document_id, tenant, ordinal, text, start_offset, \
                 end_offset, metadata) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    chunk.id.to_string(),
                    chunk.document_id.to_string(),
                    chunk.tenant.as_str(),
                    chunk.ordinal as i64,
                    chunk.text,
                    chunk.start_offset as i64,
                    chunk.end_offset as i64,
                    metadata,
                ],
            )
            .map_err(StorageError::from)?;
        }
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn chunks_for_document(
        &self,
        tenant: &TenantId,
        document_id: Uuid,
    ) -> Result<Vec<DocumentChunk>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, document_id, tenant, ordinal, text, start_offset, end_offset, \
                 metadata FROM chunks WHERE document_id = ?1 AND tenant = ?2 ORDER BY ordinal",
            )
            .map_err(StorageError::from)?;
        let mut rows = stmt
            .query(params![document_id.to_string(), tenant.as_str()])
            .map_err(StorageError::from)?;

        let mut chunks = Vec::new();
        while let Some(row) = rows.next().map_err(StorageError::from)? {
            let id: String = row.get(0).map_err(StorageError::from)?;
            let doc_id: String = row.get(1).map_err(StorageError::from)?;
            let tenant_raw: String = row.get(2).map_err(StorageError::from)?;
            let ordinal: i64 = row.get(3).map_err(StorageError::from)?;
            let text: String = row.get(4).map_err(StorageError::from)?;
            let start_offset: i64 = row.get(5).map_err(StorageError::from)?;
            let end_offset: i64 = row.get(6).map_err(StorageError::from)?;
            let metadata_raw: Option<String> = row.get(7).map_err(StorageError::from)?;
            let metadata: BTreeMap<String, String> = match metadata_raw {
                Some(raw) => serde_json::from_str(&raw).map_err(StorageError::from)?,
                None => BTreeMap::new(),
            };
            chunks.push(DocumentChunk {
                id: Self::parse_uuid(&id)?,
                document_id: Self::parse_uuid(&doc_id)?,
                tenant: TenantId::new(tenant_raw)?,
                ordinal: ordinal as usize,
                text,
                start_offset: start_offset as usize,
                end_offset: end_offset as usize,
                metadata,
            });
        }
        Ok(chunks)
    }

    fn chunk_count(&self, tenant: &TenantId, document_id: Uuid) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE document_id = ?1 AND tenant = ?2",
                params![document_id.to_string(), tenant.as_str()],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    fn insert_job(&self, job: &JobRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO jobs (id, kind, status, tenant, initiator, created_at, started_at, \
                 completed_at, estimated, processed, error) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    job.id.to_string(),
                    job.kind.as_str(),
                    job.status.as_str(),
                    job.tenant.as_str(),
                    job.initiator,
                    job.created_at.to_rfc3339(),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    job.estimated.map(|e| e as i64),
                    job.processed as i64,
                    job.error,
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn update_job(&self, job: &JobRecord) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE jobs SET status = ?2, started_at = ?3, completed_at = ?4, \
                 estimated = ?5, processed = ?6, error = ?7 WHERE id = ?1",
                params![
                    job.id.to_string(),
                    job.status.as_str(),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    job.estimated.map(|e| e as i64),
                    job.processed as i64,
                    job.error,
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn job(&self, id: Uuid) -> Result<Option<JobRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, kind, status, tenant, initiator, created_at, started_at, completed_at, \
             estimated, processed, error FROM jobs WHERE id = ?1",
            params![id.to_string()],
            job_from_row,
        )
        .optional()
        .map_err(StorageError::from)?
        .map(finish_job)
        .transpose()
    }

    fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<JobRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, kind, status, tenant, initiator, created_at, started_at, \
                 completed_at, estimated, processed, error FROM jobs WHERE status = ?1",
            )
            .map_err(StorageError::from)?;
        let raw: Vec<RawJob> = stmt
            .query_map(params![status.as_str()], job_from_row)
            .map_err(StorageError::from)?
            .collect::<rusqlite::Result<_>>()
            .map_err(StorageError::from)?;
        raw.into_iter().map(finish_job).collect()
    }

    fn list_jobs(&self, tenant: &TenantId) -> Result<Vec<JobRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, kind, status, tenant, initiator, created_at, started_at, \
                 completed_at, estimated, processed, error FROM jobs WHERE tenant = ?1 \
                 ORDER BY created_at DESC",
            )
            .map_err(StorageError::from)?;
        let raw: Vec<RawJob> = stmt
            .query_map(params![tenant.as_str()], job_from_row)
            .map_err(StorageError::from)?
            .collect::<rusqlite::Result<_>>()
            .map_err(StorageError::from)?;
        raw.into_iter().map(finish_job).collect()
    }

    fn record_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO audit_log (id, tenant, action, entity_id, detail, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.id.to_string(),
                    entry.tenant.as_str(),
                    entry.action,
                    entry.entity_id.map(|e| e.to_string()),
                    entry.detail,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn audit_log(&self, tenant: &TenantId, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, tenant, action, entity_id, detail, created_at FROM audit_log \
                 WHERE tenant = ?1 ORDER BY created_at DESC LIMIT ?2",
            )
            .map_err(StorageError::from)?;
        let raw: Vec<(String, String, String, Option<String>, String, String)> = stmt
            .query_map(params![tenant.as_str(), limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(StorageError::from)?
            .collect::<rusqlite::Result<_>>()
            .map_err(StorageError::from)?;

        raw.into_iter()
            .map(|(id, tenant_raw, action, entity_id, detail, created_at)| {
                Ok(AuditEntry {
                    id: Self::parse_uuid(&id)?,
                    tenant: TenantId::new(tenant_raw)?,
                    action,
                    entity_id: entity_id.as_deref().map(Self::parse_uuid).transpose()?,
                    detail,
                    created_at: Self::parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    fn insert_eval_run(&self, run: &EvaluationRun) -> Result<()> {
        let data = serde_json::to_string(run).map_err(StorageError::from)?;
        self.lock()?
            .execute(
                "INSERT INTO eval_runs (id, created_at, data) VALUES (?1, ?2, ?3)",
                params![run.id.to_string(), run.started_at.to_rfc3339(), data],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn eval_run(&self, id: Uuid) -> Result<Option<EvaluationRun>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM eval_runs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        data.map(|raw| serde_json::from_str(&raw).map_err(|e| StorageError::from(e).into()))
            .transpose()
    }
}

type RawJob = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
    i64,
    Option<String>,
);

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<RawJob> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

#[allow(clippy::cast_sign_loss)]
fn finish_job(raw: RawJob) -> Result<JobRecord> {
    let (id, kind, status, tenant, initiator, created_at, started_at, completed_at, estimated, processed, error) =
        raw;
    let parse_opt = |value: Option<String>| -> Result<Option<DateTime<Utc>>> {
        value
            .as_deref()
            .map(SqliteRepository::parse_timestamp)
            .transpose()
    };
    Ok(JobRecord {
        id: SqliteRepository::parse_uuid(&id)?,
        kind: JobKind::parse(&kind)
            .ok_or_else(|| StorageError::Serialization(format!("unknown job kind {kind}")))?,
        status: JobStatus::parse(&status)
            .ok_or_else(|| StorageError::Serialization(format!("unknown job status {status}")))?,
        tenant: TenantId::new(tenant)?,
        initiator,
        created_at: SqliteRepository::parse_timestamp(&created_at)?,
        started_at: parse_opt(started_at)?,
        completed_at: parse_opt(completed_at)?,
        estimated: estimated.map(|e| e as u64),
        processed: processed as u64,
        error,
    })
}
