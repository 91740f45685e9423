//! Database schema definitions.
//!
//! SQL schema and migration plumbing for the `SQLite` repository.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for initial database setup.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Indexed documents
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    tenant TEXT NOT NULL,
    owner TEXT,
    title TEXT NOT NULL,
    source_uri TEXT,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    public INTEGER NOT NULL DEFAULT 0,
    UNIQUE (tenant, content_hash)
);

-- Index for tenant listings
CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant, created_at);

-- Document chunks (text and offsets; vectors live in the vector index)
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    tenant TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    text TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL,
    metadata TEXT,  -- JSON map
    UNIQUE (document_id, ordinal),
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
);

-- Index for chunk retrieval in ordinal order
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, ordinal);

-- Background jobs
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    tenant TEXT NOT NULL,
    initiator TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    estimated INTEGER,
    processed INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

-- Index for recovery scans and tenant listings
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_tenant ON jobs(tenant, created_at);

-- Audit log
CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    tenant TEXT NOT NULL,
    action TEXT NOT NULL,
    entity_id TEXT,
    detail TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_tenant ON audit_log(tenant, created_at);

-- Evaluation runs (full run serialized as JSON)
CREATE TABLE IF NOT EXISTS eval_runs (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    data TEXT NOT NULL
);
";

/// SQL to get schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to set schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT INTO schema_info (key, value) VALUES ('version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value;
";
