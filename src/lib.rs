//! # ragpipe
//!
//! Multi-tenant Retrieval-Augmented Generation core.
//!
//! Clients submit a natural-language question; the pipeline retrieves
//! passages from the tenant's corpus with lexical, dense, or hybrid
//! search, packs them into a token-budgeted context, invokes an LLM, and
//! returns a cited answer with validation and grounding reports.
//!
//! ## Pipelines
//!
//! - **Query** ([`pipeline::QueryPipeline`]): classify → retrieve →
//!   assemble → prompt → generate → validate/link/detect.
//! - **Indexing** ([`ingest::IndexingOrchestrator`]): extract → clean →
//!   chunk → embed → upsert, idempotent on content hash.
//! - **Evaluation** ([`eval::BenchmarkRunner`]): ground-truth scoring,
//!   paired t-test A/B comparison, CSV/JSON/Markdown reports.
//!
//! External collaborators (lexical index, vector index, embedding
//! service, LLM providers, relational and object stores) sit behind
//! traits; in-memory reference implementations back the tests and
//! single-node deployments.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod answer;
pub mod chunk;
pub mod classify;
pub mod clean;
pub mod config;
pub mod context;
pub mod core;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod jobs;
pub mod llm;
pub mod pipeline;
pub mod retrieve;
pub mod storage;
pub mod system;
pub mod template;

mod retry;
mod textutil;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorKind, PipelineStep, Result};

// Re-export core domain types
pub use self::core::{
    Answer, CancelToken, Document, DocumentChunk, HybridConfig, JobKind, JobRecord, JobStatus,
    QueryType, RetrievalResult, StrategyType, TenantContext, TenantId,
};

// Re-export configuration
pub use config::RagConfig;

// Re-export the pipeline entry points
pub use ingest::{IndexOutcome, IndexRequest, IndexingOrchestrator};
pub use pipeline::{AskOptions, QueryPipeline};
pub use system::{Collaborators, RagSystem};

// Re-export text utilities shared with the evaluation engine
pub use textutil::token_f1;
