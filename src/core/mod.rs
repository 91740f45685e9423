//! Core domain types shared across the query, indexing, and evaluation
//! pipelines.

mod answer;
mod cancel;
mod document;
mod job;
mod retrieval;
mod tenant;

pub use answer::{
    Answer, ConfidenceLevel, HallucinationReport, SourceReference, TokenUsage, ValidationReport,
};
pub use cancel::CancelToken;
pub use document::{Document, DocumentChunk};
pub use job::{JobKind, JobRecord, JobStatus};
pub use retrieval::{FusionMethod, HybridConfig, QueryType, RetrievalOrigin, RetrievalResult, StrategyType};
pub use tenant::{RequestClaims, TenantContext, TenantId};
