//! Error types for ragpipe operations.
//!
//! This module provides the error hierarchy for the query, indexing, and
//! evaluation pipelines using `thiserror`, plus the transport-independent
//! [`ErrorKind`] taxonomy that callers use to map failures onto their own
//! surfaces.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for ragpipe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline steps used to tag where a query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    /// Query intent classification.
    Classify,
    /// Retrieval (any strategy).
    Retrieve,
    /// Context assembly under the token budget.
    Assemble,
    /// Prompt template rendering.
    Prompt,
    /// LLM generation.
    Generate,
    /// Response validation, source linking, hallucination detection.
    Validate,
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Classify => "classify",
            Self::Retrieve => "retrieve",
            Self::Assemble => "assemble",
            Self::Prompt => "prompt",
            Self::Generate => "generate",
            Self::Validate => "validate",
        };
        f.write_str(tag)
    }
}

/// Transport-independent error classification.
///
/// Every [`Error`] maps onto exactly one kind; outer layers (HTTP, queue
/// consumers) translate kinds rather than matching the full error tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Client bug: empty query, out-of-range parameter, malformed override.
    InvalidInput,
    /// Request lacks or cannot resolve a tenant.
    TenantMissing,
    /// Referenced document/job not found for the tenant.
    NotFound,
    /// Informational: duplicate content hash on the indexing path.
    AlreadyIndexed,
    /// Prompt rendering referenced an unbound variable.
    TemplateVariableMissing,
    /// Prompt rendering received an undeclared variable.
    UnknownVariable,
    /// Downstream service failed after the retry budget.
    ExternalUnavailable,
    /// LLM provider transport failure.
    ProviderUnavailable,
    /// LLM provider quota exhausted.
    QuotaExceeded,
    /// Prompt exceeded the provider context window.
    ContextTooLong,
    /// Provider-side content filter rejected the request.
    ContentFiltered,
    /// Embedding count/dimension mismatch.
    ResponseShapeMismatch,
    /// Caller-initiated cancellation.
    Cancelled,
    /// Unexpected internal failure.
    Internal,
}

/// Errors produced by the ragpipe core.
#[derive(Error, Debug)]
pub enum Error {
    /// Client bug (empty query, out-of-range top_k, malformed override).
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the invalid input.
        message: String,
    },

    /// Request lacks or cannot resolve a tenant.
    #[error("request carries no resolvable tenant")]
    TenantMissing,

    /// Referenced entity not found for the tenant.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity class ("document", "job", ...).
        entity: &'static str,
        /// Identifier that was not found.
        id: String,
    },

    /// Duplicate content hash on the indexing path.
    #[error("content already indexed as document {document_id}")]
    AlreadyIndexed {
        /// The existing document the upload resolved to.
        document_id: Uuid,
    },

    /// Caller-initiated cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Embedding client errors.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Prompt template errors.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// LLM gateway errors.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Lexical/vector/object store gateway errors.
    #[error("external service error: {0}")]
    External(#[from] ExternalError),

    /// Relational store errors.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Evaluation engine errors.
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// Background job errors.
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// A query pipeline step failed; wraps the underlying error.
    #[error("step {step} failed: {source}")]
    Step {
        /// Pipeline step that failed.
        step: PipelineStep,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Unexpected internal failure.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

/// Embedding-client errors (count/shape contract and transport).
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Empty input batch.
    #[error("embedding batch is empty")]
    EmptyBatch,

    /// Batch exceeds the configured maximum.
    #[error("embedding batch of {size} exceeds maximum {max}")]
    BatchTooLarge {
        /// Submitted batch size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Service returned a different number of vectors than texts sent.
    #[error("embedding count mismatch: sent {sent}, received {received}")]
    CountMismatch {
        /// Texts sent.
        sent: usize,
        /// Vectors received.
        received: usize,
    },

    /// Vector dimension differs from the configured embedding dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Received dimension.
        actual: usize,
    },

    /// Service unreachable after the retry budget.
    #[error("embedding service unavailable: {reason}")]
    Unavailable {
        /// Last transport failure.
        reason: String,
    },
}

/// Prompt template loading and rendering errors.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Render was missing a declared variable.
    #[error("template variable missing: {name}")]
    VariableMissing {
        /// Variable name.
        name: String,
    },

    /// Render received a variable the template does not declare.
    #[error("unknown template variable: {name}")]
    UnknownVariable {
        /// Variable name.
        name: String,
    },

    /// No template with the requested name (and version, if pinned).
    #[error("template not found: {name} (version {version})")]
    NotFound {
        /// Template name.
        name: String,
        /// Requested version, or "latest".
        version: String,
    },

    /// Two templates in the directory share `(name, version)`.
    #[error("duplicate template: {name} v{version}")]
    Duplicate {
        /// Template name.
        name: String,
        /// Duplicated version.
        version: u32,
    },

    /// System/user text references a variable the template never declares.
    #[error("template {name} v{version} references undeclared variable: {variable}")]
    UndeclaredVariable {
        /// Template name.
        name: String,
        /// Template version.
        version: u32,
        /// Offending variable.
        variable: String,
    },

    /// Template file could not be read or parsed.
    #[error("failed to load template {path}: {reason}")]
    Load {
        /// File path.
        path: String,
        /// Parse or I/O failure.
        reason: String,
    },
}

/// LLM gateway errors.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Provider transport failure after the retry budget.
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        /// Provider name.
        provider: String,
        /// Last transport failure.
        reason: String,
    },

    /// Provider quota exhausted; not retried.
    #[error("provider {provider} quota exceeded")]
    QuotaExceeded {
        /// Provider name.
        provider: String,
    },

    /// Prompt exceeded the provider context window; not retried.
    #[error("prompt of {prompt_tokens} tokens exceeds context window {limit}")]
    ContextTooLong {
        /// Estimated prompt tokens.
        prompt_tokens: usize,
        /// Provider context limit.
        limit: usize,
    },

    /// Provider-side content filter rejected the request; not retried.
    #[error("provider {provider} filtered the request: {reason}")]
    ContentFiltered {
        /// Provider name.
        provider: String,
        /// Filter category or message.
        reason: String,
    },

    /// Gateway has no provider registered under this name.
    #[error("unknown provider: {name}")]
    UnknownProvider {
        /// Requested provider name.
        name: String,
    },

    /// Provider returned a payload the gateway could not interpret.
    #[error("malformed provider response: {reason}")]
    MalformedResponse {
        /// Parse failure detail.
        reason: String,
    },
}

/// Lexical index, vector index, and object store gateway errors.
#[derive(Error, Debug)]
pub enum ExternalError {
    /// Lexical index unreachable after retry budget.
    #[error("lexical index unavailable: {reason}")]
    LexicalUnavailable {
        /// Last failure.
        reason: String,
    },

    /// Vector index unreachable after retry budget.
    #[error("vector index unavailable: {reason}")]
    VectorUnavailable {
        /// Last failure.
        reason: String,
    },

    /// Vector upsert carried a wrong-dimension vector.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    VectorDimension {
        /// Collection dimension.
        expected: usize,
        /// Submitted dimension.
        actual: usize,
    },

    /// Object store unreachable.
    #[error("object store unavailable: {reason}")]
    ObjectStoreUnavailable {
        /// Last failure.
        reason: String,
    },

    /// An operation overran its configured deadline.
    #[error("{operation} timed out after {millis}ms")]
    Timeout {
        /// Operation description.
        operation: &'static str,
        /// Deadline in milliseconds.
        millis: u64,
    },
}

/// Relational store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Evaluation engine errors.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Dataset file could not be read or parsed.
    #[error("failed to load dataset {path}: {reason}")]
    Dataset {
        /// File path.
        path: String,
        /// Failure detail.
        reason: String,
    },

    /// Dataset contains no usable samples.
    #[error("dataset is empty")]
    EmptyDataset,

    /// A/B comparison requires equal-length paired samples.
    #[error("paired comparison length mismatch: {left} vs {right}")]
    PairLengthMismatch {
        /// Samples in the first run.
        left: usize,
        /// Samples in the second run.
        right: usize,
    },

    /// Report serialization failure.
    #[error("report export failed: {reason}")]
    Export {
        /// Failure detail.
        reason: String,
    },
}

/// Background job errors.
#[derive(Error, Debug)]
pub enum JobError {
    /// No job with this id for the tenant.
    #[error("job not found: {id}")]
    NotFound {
        /// Job id.
        id: Uuid,
    },

    /// Status transitions are forward-only.
    #[error("illegal job transition: {from} -> {to}")]
    IllegalTransition {
        /// Current status.
        from: String,
        /// Rejected target status.
        to: String,
    },

    /// The queue consumer has shut down.
    #[error("job queue closed")]
    QueueClosed,
}

impl Error {
    /// Shorthand for [`Error::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wraps this error with the pipeline step that produced it.
    ///
    /// Already-tagged errors keep their original step: the first failure
    /// point is the interesting one.
    #[must_use]
    pub fn at_step(self, step: PipelineStep) -> Self {
        match self {
            Self::Step { .. } => self,
            other => Self::Step {
                step,
                source: Box::new(other),
            },
        }
    }

    /// Returns the step tag, if this error was tagged by the orchestrator.
    #[must_use]
    pub const fn step(&self) -> Option<PipelineStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Maps this error onto the transport-independent taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::TenantMissing => ErrorKind::TenantMissing,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyIndexed { .. } => ErrorKind::AlreadyIndexed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Embedding(e) => match e {
                EmbeddingError::EmptyBatch | EmbeddingError::BatchTooLarge { .. } => {
                    ErrorKind::InvalidInput
                }
                EmbeddingError::CountMismatch { .. } | EmbeddingError::DimensionMismatch { .. } => {
                    ErrorKind::ResponseShapeMismatch
                }
                EmbeddingError::Unavailable { .. } => ErrorKind::ExternalUnavailable,
            },
            Self::Template(e) => match e {
                TemplateError::VariableMissing { .. } => ErrorKind::TemplateVariableMissing,
                TemplateError::UnknownVariable { .. } => ErrorKind::UnknownVariable,
                TemplateError::NotFound { .. } => ErrorKind::NotFound,
                TemplateError::Duplicate { .. }
                | TemplateError::UndeclaredVariable { .. }
                | TemplateError::Load { .. } => ErrorKind::Internal,
            },
            Self::Llm(e) => match e {
                LlmError::ProviderUnavailable { .. } | LlmError::MalformedResponse { .. } => {
                    ErrorKind::ProviderUnavailable
                }
                LlmError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
                LlmError::ContextTooLong { .. } => ErrorKind::ContextTooLong,
                LlmError::ContentFiltered { .. } => ErrorKind::ContentFiltered,
                LlmError::UnknownProvider { .. } => ErrorKind::InvalidInput,
            },
            Self::External(e) => match e {
                ExternalError::VectorDimension { .. } => ErrorKind::ResponseShapeMismatch,
                _ => ErrorKind::ExternalUnavailable,
            },
            Self::Storage(_) => ErrorKind::ExternalUnavailable,
            Self::Eval(e) => match e {
                EvalError::Dataset { .. }
                | EvalError::EmptyDataset
                | EvalError::PairLengthMismatch { .. } => ErrorKind::InvalidInput,
                EvalError::Export { .. } => ErrorKind::Internal,
            },
            Self::Job(e) => match e {
                JobError::NotFound { .. } => ErrorKind::NotFound,
                JobError::IllegalTransition { .. } | JobError::QueueClosed => ErrorKind::Internal,
            },
            Self::Step { source, .. } => source.kind(),
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
