//! Error taxonomy for the knowledge-graph tool server.
//!
//! Leaf crates return the narrow variant that names their failure mode;
//! `CoreError` composes them with `#[from]` the way a tool handler needs to,
//! and carries an `is_error` flag plus human message out to the agent.

use thiserror::Error;

/// Bad time range, missing required argument, unknown tool, malformed
/// schema.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("start_time cannot be after end_time")]
    StartAfterEnd,

    #[error("lookback_minutes must not exceed {max} (got {actual})")]
    LookbackTooLarge { max: u32, actual: u32 },

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("malformed schema: {0}")]
    MalformedSchema(String),

    #[error("{0}")]
    Other(String),
}

/// Refresh failed after retry, or the circuit breaker is open.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("refresh circuit open, retry after {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },

    #[error("no refresh token configured")]
    NoRefreshToken,

    #[error("token payload could not be decoded: {0}")]
    MalformedToken(String),
}

/// Non-2xx from the observability backend, other than 401/403 (those are
/// handled locally by the auth retry path and never surface here).
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend returned {status}: {body}")]
    NonSuccess { status: u16, body: String },

    #[error("backend request failed: {0}")]
    Request(String),
}

/// The pipeline recognized a format but no extractor matched, or a
/// plain-text template had no downstream mapping.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("no extractor matched this structured shape; parse the data yourself and resubmit as explicit nodes/edges")]
    NoExtractorMatched,

    #[error("template matched but unmapped")]
    TemplateUnmapped,

    #[error("tabular input has no built-in extractor; parse it yourself and resubmit as explicit nodes/edges")]
    TabularUnsupported,
}

/// Foreign-key violation, malformed JSON column, migration failure.
/// Non-recoverable at this layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("malformed JSON column {column}: {source}")]
    MalformedJson {
        column: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cannot redefine builtin schema: {0}")]
    ImmutableSchema(String),
}

/// Context was cancelled mid-operation; any in-flight transaction rolled
/// back.
#[derive(Error, Debug)]
#[error("operation cancelled")]
pub struct CancellationError;

/// The error type every tool handler ultimately returns. Handlers translate
/// this into a structured tool result with `is_error` set and a
/// human-readable message (spec: ValidationError/AuthError surfaced
/// verbatim, BackendError includes status+body, ExtractionError instructs
/// the agent to resubmit, StorageError/CancellationError surfaced as-is).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Cancelled(#[from] CancellationError),
}

impl CoreError {
    /// Whether the underlying failure is transient and may be retried
    /// locally (401/403 handled by the auth retry path, never as a
    /// `CoreError` in the first place — this only reports the permanent
    /// categories).
    pub fn is_retryable(&self) -> bool {
        false
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
pub type StorageResult<T> = Result<T, StorageError>;
pub type AuthResult<T> = Result<T, AuthError>;
