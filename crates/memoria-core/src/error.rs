//! Shared error taxonomy
//!
//! Six categories per the error-handling design: validation, authorization,
//! security-policy, adapter failure, external-provider failure, and
//! cancellation. Adapter-specific errors convert into [`EngineError`] via
//! `#[from]` so callers at the engine boundary see one error type.

use thiserror::Error;

/// Top-level error returned by engine and worker operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input: empty content, negative importance, unknown layer,
    /// a tag with forbidden characters, content over the 50 KB bound.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Tenant mismatch on an existing record. Reported identically to
    /// `NotFound` to callers so record existence never leaks across tenants.
    #[error("not found")]
    AccessDenied,

    /// A classification rule was violated (e.g. restricted content routed
    /// into the episodic layer).
    #[error("Security Policy Violation: {0}")]
    SecurityPolicyViolation(String),

    /// The record, or tenant-scoped resource, does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A storage/vector/graph/cache adapter failed.
    #[error("adapter failure: {0}")]
    Adapter(#[from] StorageError),

    /// An embedding or LLM provider failed, timed out, or returned an
    /// unusable response.
    #[error("external provider failure: {0}")]
    ExternalProvider(String),

    /// The operation's deadline elapsed before it could complete.
    #[error("operation timed out")]
    Timeout,

    /// The operation was explicitly cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,

    /// Quota or rate limit exceeded (surfaced by the storage layer, not
    /// enforced by this crate — rate limiting itself is out of scope).
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Internal invariant violation not covered by the categories above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn security_policy(msg: impl Into<String>) -> Self {
        Self::SecurityPolicyViolation(msg.into())
    }

    /// True if this error represents a condition a caller should retry
    /// (timeouts and adapter hiccups), false for definitive failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Adapter(_) | Self::ExternalProvider(_))
    }
}

/// Error returned by storage, vector, graph, and cache adapters.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("initialization error: {0}")]
    Init(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Error returned by a search strategy. Strategy failures are isolated by
/// the fusion pipeline and converted to an empty result stream; this type
/// exists so strategies have something structured to log before that
/// conversion happens.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("strategy adapter failure: {0}")]
    Adapter(#[from] StorageError),

    #[error("embedding provider failure: {0}")]
    Embedding(String),

    #[error("strategy timed out")]
    Timeout,
}

/// Error surfaced by background maintenance workers. Workers never
/// propagate these to a caller; they log a structured record per tenant
/// and continue with the next tenant.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("llm provider failure: {0}")]
    Llm(String),

    #[error("worker disabled by configuration")]
    Disabled,
}

/// The engine facade drives workers directly (e.g. `consolidate`,
/// `generate_reflections`), so a [`WorkerError`] needs a path into
/// [`EngineError`] like every other adapter-adjacent failure.
impl From<WorkerError> for EngineError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Storage(e) => EngineError::Adapter(e),
            WorkerError::Llm(msg) => EngineError::ExternalProvider(msg),
            WorkerError::Disabled => EngineError::Internal("worker disabled by configuration".to_string()),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
