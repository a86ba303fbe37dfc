use thiserror::Error;

/// Shared error vocabulary for every crate in the workspace, the way the
/// teacher's `ServerError`/`TypeError` are shared across its crate
/// boundaries rather than each crate minting its own sum type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("operation not permitted: database is read-only")]
    ReadOnly,

    #[error("operation not permitted: database is write-only")]
    WriteOnly,

    #[error("storage error (transient, retries exhausted): {0}")]
    StorageTransient(String),

    #[error("storage error (permanent): {0}")]
    StoragePermanent(String),

    #[error("embedding function failed: {0}")]
    EmbeddingFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation exceeded its {budget_ms}ms budget")]
    Timeout { budget_ms: u64 },
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Transient storage failures are the only kind the retry loop treats as
    /// retryable; everything else propagates immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageTransient(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
