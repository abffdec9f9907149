//! Error types shared by engines and clients.

use thiserror::Error;

use crate::etag::Etag;

/// Result type alias for command execution.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors surfaced by a [`DatabaseCommands`](crate::DatabaseCommands) engine
/// or an async client wrapping one.
///
/// Engine faults travel through clients unchanged; a client never retries or
/// reinterprets them.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("concurrency violation on '{key}': expected etag {expected}, found {}", display_actual(.actual))]
    ConcurrencyViolation {
        key: String,
        expected: Etag,
        actual: Option<Etag>,
    },

    /// The operation has no equivalent on this implementation.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("index already exists: {0}")]
    IndexExists(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("patch error: {0}")]
    Patch(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation canceled")]
    Canceled,

    #[error("worker failed: {0}")]
    Worker(String),
}

impl CommandError {
    /// True for faults raised because the implementation cannot perform the
    /// operation at all, as opposed to faults produced while performing it.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, CommandError::NotSupported(_))
    }

    pub fn is_concurrency_violation(&self) -> bool {
        matches!(self, CommandError::ConcurrencyViolation { .. })
    }
}

fn display_actual(actual: &Option<Etag>) -> String {
    match actual {
        Some(etag) => etag.to_string(),
        None => "no document".to_string(),
    }
}
