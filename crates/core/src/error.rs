use thiserror::Error;

pub type Result<T> = std::result::Result<T, DigestError>;

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("Cannot fetch state for an empty record batch")]
    EmptyBatch,

    /// An entity or rule belongs to a different owner than the one being
    /// digested. Aborts the build.
    #[error("{kind} {id} must belong to owner {expected}, found owner {actual}")]
    OwnershipViolation {
        kind: &'static str,
        id: u64,
        expected: u64,
        actual: u64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(f64),

    #[error("Backend error: {0}")]
    Backend(String),
}
