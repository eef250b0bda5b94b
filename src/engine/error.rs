//! Engine-level error taxonomy.

use crate::interfaces::{CollaboratorError, StorageError};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RewardError>;

/// Errors surfaced to engine callers.
///
/// Duplicate events are deliberately absent: an idempotency-key collision
/// is converted into a no-op success inside the handlers and reported via
/// the outcome structs, never as an error.
#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    /// A referenced entity is missing where that cannot be treated as a
    /// droppable stale event (explicit operations and queries).
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A state-machine or arithmetic invariant would be violated.
    /// Rejected synchronously, never partially applied.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Transient storage failure; the whole handler is safe to retry.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// External collaborator failure; the whole handler is safe to retry.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}
