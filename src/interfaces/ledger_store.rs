//! Ledger storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{LedgerEntry, RewardType};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Idempotency-key or primary-key collision. Handlers treat this as
    /// "the work already happened", never as a failure.
    #[error("Duplicate entry: {key}")]
    Duplicate { key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// A stored value failed to parse back into its domain type.
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether this error is the duplicate-key rejection.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StorageError::Duplicate { .. })
    }
}

/// Interface for the append-only reward ledger.
///
/// The `(user_id, reward_type, reference_id)` tuple is unique; `append`
/// must reject a second entry with the same tuple with
/// [`StorageError::Duplicate`], atomically with respect to concurrent
/// appends. That rejection is the engine's sole cross-process
/// idempotency mechanism.
///
/// Implementations:
/// - `SqliteStore`: SQLite storage (UNIQUE index)
/// - `MemoryStore`: In-memory storage for testing (keyed map)
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one entry. Entries are never mutated or deleted.
    async fn append(&self, entry: LedgerEntry) -> Result<()>;

    /// Look up an entry by its idempotency key.
    async fn find(
        &self,
        user_id: Uuid,
        reward_type: RewardType,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>>;

    /// Count a user's entries of one reward type.
    async fn count_by_type(&self, user_id: Uuid, reward_type: RewardType) -> Result<u64>;

    /// A page of a user's entries, newest first.
    async fn list_for_user(&self, user_id: Uuid, offset: u64, limit: u64)
        -> Result<Vec<LedgerEntry>>;

    /// Total number of entries for a user.
    async fn count_for_user(&self, user_id: Uuid) -> Result<u64>;
}
