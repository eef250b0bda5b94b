//! External collaborator interfaces.
//!
//! The engine consumes these but does not implement them; the surrounding
//! application wires in its identity service and wallet.

use async_trait::async_trait;
use uuid::Uuid;

/// Result type for collaborator calls.
pub type Result<T> = std::result::Result<T, CollaboratorError>;

/// Errors from external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Display/verification profile for a user.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub email_verified: bool,
}

/// Identity lookup, consumed when bootstrapping default aggregate rows.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, user_id: Uuid) -> Result<UserProfile>;
}

/// Spendable-balance credit, consumed only by referral redemption.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Atomically increase the user's spendable balance.
    ///
    /// `reference` is a caller-supplied idempotency key: a second credit
    /// with the same reference must be a no-op, which is what makes
    /// redemption safe to retry after a partial failure.
    async fn credit(&self, user_id: Uuid, amount: u64, reference: &str) -> Result<()>;
}
