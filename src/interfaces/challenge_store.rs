//! Challenge catalog and progress storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use super::ledger_store::Result;
use crate::domain::{ChallengeDefinition, ChallengeProgress};

/// Challenge definitions plus per-(user, challenge) progress rows.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Create or replace a catalog entry.
    async fn upsert_definition(&self, definition: ChallengeDefinition) -> Result<()>;

    async fn definition(&self, challenge_id: Uuid) -> Result<Option<ChallengeDefinition>>;

    /// All catalog entries; the engine applies the time-window test.
    async fn definitions(&self) -> Result<Vec<ChallengeDefinition>>;

    async fn progress(
        &self,
        user_id: Uuid,
        challenge_id: Uuid,
    ) -> Result<Option<ChallengeProgress>>;

    /// Create or replace a progress row.
    async fn put_progress(&self, progress: ChallengeProgress) -> Result<()>;

    async fn progress_for_user(&self, user_id: Uuid) -> Result<Vec<ChallengeProgress>>;
}
