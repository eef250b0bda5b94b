//! Referral storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use super::ledger_store::Result;
use crate::domain::ReferralReward;

/// Referral rows, at most one per referred user.
#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Insert a new referral. A second row for the same referred user must
    /// fail with [`super::StorageError::Duplicate`].
    async fn insert(&self, referral: ReferralReward) -> Result<()>;

    async fn find_by_referred(&self, referred_user_id: Uuid) -> Result<Option<ReferralReward>>;

    async fn list_for_referrer(&self, referrer_user_id: Uuid) -> Result<Vec<ReferralReward>>;

    /// Replace an existing row (keyed by id).
    async fn put(&self, referral: ReferralReward) -> Result<()>;

    /// Atomically flip every COMPLETED referral of this referrer to
    /// REDEEMED and return the flipped rows. All-or-nothing: a failure
    /// leaves every row untouched.
    async fn redeem_completed(&self, referrer_user_id: Uuid) -> Result<Vec<ReferralReward>>;
}
