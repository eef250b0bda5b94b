//! Reward engine orchestrator.
//!
//! Consumes behavioral domain events and drives the aggregate updates in a
//! documented order: ledger + points, environmental impact, streak,
//! challenge progress, then badge evaluation. Each step is an independently
//! retryable idempotent write keyed off the same event reference, so a
//! crash mid-sequence resumes safely on redelivery instead of requiring a
//! distributed transaction.

mod badges;
mod challenge;
mod error;
mod events;
mod locks;
mod pickup;
mod queries;
mod referral;

pub use error::{Result, RewardError};
pub use events::{
    ChallengeCompleted, ChallengeOutcome, PickupCompleted, PickupOutcome, RedemptionSummary,
    ReferralCompleted, ReferralOutcome,
};
pub use queries::{
    ActivityPage, BadgeOverview, ChallengeOverview, ChallengeView, EarnedBadge, PointsOverview,
    ReferralOverview, ReferralStats,
};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RewardRules;
use crate::domain::{LedgerEntry, PointsAccount};
use crate::interfaces::{
    BadgeStore, ChallengeStore, CollaboratorError, ImpactStore, LedgerStore, PointsStore,
    ReferralStore, StreakStore, UserDirectory, WalletService,
};
use locks::UserLocks;

/// Storage handles the engine drives.
#[derive(Clone)]
pub struct EngineStores {
    pub ledger: Arc<dyn LedgerStore>,
    pub points: Arc<dyn PointsStore>,
    pub impact: Arc<dyn ImpactStore>,
    pub streaks: Arc<dyn StreakStore>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub badges: Arc<dyn BadgeStore>,
    pub referrals: Arc<dyn ReferralStore>,
}

/// The reward orchestrator.
///
/// Cheap to share behind an `Arc`; all state lives in the stores. Mutating
/// operations for one user are serialized through a per-user lock, and the
/// ledger's idempotency key backstops deduplication across processes.
pub struct RewardEngine {
    stores: EngineStores,
    users: Arc<dyn UserDirectory>,
    wallet: Arc<dyn WalletService>,
    rules: RewardRules,
    locks: UserLocks,
}

/// Whether a ledger append landed or collided with an earlier award.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Appended {
    New,
    Duplicate,
}

impl RewardEngine {
    pub fn new(
        stores: EngineStores,
        users: Arc<dyn UserDirectory>,
        wallet: Arc<dyn WalletService>,
        rules: RewardRules,
    ) -> Self {
        Self {
            stores,
            users,
            wallet,
            rules,
            locks: UserLocks::new(),
        }
    }

    pub fn rules(&self) -> &RewardRules {
        &self.rules
    }

    pub(crate) fn stores(&self) -> &EngineStores {
        &self.stores
    }

    pub(crate) fn wallet(&self) -> &Arc<dyn WalletService> {
        &self.wallet
    }

    pub(crate) async fn lock_user(&self, user_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        self.locks.acquire(user_id).await
    }

    /// Append an award entry, folding the duplicate-key rejection into a
    /// success signal. This is the engine's single dedup chokepoint.
    pub(crate) async fn append_award(&self, entry: LedgerEntry) -> Result<Appended> {
        let key = entry.dedup_key();
        match self.stores.ledger.append(entry).await {
            Ok(()) => Ok(Appended::New),
            Err(e) if e.is_duplicate() => {
                debug!(key = %key, "Award already recorded, skipping");
                Ok(Appended::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Confirm the event's subject exists in the identity service.
    ///
    /// Unknown users indicate a stale or malformed upstream event; the
    /// caller drops such events as logged no-ops. Collaborator outages
    /// propagate so the caller can retry.
    pub(crate) async fn verify_user(&self, user_id: Uuid) -> Result<bool> {
        match self.users.lookup(user_id).await {
            Ok(_) => Ok(true),
            Err(CollaboratorError::UserNotFound(_)) => {
                warn!(user = %user_id, "Unknown user, dropping event");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read-modify-write a non-negative point delta into the user's
    /// account; callers must hold the user's lock.
    pub(crate) async fn credit_points(
        &self,
        user_id: Uuid,
        delta: u64,
        now: DateTime<Utc>,
    ) -> Result<PointsAccount> {
        let account = match self.stores.points.get(user_id).await? {
            Some(account) => account,
            None => PointsAccount::new(user_id, &self.rules, now),
        };
        let next = account.credit(delta, &self.rules, now);
        self.stores.points.put(next.clone()).await?;
        info!(
            user = %user_id,
            points = delta,
            total = next.total_points,
            level = next.current_level,
            "Points credited"
        );
        Ok(next)
    }
}
