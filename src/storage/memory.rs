//! In-memory implementation of the storage interfaces.
//!
//! Used for tests and standalone mode. Uniqueness checks happen under the
//! write lock, so the duplicate-rejection guarantees match the SQLite
//! backend's UNIQUE indexes. The `set_fail_on_*` switches let tests
//! exercise retry-after-partial-failure paths.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Badge, ChallengeDefinition, ChallengeProgress, EnvironmentalImpact, LedgerEntry,
    PointsAccount, ReferralReward, ReferralStatus, RewardType, Streak, UserBadge,
};
use crate::engine::EngineStores;
use crate::interfaces::{
    BadgeStore, ChallengeStore, ImpactStore, LedgerStore, PointsStore, ReferralStore, Result,
    StorageError, StreakStore,
};

/// In-memory store implementing every engine interface.
#[derive(Default)]
pub struct MemoryStore {
    ledger: RwLock<HashMap<(Uuid, RewardType, String), LedgerEntry>>,
    points: RwLock<HashMap<Uuid, PointsAccount>>,
    impact: RwLock<HashMap<Uuid, EnvironmentalImpact>>,
    streaks: RwLock<HashMap<Uuid, Streak>>,
    challenge_definitions: RwLock<HashMap<Uuid, ChallengeDefinition>>,
    challenge_progress: RwLock<HashMap<(Uuid, Uuid), ChallengeProgress>>,
    badges: RwLock<HashMap<Uuid, Badge>>,
    user_badges: RwLock<HashMap<(Uuid, Uuid), UserBadge>>,
    /// Keyed by referred user id, the unique column.
    referrals: RwLock<HashMap<Uuid, ReferralReward>>,
    fail_on_write: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle this store into engine handles.
    pub fn stores(self: &Arc<Self>) -> EngineStores {
        EngineStores {
            ledger: Arc::clone(self) as Arc<dyn LedgerStore>,
            points: Arc::clone(self) as Arc<dyn PointsStore>,
            impact: Arc::clone(self) as Arc<dyn ImpactStore>,
            streaks: Arc::clone(self) as Arc<dyn StreakStore>,
            challenges: Arc::clone(self) as Arc<dyn ChallengeStore>,
            badges: Arc::clone(self) as Arc<dyn BadgeStore>,
            referrals: Arc::clone(self) as Arc<dyn ReferralStore>,
        }
    }

    /// Make every subsequent write fail with `Unavailable`.
    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Make every subsequent read fail with `Unavailable`.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable("write failure injected".to_string()));
        }
        Ok(())
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Unavailable("read failure injected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append(&self, entry: LedgerEntry) -> Result<()> {
        self.check_write().await?;
        let key = (entry.user_id, entry.reward_type, entry.reference_id.clone());
        let mut ledger = self.ledger.write().await;
        if ledger.contains_key(&key) {
            return Err(StorageError::Duplicate {
                key: entry.dedup_key(),
            });
        }
        ledger.insert(key, entry);
        Ok(())
    }

    async fn find(
        &self,
        user_id: Uuid,
        reward_type: RewardType,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>> {
        self.check_read().await?;
        let ledger = self.ledger.read().await;
        Ok(ledger
            .get(&(user_id, reward_type, reference_id.to_string()))
            .cloned())
    }

    async fn count_by_type(&self, user_id: Uuid, reward_type: RewardType) -> Result<u64> {
        self.check_read().await?;
        let ledger = self.ledger.read().await;
        Ok(ledger
            .keys()
            .filter(|(u, t, _)| *u == user_id && *t == reward_type)
            .count() as u64)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LedgerEntry>> {
        self.check_read().await?;
        let ledger = self.ledger.read().await;
        let mut entries: Vec<LedgerEntry> = ledger
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<u64> {
        self.check_read().await?;
        let ledger = self.ledger.read().await;
        Ok(ledger.keys().filter(|(u, _, _)| *u == user_id).count() as u64)
    }
}

#[async_trait]
impl PointsStore for MemoryStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<PointsAccount>> {
        self.check_read().await?;
        Ok(self.points.read().await.get(&user_id).cloned())
    }

    async fn put(&self, account: PointsAccount) -> Result<()> {
        self.check_write().await?;
        self.points.write().await.insert(account.user_id, account);
        Ok(())
    }
}

#[async_trait]
impl ImpactStore for MemoryStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<EnvironmentalImpact>> {
        self.check_read().await?;
        Ok(self.impact.read().await.get(&user_id).cloned())
    }

    async fn put(&self, impact: EnvironmentalImpact) -> Result<()> {
        self.check_write().await?;
        self.impact.write().await.insert(impact.user_id, impact);
        Ok(())
    }
}

#[async_trait]
impl StreakStore for MemoryStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<Streak>> {
        self.check_read().await?;
        Ok(self.streaks.read().await.get(&user_id).cloned())
    }

    async fn put(&self, streak: Streak) -> Result<()> {
        self.check_write().await?;
        self.streaks.write().await.insert(streak.user_id, streak);
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn upsert_definition(&self, definition: ChallengeDefinition) -> Result<()> {
        self.check_write().await?;
        self.challenge_definitions
            .write()
            .await
            .insert(definition.challenge_id, definition);
        Ok(())
    }

    async fn definition(&self, challenge_id: Uuid) -> Result<Option<ChallengeDefinition>> {
        self.check_read().await?;
        Ok(self
            .challenge_definitions
            .read()
            .await
            .get(&challenge_id)
            .cloned())
    }

    async fn definitions(&self) -> Result<Vec<ChallengeDefinition>> {
        self.check_read().await?;
        let mut definitions: Vec<_> = self
            .challenge_definitions
            .read()
            .await
            .values()
            .cloned()
            .collect();
        definitions.sort_by_key(|d| d.challenge_id);
        Ok(definitions)
    }

    async fn progress(
        &self,
        user_id: Uuid,
        challenge_id: Uuid,
    ) -> Result<Option<ChallengeProgress>> {
        self.check_read().await?;
        Ok(self
            .challenge_progress
            .read()
            .await
            .get(&(user_id, challenge_id))
            .cloned())
    }

    async fn put_progress(&self, progress: ChallengeProgress) -> Result<()> {
        self.check_write().await?;
        self.challenge_progress
            .write()
            .await
            .insert((progress.user_id, progress.challenge_id), progress);
        Ok(())
    }

    async fn progress_for_user(&self, user_id: Uuid) -> Result<Vec<ChallengeProgress>> {
        self.check_read().await?;
        Ok(self
            .challenge_progress
            .read()
            .await
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BadgeStore for MemoryStore {
    async fn upsert_badge(&self, badge: Badge) -> Result<()> {
        self.check_write().await?;
        self.badges.write().await.insert(badge.badge_id, badge);
        Ok(())
    }

    async fn badge(&self, badge_id: Uuid) -> Result<Option<Badge>> {
        self.check_read().await?;
        Ok(self.badges.read().await.get(&badge_id).cloned())
    }

    async fn active_badges(&self) -> Result<Vec<Badge>> {
        self.check_read().await?;
        let mut badges: Vec<_> = self
            .badges
            .read()
            .await
            .values()
            .filter(|b| b.is_active)
            .cloned()
            .collect();
        badges.sort_by_key(|b| b.badge_id);
        Ok(badges)
    }

    async fn insert_user_badge(&self, user_badge: UserBadge) -> Result<()> {
        self.check_write().await?;
        let key = (user_badge.user_id, user_badge.badge_id);
        let mut owned = self.user_badges.write().await;
        if owned.contains_key(&key) {
            return Err(StorageError::Duplicate {
                key: format!("{}/{}", user_badge.user_id, user_badge.badge_id),
            });
        }
        owned.insert(key, user_badge);
        Ok(())
    }

    async fn badges_for_user(&self, user_id: Uuid) -> Result<Vec<UserBadge>> {
        self.check_read().await?;
        Ok(self
            .user_badges
            .read()
            .await
            .values()
            .filter(|ub| ub.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReferralStore for MemoryStore {
    async fn insert(&self, referral: ReferralReward) -> Result<()> {
        self.check_write().await?;
        let mut referrals = self.referrals.write().await;
        if referrals.contains_key(&referral.referred_user_id) {
            return Err(StorageError::Duplicate {
                key: referral.referred_user_id.to_string(),
            });
        }
        referrals.insert(referral.referred_user_id, referral);
        Ok(())
    }

    async fn find_by_referred(&self, referred_user_id: Uuid) -> Result<Option<ReferralReward>> {
        self.check_read().await?;
        Ok(self.referrals.read().await.get(&referred_user_id).cloned())
    }

    async fn list_for_referrer(&self, referrer_user_id: Uuid) -> Result<Vec<ReferralReward>> {
        self.check_read().await?;
        let mut referrals: Vec<_> = self
            .referrals
            .read()
            .await
            .values()
            .filter(|r| r.referrer_user_id == referrer_user_id)
            .cloned()
            .collect();
        referrals.sort_by_key(|r| r.created_at);
        Ok(referrals)
    }

    async fn put(&self, referral: ReferralReward) -> Result<()> {
        self.check_write().await?;
        let mut referrals = self.referrals.write().await;
        if !referrals.contains_key(&referral.referred_user_id) {
            return Err(StorageError::NotFound {
                entity: "referral",
                key: referral.referred_user_id.to_string(),
            });
        }
        referrals.insert(referral.referred_user_id, referral);
        Ok(())
    }

    async fn redeem_completed(&self, referrer_user_id: Uuid) -> Result<Vec<ReferralReward>> {
        self.check_write().await?;
        // One write lock for the whole flip keeps it all-or-nothing.
        let mut referrals = self.referrals.write().await;
        let mut staged = Vec::new();
        for referral in referrals.values() {
            if referral.referrer_user_id == referrer_user_id
                && referral.status == ReferralStatus::Completed
            {
                let redeemed = referral.mark_redeemed().map_err(|e| {
                    StorageError::Unavailable(format!("illegal redemption: {e}"))
                })?;
                staged.push(redeemed);
            }
        }
        for redeemed in &staged {
            referrals.insert(redeemed.referred_user_id, redeemed.clone());
        }
        staged.sort_by_key(|r| r.created_at);
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(user_id: Uuid, reference: &str) -> LedgerEntry {
        LedgerEntry::new(
            user_id,
            RewardType::Recycle,
            100,
            reference,
            "test entry",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_append_rejects_duplicate_key() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.append(entry(user, "pickup-1")).await.unwrap();

        let err = store.append(entry(user, "pickup-1")).await.unwrap_err();
        assert!(err.is_duplicate());

        // Same reference for a different user is a different key.
        store.append(entry(Uuid::new_v4(), "pickup-1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paginated() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for i in 0..5 {
            let mut e = entry(user, &format!("pickup-{i}"));
            e.created_at = Utc::now() + chrono::Duration::seconds(i);
            store.append(e).await.unwrap();
        }

        let first = store.list_for_user(user, 0, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].reference_id, "pickup-4");
        assert_eq!(first[1].reference_id, "pickup-3");

        let last = store.list_for_user(user, 4, 2).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].reference_id, "pickup-0");

        assert_eq!(store.count_for_user(user).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_user_badge_uniqueness() {
        let store = MemoryStore::new();
        let user_badge = UserBadge {
            user_id: Uuid::new_v4(),
            badge_id: Uuid::new_v4(),
            earned_at: Utc::now(),
            source_event_id: Uuid::new_v4(),
        };
        store.insert_user_badge(user_badge.clone()).await.unwrap();
        let err = store.insert_user_badge(user_badge).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MemoryStore::new();
        store.set_fail_on_write(true).await;
        let err = store.append(entry(Uuid::new_v4(), "x")).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));

        store.set_fail_on_write(false).await;
        store.append(entry(Uuid::new_v4(), "x")).await.unwrap();
    }

    #[tokio::test]
    async fn test_redeem_completed_flips_only_completed() {
        let store = MemoryStore::new();
        let referrer = Uuid::new_v4();
        let now = Utc::now();

        let pending = ReferralReward::new(referrer, Uuid::new_v4(), now);
        store.insert(pending.clone()).await.unwrap();

        let completed = ReferralReward::new(referrer, Uuid::new_v4(), now)
            .mark_completed(100, now)
            .unwrap();
        store.insert(completed.clone()).await.unwrap();

        let flipped = store.redeem_completed(referrer).await.unwrap();
        assert_eq!(flipped.len(), 1);
        assert_eq!(flipped[0].status, ReferralStatus::Redeemed);

        let still_pending = store
            .find_by_referred(pending.referred_user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(still_pending.status, ReferralStatus::Pending);
    }
}
