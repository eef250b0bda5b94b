//! Badge evaluation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::domain::{BadgeFacts, LedgerEntry, ReferralStatus, RewardType, UserBadge};
use crate::engine::{Appended, Result, RewardEngine};

impl RewardEngine {
    /// Evaluate every active badge the user does not own yet and unlock
    /// the ones whose criteria the current aggregates satisfy.
    ///
    /// Idempotent per badge: the BADGE ledger key and the (user, badge)
    /// ownership uniqueness both guard re-evaluation, so running this N
    /// times yields one award. Callers must hold the user's lock.
    ///
    /// Returns the ids of newly unlocked badges.
    pub(crate) async fn evaluate_badges(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let stores = self.stores().clone();

        let owned: HashSet<Uuid> = stores
            .badges
            .badges_for_user(user_id)
            .await?
            .into_iter()
            .map(|ub| ub.badge_id)
            .collect();
        let candidates: Vec<_> = stores
            .badges
            .active_badges()
            .await?
            .into_iter()
            .filter(|badge| !owned.contains(&badge.badge_id))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let facts = self.badge_facts(user_id).await?;
        let bonus = self.rules().badge_earned_points;
        let mut awarded = Vec::new();

        for badge in candidates {
            if !badge.criteria.is_met(&facts) {
                continue;
            }

            let entry = LedgerEntry::new(
                user_id,
                RewardType::Badge,
                bonus,
                badge.badge_id.to_string(),
                format!("Badge earned: {}", badge.name),
                now,
            );
            let entry_id = entry.id;

            match self.append_award(entry).await? {
                Appended::New => {
                    self.insert_ownership(user_id, badge.badge_id, entry_id, now)
                        .await?;
                    self.credit_points(user_id, bonus, now).await?;
                    info!(user = %user_id, badge = %badge.badge_id, name = %badge.name, "Badge unlocked");
                    awarded.push(badge.badge_id);
                }
                Appended::Duplicate => {
                    // An earlier attempt wrote the award but may have
                    // crashed before recording ownership; repair it.
                    let source = stores
                        .ledger
                        .find(user_id, RewardType::Badge, &badge.badge_id.to_string())
                        .await?
                        .map(|existing| existing.id)
                        .unwrap_or(entry_id);
                    self.insert_ownership(user_id, badge.badge_id, source, now)
                        .await?;
                }
            }
        }

        Ok(awarded)
    }

    async fn insert_ownership(
        &self,
        user_id: Uuid,
        badge_id: Uuid,
        source_event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let user_badge = UserBadge {
            user_id,
            badge_id,
            earned_at: now,
            source_event_id,
        };
        match self.stores().badges.insert_user_badge(user_badge).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_duplicate() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Gather the aggregate facts the badge criteria read.
    async fn badge_facts(&self, user_id: Uuid) -> Result<BadgeFacts> {
        let stores = self.stores();
        let recycle_entries = stores
            .ledger
            .count_by_type(user_id, RewardType::Recycle)
            .await?;
        let total_kg_recycled = stores
            .impact
            .get(user_id)
            .await?
            .map(|impact| impact.total_kg_recycled)
            .unwrap_or(0.0);
        let best_streak = stores
            .streaks
            .get(user_id)
            .await?
            .map(|streak| streak.best_streak)
            .unwrap_or(0);
        let completed_referrals = stores
            .referrals
            .list_for_referrer(user_id)
            .await?
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    ReferralStatus::Completed | ReferralStatus::Redeemed
                )
            })
            .count() as u64;

        Ok(BadgeFacts {
            recycle_entries,
            total_kg_recycled,
            best_streak,
            completed_referrals,
        })
    }
}
