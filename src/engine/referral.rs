//! Referral lifecycle operations: registration, completion, cancellation,
//! and redemption.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{GoalType, LedgerEntry, ReferralReward, ReferralStatus, RewardType};
use crate::engine::{
    Appended, RedemptionSummary, ReferralCompleted, ReferralOutcome, Result, RewardEngine,
    RewardError,
};

impl RewardEngine {
    /// Record a new pending referral. At most one referral may exist per
    /// referred user; a second registration is rejected.
    pub async fn register_referral(
        &self,
        referrer_user_id: Uuid,
        referred_user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReferralReward> {
        if referrer_user_id == referred_user_id {
            return Err(RewardError::InvariantViolation(
                "a user cannot refer themselves".to_string(),
            ));
        }

        let referral = ReferralReward::new(referrer_user_id, referred_user_id, now);
        match self.stores().referrals.insert(referral.clone()).await {
            Ok(()) => {
                info!(
                    referrer = %referrer_user_id,
                    referred = %referred_user_id,
                    "Referral registered"
                );
                Ok(referral)
            }
            Err(e) if e.is_duplicate() => Err(RewardError::InvariantViolation(format!(
                "user {referred_user_id} already has a referral"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel a pending referral (e.g. the referred account was removed).
    pub async fn cancel_referral(&self, referred_user_id: Uuid) -> Result<ReferralReward> {
        let referral = self
            .stores()
            .referrals
            .find_by_referred(referred_user_id)
            .await?
            .ok_or(RewardError::NotFound {
                entity: "referral",
                key: referred_user_id.to_string(),
            })?;
        let _guard = self.lock_user(referral.referrer_user_id).await;

        let cancelled = referral
            .mark_cancelled()
            .map_err(|e| RewardError::InvariantViolation(e.to_string()))?;
        self.stores().referrals.put(cancelled.clone()).await?;
        info!(referred = %referred_user_id, "Referral cancelled");
        Ok(cancelled)
    }

    /// Reward the referrer once the referred user performs their first
    /// qualifying action.
    ///
    /// Idempotent: the referred-user id is the dedup reference. Missing or
    /// cancelled referrals are stale upstream events and drop as logged
    /// no-ops; already-completed ones report as duplicates.
    pub async fn handle_referral_completed(
        &self,
        event: ReferralCompleted,
    ) -> Result<ReferralOutcome> {
        let _guard = self.lock_user(event.referrer_user_id).await;
        let stores = self.stores().clone();
        let now = event.completed_at;

        let Some(referral) = stores
            .referrals
            .find_by_referred(event.referred_user_id)
            .await?
        else {
            warn!(referred = %event.referred_user_id, "No referral on record, dropping event");
            return Ok(ReferralOutcome::skipped());
        };

        match referral.status {
            ReferralStatus::Completed | ReferralStatus::Redeemed => {
                debug!(referred = %event.referred_user_id, "Referral already completed");
                // An earlier delivery may have crashed between the row
                // flip and the tail steps; re-drive the guarded ones.
                let challenges_completed = self
                    .repair_challenges(event.referrer_user_id, GoalType::Referrals, 1.0, now)
                    .await?;
                let badges_awarded = self.evaluate_badges(event.referrer_user_id, now).await?;
                return Ok(ReferralOutcome {
                    duplicate: true,
                    challenges_completed,
                    badges_awarded,
                    ..ReferralOutcome::default()
                });
            }
            ReferralStatus::Cancelled => {
                warn!(referred = %event.referred_user_id, "Referral was cancelled, dropping event");
                return Ok(ReferralOutcome::skipped());
            }
            ReferralStatus::Pending => {}
        }

        let points = self.rules().referral_points;
        let entry = LedgerEntry::new(
            event.referrer_user_id,
            RewardType::Referral,
            points,
            event.referred_user_id.to_string(),
            "Referral completed".to_string(),
            now,
        );
        let completed = referral
            .mark_completed(points, now)
            .map_err(|e| RewardError::InvariantViolation(e.to_string()))?;

        match self.append_award(entry).await? {
            Appended::New => {
                stores.referrals.put(completed).await?;
                self.credit_points(event.referrer_user_id, points, now).await?;
                let challenges_completed = self
                    .advance_challenges(event.referrer_user_id, GoalType::Referrals, 1.0, now)
                    .await?;
                let badges_awarded = self.evaluate_badges(event.referrer_user_id, now).await?;
                info!(
                    referrer = %event.referrer_user_id,
                    referred = %event.referred_user_id,
                    points,
                    "Referral rewarded"
                );
                Ok(ReferralOutcome {
                    duplicate: false,
                    skipped: false,
                    points_awarded: points,
                    challenges_completed,
                    badges_awarded,
                })
            }
            Appended::Duplicate => {
                // An earlier attempt wrote the award but crashed before the
                // row flip; finish that work and the tail steps now.
                stores.referrals.put(completed.clone()).await?;
                let stale_points = match stores.points.get(event.referrer_user_id).await? {
                    Some(account) => account.updated_at < now,
                    None => true,
                };
                if stale_points {
                    self.credit_points(event.referrer_user_id, completed.points_awarded, now)
                        .await?;
                }
                let challenges_completed = self
                    .repair_challenges(event.referrer_user_id, GoalType::Referrals, 1.0, now)
                    .await?;
                let badges_awarded = self.evaluate_badges(event.referrer_user_id, now).await?;
                Ok(ReferralOutcome {
                    duplicate: true,
                    challenges_completed,
                    badges_awarded,
                    ..ReferralOutcome::default()
                })
            }
        }
    }

    /// Convert all of a user's COMPLETED referrals to REDEEMED and credit
    /// the wallet once for the sum.
    ///
    /// The wallet credit happens first, under a reference derived from the
    /// exact set of referral ids being redeemed, then the rows flip in one
    /// atomic store call. A crash between the two leaves the rows
    /// COMPLETED; the retry recomputes the same set, the wallet dedups the
    /// reference, and the flip proceeds. No double credit, no stranded
    /// half-redemption.
    pub async fn redeem_referrals(&self, user_id: Uuid) -> Result<RedemptionSummary> {
        let _guard = self.lock_user(user_id).await;
        let stores = self.stores().clone();

        let completed: Vec<_> = stores
            .referrals
            .list_for_referrer(user_id)
            .await?
            .into_iter()
            .filter(|r| r.status == ReferralStatus::Completed)
            .collect();
        if completed.is_empty() {
            debug!(user = %user_id, "No completed referrals to redeem");
            return Ok(RedemptionSummary::default());
        }

        let points_redeemed: u64 = completed.iter().map(|r| r.points_awarded).sum();
        let wallet_credited = points_redeemed * self.rules().redemption_multiplier;

        let mut ids: Vec<String> = completed.iter().map(|r| r.id.to_string()).collect();
        ids.sort();
        let reference =
            Uuid::new_v5(&Uuid::NAMESPACE_OID, ids.join(",").as_bytes()).to_string();

        self.wallet().credit(user_id, wallet_credited, &reference).await?;
        let flipped = stores.referrals.redeem_completed(user_id).await?;

        info!(
            user = %user_id,
            referrals = flipped.len(),
            points = points_redeemed,
            credited = wallet_credited,
            "Referrals redeemed"
        );

        Ok(RedemptionSummary {
            referrals_redeemed: flipped.len() as u32,
            points_redeemed,
            wallet_credited,
        })
    }
}
