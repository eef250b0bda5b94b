//! Pickup-completed handling.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    weekly_award_reference, EnvironmentalImpact, GoalType, LedgerEntry, RewardType, Streak,
};
use crate::engine::{Appended, PickupCompleted, PickupOutcome, Result, RewardEngine, RewardError};

impl RewardEngine {
    /// Reward a completed pickup.
    ///
    /// Idempotent under at-least-once delivery: the pickup id is the
    /// dedup reference, and redelivery of an already-recorded pickup
    /// re-drives the tail steps instead of returning early, so a crash
    /// anywhere after the primary append is healed by the retry. Keyed
    /// writes dedup themselves; the unkeyed aggregate writes (points,
    /// impact, challenge progress) are guarded by their row timestamps,
    /// which the original delivery stamped with the event time.
    ///
    /// Step order is a documented contract: recycle award + points, then
    /// environmental impact, then streak (with its own keyed award), then
    /// KG/PICKUPS challenge progress, then badge evaluation.
    pub async fn handle_pickup_completed(&self, event: PickupCompleted) -> Result<PickupOutcome> {
        if !event.weight_kg.is_finite() || event.weight_kg < 0.0 {
            return Err(RewardError::InvariantViolation(format!(
                "pickup weight must be a non-negative number, got {}",
                event.weight_kg
            )));
        }

        let _guard = self.lock_user(event.user_id).await;
        let stores = self.stores().clone();
        let reference = event.pickup_id.to_string();

        if let Some(existing) = stores
            .ledger
            .find(event.user_id, RewardType::Recycle, &reference)
            .await?
        {
            debug!(user = %event.user_id, pickup = %event.pickup_id, "Pickup already rewarded");
            return self.resume_pickup(&event, &existing).await;
        }

        if !self.verify_user(event.user_id).await? {
            return Ok(PickupOutcome::skipped());
        }

        let rules = self.rules().clone();
        let now = event.completed_at;

        // (a) + (b): first-recycle detection stays ledger-derived.
        let prior_recycles = stores
            .ledger
            .count_by_type(event.user_id, RewardType::Recycle)
            .await?;
        let first_recycle = prior_recycles == 0;
        let weight_points = (event.weight_kg * rules.points_per_kg as f64).round() as u64;
        let bonus = if first_recycle {
            rules.first_recycle_bonus
        } else {
            0
        };
        let points = bonus + weight_points;

        // (c) Primary award. A concurrent handler that passed the read
        // check above loses here and falls back to the resume path.
        let entry = LedgerEntry::new(
            event.user_id,
            RewardType::Recycle,
            points,
            &reference,
            format!(
                "Recycled {:.1} kg of {}{}",
                event.weight_kg,
                event.material,
                if first_recycle { " (first recycle)" } else { "" }
            ),
            now,
        );
        if self.append_award(entry.clone()).await? == Appended::Duplicate {
            return self.resume_pickup(&event, &entry).await;
        }
        self.credit_points(event.user_id, points, now).await?;

        // (d) Environmental impact.
        let impact = match stores.impact.get(event.user_id).await? {
            Some(impact) => impact,
            None => EnvironmentalImpact::new(event.user_id, &rules, now),
        };
        let impact = impact.add_weight(event.weight_kg, event.material, &rules, now);
        stores.impact.put(impact).await?;

        // (e) Streak, with its own keyed weekly award.
        let (streak, streak_points) = self.apply_streak(event.user_id, now).await?;

        // (f) Challenge progress driven by this pickup.
        let mut challenges_completed = self
            .advance_challenges(event.user_id, GoalType::Kg, event.weight_kg, now)
            .await?;
        challenges_completed.extend(
            self.advance_challenges(event.user_id, GoalType::Pickups, 1.0, now)
                .await?,
        );

        // (g) Badges.
        let badges_awarded = self.evaluate_badges(event.user_id, now).await?;

        info!(
            user = %event.user_id,
            pickup = %event.pickup_id,
            points,
            first_recycle,
            streak = streak.current_streak_count,
            "Pickup rewarded"
        );

        Ok(PickupOutcome {
            duplicate: false,
            skipped: false,
            first_recycle,
            points_awarded: points,
            streak_count: streak.current_streak_count,
            streak_points,
            challenges_completed,
            badges_awarded,
        })
    }

    /// Re-drive the tail of a pickup whose primary award already landed.
    ///
    /// Runs after the ledger reported the pickup as a duplicate. Every
    /// step is written so that a fully processed pickup passes through
    /// without effect, while a delivery that crashed mid-sequence gets
    /// its missing writes re-issued from the recorded entry:
    /// - points re-credit only when the account predates the event, using
    ///   the amount recorded on the ledger entry;
    /// - the impact delta re-applies only when the row predates the event;
    /// - the streak transition is same-day safe and its award is keyed;
    /// - challenge progress moves only rows the original delivery never
    ///   stamped;
    /// - badge evaluation is keyed per badge.
    async fn resume_pickup(
        &self,
        event: &PickupCompleted,
        entry: &LedgerEntry,
    ) -> Result<PickupOutcome> {
        let stores = self.stores().clone();
        let rules = self.rules().clone();
        let now = event.completed_at;

        let stale_points = match stores.points.get(event.user_id).await? {
            Some(account) => account.updated_at < now,
            None => true,
        };
        if stale_points {
            self.credit_points(event.user_id, entry.points, now).await?;
        }

        let impact = stores.impact.get(event.user_id).await?;
        if impact.as_ref().map_or(true, |i| i.last_updated_at < now) {
            let base = match impact {
                Some(impact) => impact,
                None => EnvironmentalImpact::new(event.user_id, &rules, now),
            };
            stores
                .impact
                .put(base.add_weight(event.weight_kg, event.material, &rules, now))
                .await?;
        }

        let (streak, streak_points) = self.apply_streak(event.user_id, now).await?;

        let mut challenges_completed = self
            .repair_challenges(event.user_id, GoalType::Kg, event.weight_kg, now)
            .await?;
        challenges_completed.extend(
            self.repair_challenges(event.user_id, GoalType::Pickups, 1.0, now)
                .await?,
        );

        let badges_awarded = self.evaluate_badges(event.user_id, now).await?;

        Ok(PickupOutcome {
            duplicate: true,
            skipped: false,
            first_recycle: false,
            points_awarded: 0,
            streak_count: streak.current_streak_count,
            streak_points,
            challenges_completed,
            badges_awarded,
        })
    }

    /// Feed the event date through the streak machine and grant the
    /// weekly milestone award when the increment is a maintained one. The
    /// award reference keys on (count, week), so only the first pickup of
    /// a streak week pays out.
    async fn apply_streak(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(Streak, u64)> {
        let stores = self.stores().clone();
        let rules = self.rules().clone();

        let streak = match stores.streaks.get(user_id).await? {
            Some(streak) => streak,
            None => Streak::new(user_id, &rules, now),
        };
        let (streak, outcome) = streak.apply_recycle(now.date_naive(), now);
        stores.streaks.put(streak.clone()).await?;

        let mut streak_points = 0;
        if outcome.maintained() && streak.current_streak_count > 0 {
            let streak_ref = weekly_award_reference(streak.current_streak_count, now.date_naive());
            let entry = LedgerEntry::new(
                user_id,
                RewardType::Streak,
                rules.weekly_streak_points,
                streak_ref,
                format!("Weekly streak maintained: week {}", streak.current_streak_count),
                now,
            );
            if self.append_award(entry).await? == Appended::New {
                self.credit_points(user_id, rules.weekly_streak_points, now)
                    .await?;
                streak_points = rules.weekly_streak_points;
                info!(
                    user = %user_id,
                    streak = streak.current_streak_count,
                    "Weekly streak milestone rewarded"
                );
            }
        }
        Ok((streak, streak_points))
    }
}
