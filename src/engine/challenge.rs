//! Challenge progress tracking and completion awards.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{ChallengeDefinition, ChallengeProgress, GoalType, LedgerEntry, RewardType};
use crate::engine::{Appended, ChallengeCompleted, ChallengeOutcome, Result, RewardEngine};

impl RewardEngine {
    /// Advance every open challenge of `goal_type` by `delta` for this
    /// user, folding the completion award into the same run when a target
    /// is reached. Callers must hold the user's lock.
    ///
    /// Returns the ids of challenges whose targets this advance reached.
    pub(crate) async fn advance_challenges(
        &self,
        user_id: Uuid,
        goal_type: GoalType,
        delta: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        self.drive_challenges(user_id, goal_type, delta, now, false)
            .await
    }

    /// Redelivery variant of [`advance_challenges`]: skips progress rows
    /// already stamped at or after the event time, so a replayed event
    /// only moves rows a crashed earlier delivery never reached.
    ///
    /// [`advance_challenges`]: RewardEngine::advance_challenges
    pub(crate) async fn repair_challenges(
        &self,
        user_id: Uuid,
        goal_type: GoalType,
        delta: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        self.drive_challenges(user_id, goal_type, delta, now, true)
            .await
    }

    async fn drive_challenges(
        &self,
        user_id: Uuid,
        goal_type: GoalType,
        delta: f64,
        now: DateTime<Utc>,
        only_stale: bool,
    ) -> Result<Vec<Uuid>> {
        let stores = self.stores().clone();
        let mut completed = Vec::new();

        for definition in stores.challenges.definitions().await? {
            if definition.goal_type != goal_type || !definition.is_open_at(now) {
                continue;
            }
            let progress = match stores
                .challenges
                .progress(user_id, definition.challenge_id)
                .await?
            {
                Some(progress) => {
                    if progress.completed {
                        continue;
                    }
                    if only_stale && progress.updated_at >= now {
                        continue;
                    }
                    progress
                }
                None => ChallengeProgress::new(user_id, definition.challenge_id, now),
            };
            let (next, just_completed) = progress.advance(delta, definition.target_value, now);
            stores.challenges.put_progress(next).await?;
            if just_completed {
                self.award_challenge(&definition, user_id, now).await?;
                completed.push(definition.challenge_id);
            }
        }

        Ok(completed)
    }

    /// Write the CHALLENGE ledger entry and credit its reward, keyed by
    /// the challenge id so the award lands at most once no matter whether
    /// the fold-in path or the external event gets there first.
    pub(crate) async fn award_challenge(
        &self,
        definition: &ChallengeDefinition,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Appended> {
        let entry = LedgerEntry::new(
            user_id,
            RewardType::Challenge,
            definition.reward_points,
            definition.challenge_id.to_string(),
            format!("Challenge completed: {}", definition.title),
            now,
        );
        match self.append_award(entry).await? {
            Appended::New => {
                self.credit_points(user_id, definition.reward_points, now)
                    .await?;
                info!(
                    user = %user_id,
                    challenge = %definition.challenge_id,
                    points = definition.reward_points,
                    "Challenge reward granted"
                );
                Ok(Appended::New)
            }
            Appended::Duplicate => Ok(Appended::Duplicate),
        }
    }

    /// Reward an externally signalled challenge completion.
    ///
    /// No-ops (logged, not errored) when the definition or the user's
    /// progress row is missing, and when the progress already completed.
    /// The latter is the normal case after the pickup handler folded the
    /// award in.
    pub async fn handle_challenge_completed(
        &self,
        event: ChallengeCompleted,
    ) -> Result<ChallengeOutcome> {
        let _guard = self.lock_user(event.user_id).await;
        let stores = self.stores().clone();
        let now = event.completed_at;

        let Some(definition) = stores.challenges.definition(event.challenge_id).await? else {
            warn!(challenge = %event.challenge_id, "Unknown challenge, dropping event");
            return Ok(ChallengeOutcome::skipped());
        };
        let Some(progress) = stores
            .challenges
            .progress(event.user_id, event.challenge_id)
            .await?
        else {
            warn!(
                user = %event.user_id,
                challenge = %event.challenge_id,
                "No progress for challenge, dropping event"
            );
            return Ok(ChallengeOutcome::skipped());
        };

        if progress.completed {
            debug!(
                user = %event.user_id,
                challenge = %event.challenge_id,
                "Challenge already completed"
            );
            return Ok(ChallengeOutcome::duplicate());
        }

        match self.award_challenge(&definition, event.user_id, now).await? {
            Appended::New => {
                stores
                    .challenges
                    .put_progress(progress.complete(definition.target_value, now))
                    .await?;
                let badges_awarded = self.evaluate_badges(event.user_id, now).await?;
                Ok(ChallengeOutcome {
                    duplicate: false,
                    skipped: false,
                    points_awarded: definition.reward_points,
                    badges_awarded,
                })
            }
            Appended::Duplicate => {
                // An earlier attempt wrote the award but crashed before
                // marking the progress row; finish that work now.
                stores
                    .challenges
                    .put_progress(progress.complete(definition.target_value, now))
                    .await?;
                Ok(ChallengeOutcome::duplicate())
            }
        }
    }
}
