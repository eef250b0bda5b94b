//! Reward engine integration tests over the in-memory store.
//!
//! Exercises the end-to-end event handlers: idempotency under redelivery
//! and concurrency, aggregate consistency, and the query surface.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use greenledger::config::{MaterialType, RewardRules};
use greenledger::domain::{
    BadgeCriteria, ChallengeDefinition, EnvironmentalImpact, GoalType, ReferralStatus, RewardType,
};
use greenledger::engine::{ChallengeCompleted, PickupCompleted, ReferralCompleted};
use greenledger::interfaces::{
    BadgeStore, ChallengeStore, ImpactStore, LedgerStore, Result as StorageResult, StorageError,
    UserDirectory, WalletService,
};
use greenledger::storage::MemoryStore;
use greenledger::test_utils::{make_engine_parts, MockUserDirectory, MockWallet};
use greenledger::RewardEngine;

fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn make_pickup(user: Uuid, weight_kg: f64, completed_at: DateTime<Utc>) -> PickupCompleted {
    PickupCompleted {
        user_id: user,
        pickup_id: Uuid::new_v4(),
        weight_kg,
        material: MaterialType::Plastic,
        completed_at,
    }
}

fn make_challenge(goal_type: GoalType, target_value: f64, reward_points: u64) -> ChallengeDefinition {
    ChallengeDefinition {
        challenge_id: Uuid::new_v4(),
        title: "Test challenge".to_string(),
        goal_type,
        target_value,
        reward_points,
        start_date: ts(2024, 1, 1),
        end_date: ts(2025, 1, 1),
        is_active: true,
    }
}

fn make_badge(criteria: BadgeCriteria) -> greenledger::domain::Badge {
    greenledger::domain::Badge {
        badge_id: Uuid::new_v4(),
        name: "Test badge".to_string(),
        description: "A badge for testing".to_string(),
        icon: "star".to_string(),
        criteria,
        is_active: true,
    }
}

#[tokio::test]
async fn test_first_pickup_awards_bonus_points_and_streak() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();

    let outcome = engine
        .handle_pickup_completed(make_pickup(user, 5.0, ts(2024, 6, 3)))
        .await
        .unwrap();

    assert!(!outcome.duplicate);
    assert!(outcome.first_recycle);
    assert_eq!(outcome.points_awarded, 150); // 50 bonus + 5kg x 20
    assert_eq!(outcome.streak_count, 1);
    assert_eq!(outcome.streak_points, 30);

    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, 180);
    assert_eq!(points.current_level, 1);
    assert_eq!(points.points_to_next_level, 320);

    let impact = engine.impact_summary(user).await.unwrap();
    assert!((impact.total_kg_recycled - 5.0).abs() < 1e-9);
    assert!((impact.co2_saved_kg - 12.5).abs() < 1e-9);
    assert_eq!(impact.trees_equivalent, 0);
    assert_eq!(impact.carbon_score, "D+");

    let streak = engine.streak_status(user, day(2024, 6, 3)).await.unwrap();
    assert!(streak.is_active);
    assert_eq!(streak.current_streak_count, 1);
}

#[tokio::test]
async fn test_pickup_redelivery_is_noop() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    let event = make_pickup(user, 5.0, ts(2024, 6, 3));

    let first = engine.handle_pickup_completed(event.clone()).await.unwrap();
    assert!(!first.duplicate);

    let replay = engine.handle_pickup_completed(event).await.unwrap();
    assert!(replay.duplicate);
    assert_eq!(replay.points_awarded, 0);

    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, 180);
}

#[tokio::test]
async fn test_concurrent_duplicate_pickups_award_once() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let engine = Arc::new(engine);
    let user = Uuid::new_v4();
    let event = make_pickup(user, 5.0, ts(2024, 6, 3));

    let a = tokio::spawn({
        let engine = engine.clone();
        let event = event.clone();
        async move { engine.handle_pickup_completed(event).await }
    });
    let b = tokio::spawn({
        let engine = engine.clone();
        let event = event.clone();
        async move { engine.handle_pickup_completed(event).await }
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_eq!(
        [a.duplicate, b.duplicate].iter().filter(|d| !**d).count(),
        1
    );
    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, 180);
}

#[tokio::test]
async fn test_second_pickup_same_day_no_bonus_no_extra_streak() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();

    engine
        .handle_pickup_completed(make_pickup(user, 5.0, ts(2024, 6, 3)))
        .await
        .unwrap();
    let second = engine
        .handle_pickup_completed(make_pickup(user, 3.0, ts(2024, 6, 3)))
        .await
        .unwrap();

    assert!(!second.first_recycle);
    assert_eq!(second.points_awarded, 60); // 3kg x 20, no bonus
    assert_eq!(second.streak_count, 1); // same calendar day
    assert_eq!(second.streak_points, 0);

    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, 240);
}

#[tokio::test]
async fn test_streak_break_resets_count_keeps_best() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();

    engine
        .handle_pickup_completed(make_pickup(user, 1.0, ts(2024, 6, 3)))
        .await
        .unwrap();
    let extended = engine
        .handle_pickup_completed(make_pickup(user, 1.0, ts(2024, 6, 10)))
        .await
        .unwrap();
    assert_eq!(extended.streak_count, 2);
    assert_eq!(extended.streak_points, 30);

    // 13-day gap breaks the streak.
    let broken = engine
        .handle_pickup_completed(make_pickup(user, 1.0, ts(2024, 6, 23)))
        .await
        .unwrap();
    assert_eq!(broken.streak_count, 1);
    assert_eq!(broken.streak_points, 0); // broken-restart is not a maintained milestone

    let status = engine.streak_status(user, day(2024, 6, 23)).await.unwrap();
    assert_eq!(status.current_streak_count, 1);
    assert_eq!(status.best_streak, 2);
    assert!(status.is_active);
}

#[tokio::test]
async fn test_streak_status_reports_days_until_break() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();

    let status = engine.streak_status(user, day(2024, 6, 3)).await.unwrap();
    assert!(!status.is_active);

    engine
        .handle_pickup_completed(make_pickup(user, 1.0, ts(2024, 6, 3)))
        .await
        .unwrap();

    let status = engine.streak_status(user, day(2024, 6, 5)).await.unwrap();
    assert!(status.is_active);
    assert_eq!(status.days_until_break, 5);

    let status = engine.streak_status(user, day(2024, 6, 20)).await.unwrap();
    assert!(!status.is_active);
}

#[tokio::test]
async fn test_level_transition_on_large_pickup() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();

    // 50 + 30x20 = 650, plus 30 streak points = 680.
    engine
        .handle_pickup_completed(make_pickup(user, 30.0, ts(2024, 6, 3)))
        .await
        .unwrap();

    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, 680);
    assert_eq!(points.current_level, 2);
    assert_eq!(points.points_to_next_level, 1320);
}

#[tokio::test]
async fn test_pickup_rejects_invalid_weight() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();

    let result = engine
        .handle_pickup_completed(make_pickup(user, -1.0, ts(2024, 6, 3)))
        .await;
    assert!(result.is_err());

    let result = engine
        .handle_pickup_completed(make_pickup(user, f64::NAN, ts(2024, 6, 3)))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_unknown_user_pickup_dropped() {
    let store = Arc::new(MemoryStore::new());
    let known = Uuid::new_v4();
    let users = Arc::new(MockUserDirectory::with_users([known]));
    let wallet = Arc::new(MockWallet::new());
    let engine = RewardEngine::new(
        store.stores(),
        users as Arc<dyn UserDirectory>,
        wallet as Arc<dyn WalletService>,
        RewardRules::default(),
    );

    let stranger = Uuid::new_v4();
    let outcome = engine
        .handle_pickup_completed(make_pickup(stranger, 5.0, ts(2024, 6, 3)))
        .await
        .unwrap();
    assert!(outcome.skipped);

    let activity = engine.ledger_activity(stranger, 1, 10).await.unwrap();
    assert_eq!(activity.total, 0);
}

#[tokio::test]
async fn test_storage_failure_then_retry_awards_once() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    let event = make_pickup(user, 5.0, ts(2024, 6, 3));

    store.set_fail_on_write(true).await;
    assert!(engine.handle_pickup_completed(event.clone()).await.is_err());

    store.set_fail_on_write(false).await;
    let retry = engine.handle_pickup_completed(event).await.unwrap();
    assert!(!retry.duplicate);

    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, 180);
}

/// ImpactStore wrapper that rejects a set number of writes, for testing
/// retry after a mid-sequence storage failure.
struct FlakyImpactStore {
    inner: Arc<MemoryStore>,
    failures_left: Mutex<u32>,
}

#[async_trait]
impl ImpactStore for FlakyImpactStore {
    async fn get(&self, user_id: Uuid) -> StorageResult<Option<EnvironmentalImpact>> {
        ImpactStore::get(self.inner.as_ref(), user_id).await
    }

    async fn put(&self, impact: EnvironmentalImpact) -> StorageResult<()> {
        let mut left = self.failures_left.lock().await;
        if *left > 0 {
            *left -= 1;
            return Err(StorageError::Unavailable("impact backend down".to_string()));
        }
        ImpactStore::put(self.inner.as_ref(), impact).await
    }
}

#[tokio::test]
async fn test_pickup_retry_after_partial_failure_repairs_aggregates() {
    let store = Arc::new(MemoryStore::new());
    let mut stores = store.stores();
    stores.impact = Arc::new(FlakyImpactStore {
        inner: store.clone(),
        failures_left: Mutex::new(1),
    });
    let engine = RewardEngine::new(
        stores,
        Arc::new(MockUserDirectory::new()) as Arc<dyn UserDirectory>,
        Arc::new(MockWallet::new()) as Arc<dyn WalletService>,
        RewardRules::default(),
    );
    let user = Uuid::new_v4();
    let challenge = make_challenge(GoalType::Kg, 20.0, 200);
    store.upsert_definition(challenge).await.unwrap();
    let event = make_pickup(user, 5.0, ts(2024, 6, 3));

    // The impact write dies after the ledger entry and points landed.
    assert!(engine.handle_pickup_completed(event.clone()).await.is_err());

    // The retry reports a duplicate but finishes the stranded tail:
    // impact, streak (with its weekly award), and challenge progress.
    let retry = engine.handle_pickup_completed(event).await.unwrap();
    assert!(retry.duplicate);
    assert_eq!(retry.streak_count, 1);
    assert_eq!(retry.streak_points, 30);

    let impact = engine.impact_summary(user).await.unwrap();
    assert!((impact.total_kg_recycled - 5.0).abs() < 1e-9);

    let streak = engine.streak_status(user, day(2024, 6, 3)).await.unwrap();
    assert!(streak.is_active);
    assert_eq!(streak.current_streak_count, 1);

    let overview = engine.challenge_overview(user, ts(2024, 6, 4)).await.unwrap();
    assert!((overview.active[0].current_progress - 5.0).abs() < 1e-9);

    // 150 recycle + 30 streak, each exactly once.
    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, 180);
}

#[tokio::test]
async fn test_pickup_redelivery_does_not_inflate_challenge_progress() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    let challenge = make_challenge(GoalType::Kg, 20.0, 200);
    store.upsert_definition(challenge).await.unwrap();
    let event = make_pickup(user, 5.0, ts(2024, 6, 3));

    engine.handle_pickup_completed(event.clone()).await.unwrap();
    let replay = engine.handle_pickup_completed(event).await.unwrap();
    assert!(replay.duplicate);
    assert!(replay.challenges_completed.is_empty());

    let overview = engine.challenge_overview(user, ts(2024, 6, 4)).await.unwrap();
    assert!((overview.active[0].current_progress - 5.0).abs() < 1e-9);

    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, 180);
}

#[tokio::test]
async fn test_challenge_progress_accumulates_and_completes() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    let challenge = make_challenge(GoalType::Kg, 10.0, 200);
    store.upsert_definition(challenge.clone()).await.unwrap();

    let first = engine
        .handle_pickup_completed(make_pickup(user, 6.0, ts(2024, 6, 3)))
        .await
        .unwrap();
    assert!(first.challenges_completed.is_empty());

    let second = engine
        .handle_pickup_completed(make_pickup(user, 6.0, ts(2024, 6, 4)))
        .await
        .unwrap();
    assert_eq!(second.challenges_completed, vec![challenge.challenge_id]);

    let overview = engine.challenge_overview(user, ts(2024, 6, 5)).await.unwrap();
    assert_eq!(overview.completed.len(), 1);
    let view = &overview.completed[0];
    assert_eq!(view.percent, 100);
    assert!((view.current_progress - 10.0).abs() < 1e-9); // capped at target

    // The fold-in completion already paid out; the external event is a dup.
    let event = ChallengeCompleted {
        user_id: user,
        challenge_id: challenge.challenge_id,
        completed_at: ts(2024, 6, 5),
    };
    let outcome = engine.handle_challenge_completed(event).await.unwrap();
    assert!(outcome.duplicate);
}

#[tokio::test]
async fn test_challenge_completed_event_awards_once() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    let challenge = make_challenge(GoalType::Kg, 100.0, 500);
    store.upsert_definition(challenge.clone()).await.unwrap();

    // Some progress exists but the target was never reached in-band.
    engine
        .handle_pickup_completed(make_pickup(user, 5.0, ts(2024, 6, 3)))
        .await
        .unwrap();
    let base = engine.points_overview(user).await.unwrap().total_points;

    let event = ChallengeCompleted {
        user_id: user,
        challenge_id: challenge.challenge_id,
        completed_at: ts(2024, 6, 5),
    };
    let outcome = engine.handle_challenge_completed(event.clone()).await.unwrap();
    assert!(!outcome.duplicate);
    assert_eq!(outcome.points_awarded, 500);

    let replay = engine.handle_challenge_completed(event).await.unwrap();
    assert!(replay.duplicate);

    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, base + 500);
}

#[tokio::test]
async fn test_referral_completion_advances_referral_challenges() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let referrer = Uuid::new_v4();
    let challenge = make_challenge(GoalType::Referrals, 2.0, 300);
    store.upsert_definition(challenge.clone()).await.unwrap();

    let first_referred = Uuid::new_v4();
    engine
        .register_referral(referrer, first_referred, ts(2024, 6, 1))
        .await
        .unwrap();
    let first_event = ReferralCompleted {
        referrer_user_id: referrer,
        referred_user_id: first_referred,
        completed_at: ts(2024, 6, 2),
    };
    let first = engine.handle_referral_completed(first_event.clone()).await.unwrap();
    assert!(first.challenges_completed.is_empty());

    let overview = engine.challenge_overview(referrer, ts(2024, 6, 3)).await.unwrap();
    assert_eq!(overview.active.len(), 1);
    assert!((overview.active[0].current_progress - 1.0).abs() < 1e-9);

    let second_referred = Uuid::new_v4();
    engine
        .register_referral(referrer, second_referred, ts(2024, 6, 3))
        .await
        .unwrap();
    let second = engine
        .handle_referral_completed(ReferralCompleted {
            referrer_user_id: referrer,
            referred_user_id: second_referred,
            completed_at: ts(2024, 6, 4),
        })
        .await
        .unwrap();
    assert_eq!(second.challenges_completed, vec![challenge.challenge_id]);

    // 2 x 100 referral points + the 300 challenge reward.
    let points = engine.points_overview(referrer).await.unwrap();
    assert_eq!(points.total_points, 500);

    // Replaying the first completion changes nothing.
    let replay = engine.handle_referral_completed(first_event).await.unwrap();
    assert!(replay.duplicate);
    assert!(replay.challenges_completed.is_empty());
    let points = engine.points_overview(referrer).await.unwrap();
    assert_eq!(points.total_points, 500);

    // The fold-in already paid out; the external event is a dup.
    let outcome = engine
        .handle_challenge_completed(ChallengeCompleted {
            user_id: referrer,
            challenge_id: challenge.challenge_id,
            completed_at: ts(2024, 6, 5),
        })
        .await
        .unwrap();
    assert!(outcome.duplicate);
}

#[tokio::test]
async fn test_challenge_completed_unknown_challenge_skipped() {
    let (_store, _users, _wallet, engine) = make_engine_parts();

    let outcome = engine
        .handle_challenge_completed(ChallengeCompleted {
            user_id: Uuid::new_v4(),
            challenge_id: Uuid::new_v4(),
            completed_at: ts(2024, 6, 5),
        })
        .await
        .unwrap();
    assert!(outcome.skipped);
}

#[tokio::test]
async fn test_expired_challenge_not_advanced() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    let mut challenge = make_challenge(GoalType::Kg, 5.0, 100);
    challenge.end_date = ts(2024, 5, 1);
    store.upsert_definition(challenge).await.unwrap();

    let outcome = engine
        .handle_pickup_completed(make_pickup(user, 10.0, ts(2024, 6, 3)))
        .await
        .unwrap();
    assert!(outcome.challenges_completed.is_empty());

    let overview = engine.challenge_overview(user, ts(2024, 6, 3)).await.unwrap();
    assert!(overview.active.is_empty());
    assert!(overview.completed.is_empty());
}

#[tokio::test]
async fn test_badge_awarded_exactly_once() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    let badge = make_badge(BadgeCriteria::FirstRecycle(1));
    store.upsert_badge(badge.clone()).await.unwrap();

    let first = engine
        .handle_pickup_completed(make_pickup(user, 5.0, ts(2024, 6, 3)))
        .await
        .unwrap();
    assert_eq!(first.badges_awarded, vec![badge.badge_id]);

    // Further qualifying events must not re-award.
    for d in 4..7 {
        let outcome = engine
            .handle_pickup_completed(make_pickup(user, 5.0, ts(2024, 6, d)))
            .await
            .unwrap();
        assert!(outcome.badges_awarded.is_empty());
    }

    let overview = engine.badge_overview(user).await.unwrap();
    assert_eq!(overview.earned.len(), 1);
    assert!(overview.locked.is_empty());

    let owned = store.badges_for_user(user).await.unwrap();
    assert_eq!(owned.len(), 1);
}

#[tokio::test]
async fn test_badge_bonus_credits_points() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    store
        .upsert_badge(make_badge(BadgeCriteria::FirstRecycle(1)))
        .await
        .unwrap();

    engine
        .handle_pickup_completed(make_pickup(user, 5.0, ts(2024, 6, 3)))
        .await
        .unwrap();

    // 150 recycle + 30 streak + 25 badge bonus.
    let points = engine.points_overview(user).await.unwrap();
    assert_eq!(points.total_points, 205);
}

#[tokio::test]
async fn test_weight_threshold_badge_unlocks_later() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    let badge = make_badge(BadgeCriteria::WeightThreshold(8.0));
    store.upsert_badge(badge.clone()).await.unwrap();

    let first = engine
        .handle_pickup_completed(make_pickup(user, 5.0, ts(2024, 6, 3)))
        .await
        .unwrap();
    assert!(first.badges_awarded.is_empty());

    let second = engine
        .handle_pickup_completed(make_pickup(user, 5.0, ts(2024, 6, 4)))
        .await
        .unwrap();
    assert_eq!(second.badges_awarded, vec![badge.badge_id]);
}

#[tokio::test]
async fn test_referral_lifecycle() {
    let (_store, _users, wallet, engine) = make_engine_parts();
    let referrer = Uuid::new_v4();
    let referred = Uuid::new_v4();

    let referral = engine
        .register_referral(referrer, referred, ts(2024, 6, 1))
        .await
        .unwrap();
    assert_eq!(referral.status, ReferralStatus::Pending);
    assert_eq!(referral.points_awarded, 0);

    let event = ReferralCompleted {
        referrer_user_id: referrer,
        referred_user_id: referred,
        completed_at: ts(2024, 6, 3),
    };
    let outcome = engine.handle_referral_completed(event.clone()).await.unwrap();
    assert!(!outcome.duplicate);
    assert_eq!(outcome.points_awarded, 100);

    let replay = engine.handle_referral_completed(event).await.unwrap();
    assert!(replay.duplicate);

    let points = engine.points_overview(referrer).await.unwrap();
    assert_eq!(points.total_points, 100);

    let summary = engine.redeem_referrals(referrer).await.unwrap();
    assert_eq!(summary.referrals_redeemed, 1);
    assert_eq!(summary.points_redeemed, 100);
    assert_eq!(summary.wallet_credited, 1000);
    assert_eq!(wallet.balance(referrer).await, 1000);

    // Nothing left to redeem.
    let again = engine.redeem_referrals(referrer).await.unwrap();
    assert_eq!(again.referrals_redeemed, 0);
    assert_eq!(wallet.balance(referrer).await, 1000);
}

#[tokio::test]
async fn test_self_referral_and_duplicate_registration_rejected() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let referrer = Uuid::new_v4();
    let referred = Uuid::new_v4();

    assert!(engine
        .register_referral(referrer, referrer, ts(2024, 6, 1))
        .await
        .is_err());

    engine
        .register_referral(referrer, referred, ts(2024, 6, 1))
        .await
        .unwrap();
    // A referred user can only ever have one referral.
    assert!(engine
        .register_referral(Uuid::new_v4(), referred, ts(2024, 6, 2))
        .await
        .is_err());
}

#[tokio::test]
async fn test_cancelled_referral_never_completes() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let referrer = Uuid::new_v4();
    let referred = Uuid::new_v4();

    engine
        .register_referral(referrer, referred, ts(2024, 6, 1))
        .await
        .unwrap();
    let cancelled = engine.cancel_referral(referred).await.unwrap();
    assert_eq!(cancelled.status, ReferralStatus::Cancelled);

    let outcome = engine
        .handle_referral_completed(ReferralCompleted {
            referrer_user_id: referrer,
            referred_user_id: referred,
            completed_at: ts(2024, 6, 3),
        })
        .await
        .unwrap();
    assert!(outcome.skipped);

    let points = engine.points_overview(referrer).await.unwrap();
    assert_eq!(points.total_points, 0);
}

#[tokio::test]
async fn test_redeem_sums_multiple_referrals() {
    let (_store, _users, wallet, engine) = make_engine_parts();
    let referrer = Uuid::new_v4();

    for i in 0..3 {
        let referred = Uuid::new_v4();
        engine
            .register_referral(referrer, referred, ts(2024, 6, 1))
            .await
            .unwrap();
        engine
            .handle_referral_completed(ReferralCompleted {
                referrer_user_id: referrer,
                referred_user_id: referred,
                completed_at: ts(2024, 6, 2) + Duration::hours(i),
            })
            .await
            .unwrap();
    }

    let summary = engine.redeem_referrals(referrer).await.unwrap();
    assert_eq!(summary.referrals_redeemed, 3);
    assert_eq!(summary.points_redeemed, 300);
    assert_eq!(summary.wallet_credited, 3000);
    assert_eq!(wallet.balance(referrer).await, 3000);
    assert_eq!(wallet.credits().await.len(), 1); // one credit for the batch

    let overview = engine.referral_overview(referrer).await.unwrap();
    assert_eq!(overview.stats.total, 3);
    assert_eq!(overview.stats.redeemed, 3);
    assert_eq!(overview.stats.completed, 0);
    assert_eq!(overview.stats.total_points, 300);
}

#[tokio::test]
async fn test_redeem_retry_after_wallet_outage() {
    let (_store, _users, wallet, engine) = make_engine_parts();
    let referrer = Uuid::new_v4();
    let referred = Uuid::new_v4();

    engine
        .register_referral(referrer, referred, ts(2024, 6, 1))
        .await
        .unwrap();
    engine
        .handle_referral_completed(ReferralCompleted {
            referrer_user_id: referrer,
            referred_user_id: referred,
            completed_at: ts(2024, 6, 2),
        })
        .await
        .unwrap();

    wallet.set_fail_on_credit(true).await;
    assert!(engine.redeem_referrals(referrer).await.is_err());

    // The rows stayed COMPLETED, so the retry redeems the same batch.
    wallet.set_fail_on_credit(false).await;
    let summary = engine.redeem_referrals(referrer).await.unwrap();
    assert_eq!(summary.referrals_redeemed, 1);
    assert_eq!(summary.wallet_credited, 1000);
    assert_eq!(wallet.balance(referrer).await, 1000);
}

#[tokio::test]
async fn test_referral_count_badge() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let referrer = Uuid::new_v4();
    let badge = make_badge(BadgeCriteria::ReferralCount(2));
    store.upsert_badge(badge.clone()).await.unwrap();

    let mut awarded = Vec::new();
    for _ in 0..2 {
        let referred = Uuid::new_v4();
        engine
            .register_referral(referrer, referred, ts(2024, 6, 1))
            .await
            .unwrap();
        let outcome = engine
            .handle_referral_completed(ReferralCompleted {
                referrer_user_id: referrer,
                referred_user_id: referred,
                completed_at: ts(2024, 6, 2),
            })
            .await
            .unwrap();
        awarded.extend(outcome.badges_awarded);
    }
    assert_eq!(awarded, vec![badge.badge_id]);
}

#[tokio::test]
async fn test_ledger_activity_pagination_newest_first() {
    let (_store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();

    // Same-day pickups so only RECYCLE entries plus one STREAK entry land.
    for h in 0..3u32 {
        let event = PickupCompleted {
            user_id: user,
            pickup_id: Uuid::new_v4(),
            weight_kg: 1.0,
            material: MaterialType::Paper,
            completed_at: ts(2024, 6, 3) + Duration::hours(i64::from(h)),
        };
        engine.handle_pickup_completed(event).await.unwrap();
    }

    let page1 = engine.ledger_activity(user, 1, 2).await.unwrap();
    assert_eq!(page1.total, 4); // 3 recycle + 1 streak
    assert_eq!(page1.entries.len(), 2);
    assert!(page1.entries[0].created_at >= page1.entries[1].created_at);

    let page2 = engine.ledger_activity(user, 2, 2).await.unwrap();
    assert_eq!(page2.entries.len(), 2);
    assert!(page1.entries[1].created_at >= page2.entries[0].created_at);

    let page3 = engine.ledger_activity(user, 3, 2).await.unwrap();
    assert!(page3.entries.is_empty());
    assert_eq!(page3.total, 4);

    // Page 0 is clamped to 1.
    let clamped = engine.ledger_activity(user, 0, 2).await.unwrap();
    assert_eq!(clamped.page, 1);
    assert_eq!(clamped.entries, page1.entries);
}

#[tokio::test]
async fn test_ledger_records_every_award_type() {
    let (store, _users, _wallet, engine) = make_engine_parts();
    let user = Uuid::new_v4();
    store
        .upsert_badge(make_badge(BadgeCriteria::FirstRecycle(1)))
        .await
        .unwrap();
    let challenge = make_challenge(GoalType::Kg, 5.0, 100);
    store.upsert_definition(challenge).await.unwrap();

    engine
        .handle_pickup_completed(make_pickup(user, 5.0, ts(2024, 6, 3)))
        .await
        .unwrap();

    assert_eq!(store.count_by_type(user, RewardType::Recycle).await.unwrap(), 1);
    assert_eq!(store.count_by_type(user, RewardType::Streak).await.unwrap(), 1);
    assert_eq!(store.count_by_type(user, RewardType::Badge).await.unwrap(), 1);
    assert_eq!(
        store.count_by_type(user, RewardType::Challenge).await.unwrap(),
        1
    );
}
