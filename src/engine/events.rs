//! Domain events consumed by the engine and the outcomes it reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MaterialType;

/// A pickup finished and its load was weighed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupCompleted {
    pub user_id: Uuid,
    pub pickup_id: Uuid,
    pub weight_kg: f64,
    pub material: MaterialType,
    pub completed_at: DateTime<Utc>,
}

/// A referred user performed their first qualifying action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralCompleted {
    pub referrer_user_id: Uuid,
    pub referred_user_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// A challenge scheduler observed a user reaching a challenge target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeCompleted {
    pub user_id: Uuid,
    pub challenge_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// What a pickup event produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickupOutcome {
    /// The event had already been rewarded; nothing was applied.
    pub duplicate: bool,
    /// The event referenced an unknown user and was dropped.
    pub skipped: bool,
    pub first_recycle: bool,
    /// Points from the primary RECYCLE award.
    pub points_awarded: u64,
    pub streak_count: u32,
    /// Points from a newly reached weekly streak milestone, if any.
    pub streak_points: u64,
    /// Challenges whose targets this pickup reached.
    pub challenges_completed: Vec<Uuid>,
    pub badges_awarded: Vec<Uuid>,
}

impl PickupOutcome {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// What a referral-completed event produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferralOutcome {
    pub duplicate: bool,
    pub skipped: bool,
    pub points_awarded: u64,
    /// Challenges whose targets this completion reached.
    pub challenges_completed: Vec<Uuid>,
    pub badges_awarded: Vec<Uuid>,
}

impl ReferralOutcome {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// What a challenge-completed event produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeOutcome {
    pub duplicate: bool,
    pub skipped: bool,
    pub points_awarded: u64,
    pub badges_awarded: Vec<Uuid>,
}

impl ChallengeOutcome {
    pub(crate) fn duplicate() -> Self {
        Self {
            duplicate: true,
            ..Self::default()
        }
    }

    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// What a redemption call redeemed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionSummary {
    pub referrals_redeemed: u32,
    /// Sum of `points_awarded` across the redeemed referrals.
    pub points_redeemed: u64,
    /// Amount credited to the wallet.
    pub wallet_credited: u64,
}
