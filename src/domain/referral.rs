//! Referral lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Referral lifecycle. Legal transitions:
/// Pending -> Completed -> Redeemed, and Pending -> Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralStatus {
    Pending,
    Completed,
    Redeemed,
    Cancelled,
}

impl std::fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReferralStatus::Pending => "PENDING",
            ReferralStatus::Completed => "COMPLETED",
            ReferralStatus::Redeemed => "REDEEMED",
            ReferralStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ReferralStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReferralStatus::Pending),
            "COMPLETED" => Ok(ReferralStatus::Completed),
            "REDEEMED" => Ok(ReferralStatus::Redeemed),
            "CANCELLED" => Ok(ReferralStatus::Cancelled),
            other => Err(format!("unknown referral status: {other}")),
        }
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid referral transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: ReferralStatus,
    pub to: ReferralStatus,
}

/// One tracked introduction; at most one row per referred user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralReward {
    pub id: Uuid,
    pub referrer_user_id: Uuid,
    pub referred_user_id: Uuid,
    pub status: ReferralStatus,
    /// 0 until the referral completes.
    pub points_awarded: u64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReferralReward {
    pub fn new(referrer_user_id: Uuid, referred_user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            referrer_user_id,
            referred_user_id,
            status: ReferralStatus::Pending,
            points_awarded: 0,
            completed_at: None,
            created_at: now,
        }
    }

    fn transition(&self, to: ReferralStatus) -> Result<(), TransitionError> {
        use ReferralStatus::*;
        let legal = matches!(
            (self.status, to),
            (Pending, Completed) | (Completed, Redeemed) | (Pending, Cancelled)
        );
        if legal {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to,
            })
        }
    }

    /// Pending -> Completed, fixing the points this referral is worth.
    pub fn mark_completed(&self, points: u64, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        self.transition(ReferralStatus::Completed)?;
        let mut next = self.clone();
        next.status = ReferralStatus::Completed;
        next.points_awarded = points;
        next.completed_at = Some(now);
        Ok(next)
    }

    /// Completed -> Redeemed.
    pub fn mark_redeemed(&self) -> Result<Self, TransitionError> {
        self.transition(ReferralStatus::Redeemed)?;
        let mut next = self.clone();
        next.status = ReferralStatus::Redeemed;
        Ok(next)
    }

    /// Pending -> Cancelled.
    pub fn mark_cancelled(&self) -> Result<Self, TransitionError> {
        self.transition(ReferralStatus::Cancelled)?;
        let mut next = self.clone();
        next.status = ReferralStatus::Cancelled;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn referral() -> ReferralReward {
        ReferralReward::new(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_happy_path() {
        let r = referral();
        let completed = r.mark_completed(100, Utc::now()).unwrap();
        assert_eq!(completed.status, ReferralStatus::Completed);
        assert_eq!(completed.points_awarded, 100);
        assert!(completed.completed_at.is_some());

        let redeemed = completed.mark_redeemed().unwrap();
        assert_eq!(redeemed.status, ReferralStatus::Redeemed);
        assert_eq!(redeemed.points_awarded, 100);
    }

    #[test]
    fn test_cancellation() {
        let cancelled = referral().mark_cancelled().unwrap();
        assert_eq!(cancelled.status, ReferralStatus::Cancelled);
        assert!(cancelled.mark_completed(100, Utc::now()).is_err());
        assert!(cancelled.mark_redeemed().is_err());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let r = referral();
        // Cannot redeem while pending.
        assert!(r.mark_redeemed().is_err());

        let completed = r.mark_completed(100, Utc::now()).unwrap();
        // Cannot complete or cancel after completion.
        assert!(completed.mark_completed(100, Utc::now()).is_err());
        assert!(completed.mark_cancelled().is_err());

        let redeemed = completed.mark_redeemed().unwrap();
        // Redeemed is terminal.
        assert!(redeemed.mark_redeemed().is_err());
        assert!(redeemed.mark_cancelled().is_err());
    }
}
