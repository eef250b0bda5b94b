//! Append-only ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a point-bearing award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardType {
    Recycle,
    Streak,
    Badge,
    Challenge,
    Referral,
    Bonus,
}

impl RewardType {
    /// Stable string form used as part of storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::Recycle => "RECYCLE",
            RewardType::Streak => "STREAK",
            RewardType::Badge => "BADGE",
            RewardType::Challenge => "CHALLENGE",
            RewardType::Referral => "REFERRAL",
            RewardType::Bonus => "BONUS",
        }
    }
}

impl std::fmt::Display for RewardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RewardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECYCLE" => Ok(RewardType::Recycle),
            "STREAK" => Ok(RewardType::Streak),
            "BADGE" => Ok(RewardType::Badge),
            "CHALLENGE" => Ok(RewardType::Challenge),
            "REFERRAL" => Ok(RewardType::Referral),
            "BONUS" => Ok(RewardType::Bonus),
            other => Err(format!("unknown reward type: {other}")),
        }
    }
}

/// Immutable audit record of one award.
///
/// The `(user_id, reward_type, reference_id)` tuple is the idempotency key:
/// stores must reject a second entry with the same tuple, which is how a
/// redelivered event becomes a no-op instead of a double award.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reward_type: RewardType,
    /// Points awarded; may be 0, never negative.
    pub points: u64,
    /// External event key: pickup id, badge id, challenge id, referred-user
    /// id, or a synthesized streak key.
    pub reference_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        user_id: Uuid,
        reward_type: RewardType,
        points: u64,
        reference_id: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            reward_type,
            points,
            reference_id: reference_id.into(),
            description: description.into(),
            created_at,
        }
    }

    /// The dedup tuple as a single printable key, for logs and errors.
    pub fn dedup_key(&self) -> String {
        format!("{}/{}/{}", self.user_id, self.reward_type, self.reference_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_type_round_trip() {
        for rt in [
            RewardType::Recycle,
            RewardType::Streak,
            RewardType::Badge,
            RewardType::Challenge,
            RewardType::Referral,
            RewardType::Bonus,
        ] {
            assert_eq!(rt.as_str().parse::<RewardType>().unwrap(), rt);
        }
    }

    #[test]
    fn test_unknown_reward_type_rejected() {
        assert!("PRIZE".parse::<RewardType>().is_err());
    }
}
