//! Badge catalog and criteria evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unlock criteria, one variant per criteria kind.
///
/// Serialized as `{ "type": "...", "value": ... }` to match the catalog
/// representation, but closed so evaluation is exhaustive at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadgeCriteria {
    /// At least N RECYCLE ledger entries (normally 1).
    FirstRecycle(u64),
    /// Total recycled weight at least N kg.
    WeightThreshold(f64),
    /// At least N RECYCLE ledger entries.
    PickupCount(u64),
    /// Best streak at least N weeks.
    StreakWeeks(u32),
    /// At least N completed-or-redeemed referrals.
    ReferralCount(u64),
}

/// Aggregate facts the criteria are evaluated against.
#[derive(Debug, Clone, Copy, Default)]
pub struct BadgeFacts {
    pub recycle_entries: u64,
    pub total_kg_recycled: f64,
    pub best_streak: u32,
    pub completed_referrals: u64,
}

impl BadgeCriteria {
    pub fn is_met(&self, facts: &BadgeFacts) -> bool {
        match *self {
            BadgeCriteria::FirstRecycle(n) => facts.recycle_entries >= n,
            BadgeCriteria::WeightThreshold(kg) => facts.total_kg_recycled >= kg,
            BadgeCriteria::PickupCount(n) => facts.recycle_entries >= n,
            BadgeCriteria::StreakWeeks(n) => facts.best_streak >= n,
            BadgeCriteria::ReferralCount(n) => facts.completed_referrals >= n,
        }
    }
}

/// Catalog entry for a one-time unlockable achievement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub badge_id: Uuid,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub criteria: BadgeCriteria,
    pub is_active: bool,
}

/// Ownership record; a (user, badge) pair exists at most once and badges
/// never un-award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBadge {
    pub user_id: Uuid,
    pub badge_id: Uuid,
    pub earned_at: DateTime<Utc>,
    /// Ledger entry that recorded the award.
    pub source_event_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_evaluation() {
        let facts = BadgeFacts {
            recycle_entries: 3,
            total_kg_recycled: 42.0,
            best_streak: 4,
            completed_referrals: 1,
        };
        assert!(BadgeCriteria::FirstRecycle(1).is_met(&facts));
        assert!(BadgeCriteria::PickupCount(3).is_met(&facts));
        assert!(!BadgeCriteria::PickupCount(4).is_met(&facts));
        assert!(BadgeCriteria::WeightThreshold(42.0).is_met(&facts));
        assert!(!BadgeCriteria::WeightThreshold(42.1).is_met(&facts));
        assert!(BadgeCriteria::StreakWeeks(4).is_met(&facts));
        assert!(!BadgeCriteria::StreakWeeks(5).is_met(&facts));
        assert!(BadgeCriteria::ReferralCount(1).is_met(&facts));
        assert!(!BadgeCriteria::ReferralCount(2).is_met(&facts));
    }

    #[test]
    fn test_criteria_serde_shape() {
        let json = serde_json::to_value(BadgeCriteria::WeightThreshold(100.0)).unwrap();
        assert_eq!(json["type"], "WEIGHT_THRESHOLD");
        assert_eq!(json["value"], 100.0);

        let parsed: BadgeCriteria =
            serde_json::from_str(r#"{"type":"STREAK_WEEKS","value":8}"#).unwrap();
        assert_eq!(parsed, BadgeCriteria::StreakWeeks(8));
    }
}
