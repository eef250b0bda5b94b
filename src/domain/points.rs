//! Points account aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RewardRules;

/// Running point total and derived level for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsAccount {
    pub user_id: Uuid,
    pub total_points: u64,
    /// Derived from `total_points` via the rule thresholds.
    pub current_level: u8,
    /// 0 at the top level.
    pub points_to_next_level: u64,
    pub updated_at: DateTime<Utc>,
}

impl PointsAccount {
    /// Fresh account at level 1 with zero points.
    pub fn new(user_id: Uuid, rules: &RewardRules, now: DateTime<Utc>) -> Self {
        let (current_level, points_to_next_level) = rules.level_for(0);
        Self {
            user_id,
            total_points: 0,
            current_level,
            points_to_next_level,
            updated_at: now,
        }
    }

    /// Apply a non-negative point delta and rederive the level fields.
    pub fn credit(&self, delta: u64, rules: &RewardRules, now: DateTime<Utc>) -> Self {
        let total_points = self.total_points.saturating_add(delta);
        let (current_level, points_to_next_level) = rules.level_for(total_points);
        Self {
            user_id: self.user_id,
            total_points,
            current_level,
            points_to_next_level,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> PointsAccount {
        PointsAccount::new(Uuid::new_v4(), &RewardRules::default(), Utc::now())
    }

    #[test]
    fn test_new_account_is_level_one() {
        let acct = account();
        assert_eq!(acct.total_points, 0);
        assert_eq!(acct.current_level, 1);
        assert_eq!(acct.points_to_next_level, 500);
    }

    #[test]
    fn test_credit_crosses_levels() {
        let rules = RewardRules::default();
        let now = Utc::now();
        let acct = account().credit(499, &rules, now);
        assert_eq!(acct.current_level, 1);
        assert_eq!(acct.points_to_next_level, 1);

        let acct = acct.credit(1, &rules, now);
        assert_eq!(acct.current_level, 2);
        assert_eq!(acct.points_to_next_level, 1500);

        let acct = acct.credit(1500, &rules, now);
        assert_eq!(acct.current_level, 3);
        assert_eq!(acct.points_to_next_level, 0);
    }

    #[test]
    fn test_total_is_monotonic_under_credit() {
        let rules = RewardRules::default();
        let now = Utc::now();
        let mut acct = account();
        for delta in [0, 10, 0, 300] {
            let next = acct.credit(delta, &rules, now);
            assert!(next.total_points >= acct.total_points);
            acct = next;
        }
        assert_eq!(acct.total_points, 310);
    }
}
