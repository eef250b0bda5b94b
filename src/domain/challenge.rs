//! Time-boxed challenge definitions and per-user progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a challenge measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalType {
    Kg,
    Pickups,
    Referrals,
}

impl std::fmt::Display for GoalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GoalType::Kg => "KG",
            GoalType::Pickups => "PICKUPS",
            GoalType::Referrals => "REFERRALS",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for GoalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KG" => Ok(GoalType::Kg),
            "PICKUPS" => Ok(GoalType::Pickups),
            "REFERRALS" => Ok(GoalType::Referrals),
            other => Err(format!("unknown goal type: {other}")),
        }
    }
}

/// Catalog entry for a time-boxed numeric goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDefinition {
    pub challenge_id: Uuid,
    pub title: String,
    pub goal_type: GoalType,
    pub target_value: f64,
    pub reward_points: u64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

impl ChallengeDefinition {
    /// Active for query and progress purposes: flagged active and inside
    /// the [start, end] window.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now >= self.start_date && now <= self.end_date
    }
}

/// One user's progress against one challenge. Created lazily when a
/// matching event first arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeProgress {
    pub user_id: Uuid,
    pub challenge_id: Uuid,
    /// Capped at the definition's target value.
    pub current_progress: f64,
    /// One-way false -> true.
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// Event time of the last advance. Lets redelivery repair skip rows
    /// the original delivery already moved.
    pub updated_at: DateTime<Utc>,
}

impl ChallengeProgress {
    pub fn new(user_id: Uuid, challenge_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            challenge_id,
            current_progress: 0.0,
            completed: false,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Advance progress by `delta` toward `target_value`.
    ///
    /// Returns the successor and whether this advance is the one that
    /// reached the target. Completed progress never moves again.
    pub fn advance(&self, delta: f64, target_value: f64, now: DateTime<Utc>) -> (Self, bool) {
        if self.completed {
            return (self.clone(), false);
        }
        let current_progress = (self.current_progress + delta).min(target_value);
        let just_completed = current_progress >= target_value;
        let next = Self {
            user_id: self.user_id,
            challenge_id: self.challenge_id,
            current_progress,
            completed: just_completed,
            completed_at: if just_completed { Some(now) } else { None },
            updated_at: now,
        };
        (next, just_completed)
    }

    /// Mark completed directly (externally signalled completion).
    pub fn complete(&self, target_value: f64, now: DateTime<Utc>) -> Self {
        Self {
            user_id: self.user_id,
            challenge_id: self.challenge_id,
            current_progress: target_value,
            completed: true,
            completed_at: self.completed_at.or(Some(now)),
            updated_at: now,
        }
    }

    /// Display percentage, capped at 100.
    pub fn percent(&self, target_value: f64) -> u8 {
        if target_value <= 0.0 {
            return 100;
        }
        (100.0 * self.current_progress / target_value).round().min(100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn definition(goal_type: GoalType, target_value: f64) -> ChallengeDefinition {
        ChallengeDefinition {
            challenge_id: Uuid::new_v4(),
            title: "March recycling drive".to_string(),
            goal_type,
            target_value,
            reward_points: 200,
            start_date: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap(),
            is_active: true,
        }
    }

    #[test]
    fn test_open_window() {
        let def = definition(GoalType::Kg, 25.0);
        assert!(def.is_open_at(Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()));
        assert!(!def.is_open_at(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()));
        assert!(!def.is_open_at(Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap()));

        let mut disabled = def;
        disabled.is_active = false;
        assert!(!disabled.is_open_at(Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_advance_caps_at_target() {
        let now = Utc::now();
        let progress = ChallengeProgress::new(Uuid::new_v4(), Uuid::new_v4(), now);
        let (progress, done) = progress.advance(30.0, 25.0, now);
        assert!(done);
        assert_eq!(progress.current_progress, 25.0);
        assert!(progress.completed);
        assert!(progress.completed_at.is_some());
    }

    #[test]
    fn test_advance_after_completion_is_frozen() {
        let now = Utc::now();
        let progress = ChallengeProgress::new(Uuid::new_v4(), Uuid::new_v4(), now);
        let (progress, _) = progress.advance(25.0, 25.0, now);
        let (next, done) = progress.advance(10.0, 25.0, now);
        assert!(!done);
        assert_eq!(next, progress);
    }

    #[test]
    fn test_percent_display() {
        let now = Utc::now();
        let progress = ChallengeProgress::new(Uuid::new_v4(), Uuid::new_v4(), now);
        assert_eq!(progress.percent(25.0), 0);
        let (progress, _) = progress.advance(10.0, 25.0, now);
        assert_eq!(progress.percent(25.0), 40);
        let (progress, _) = progress.advance(2.6, 25.0, now);
        assert_eq!(progress.percent(25.0), 50);
    }
}
