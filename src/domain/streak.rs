//! Weekly recycling streak state machine.
//!
//! All gap math uses the supplied event date; nothing here reads the wall
//! clock, so redelivered or backfilled events produce the same transitions.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RewardRules;

/// Per-user weekly-continuity state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub user_id: Uuid,
    pub current_streak_count: u32,
    /// Never lower than any past `current_streak_count`.
    pub best_streak: u32,
    pub last_recycle_date: Option<NaiveDate>,
    pub streak_interval_days: u32,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Result of feeding one recycle date into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakOutcome {
    /// First ever recycle: count went 0 -> 1.
    Started,
    /// New recycling day within the interval: count incremented.
    Extended,
    /// Same calendar day as the last recycle; count unchanged.
    SameDay,
    /// Gap exceeded the interval: count reset to 1.
    BrokenRestarted,
}

impl StreakOutcome {
    /// Only a maintained increment qualifies for the weekly point award.
    pub fn maintained(&self) -> bool {
        matches!(self, StreakOutcome::Started | StreakOutcome::Extended)
    }
}

/// Answer to the pure streak-status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakStatus {
    pub is_active: bool,
    pub current_streak_count: u32,
    pub best_streak: u32,
    pub days_until_break: u32,
}

impl Streak {
    pub fn new(user_id: Uuid, rules: &RewardRules, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            current_streak_count: 0,
            best_streak: 0,
            last_recycle_date: None,
            streak_interval_days: rules.streak_interval_days,
            is_active: false,
            updated_at: now,
        }
    }

    /// Feed one recycle date through the state machine.
    ///
    /// Returns the successor state and what happened. Dates earlier than
    /// `last_recycle_date` (out-of-order redelivery) are treated as the
    /// same day: no increment, no reset.
    pub fn apply_recycle(&self, date: NaiveDate, now: DateTime<Utc>) -> (Streak, StreakOutcome) {
        let mut next = self.clone();
        next.updated_at = now;

        let gap = match self.last_recycle_date {
            Some(last) => (date - last).num_days(),
            None => {
                next.current_streak_count = 1;
                next.best_streak = next.best_streak.max(1);
                next.last_recycle_date = Some(date);
                next.is_active = true;
                return (next, StreakOutcome::Started);
            }
        };

        if gap <= 0 {
            next.is_active = true;
            return (next, StreakOutcome::SameDay);
        }

        if gap <= i64::from(self.streak_interval_days) {
            next.current_streak_count = self.current_streak_count + 1;
            next.best_streak = next.best_streak.max(next.current_streak_count);
            next.last_recycle_date = Some(date);
            next.is_active = true;
            (next, StreakOutcome::Extended)
        } else {
            next.current_streak_count = 1;
            next.last_recycle_date = Some(date);
            next.is_active = true;
            (next, StreakOutcome::BrokenRestarted)
        }
    }

    /// Pure status query against a supplied "today".
    pub fn status(&self, today: NaiveDate) -> StreakStatus {
        let (is_active, days_until_break) = match self.last_recycle_date {
            None => (false, 0),
            Some(last) => {
                let gap = (today - last).num_days().max(0);
                let interval = i64::from(self.streak_interval_days);
                if gap <= interval {
                    (true, (interval - gap) as u32)
                } else {
                    (false, 0)
                }
            }
        };
        StreakStatus {
            is_active,
            current_streak_count: self.current_streak_count,
            best_streak: self.best_streak,
            days_until_break,
        }
    }
}

/// Reference key for the weekly streak award: one award per
/// (streak count, calendar week), with the week anchored on Monday.
pub fn weekly_award_reference(streak_count: u32, date: NaiveDate) -> String {
    let week_start = date - chrono::Days::new(date.weekday().days_since(Weekday::Mon) as u64);
    // NaiveDate::default() is the Unix epoch, 1970-01-01.
    let epoch_days = (week_start - NaiveDate::default()).num_days();
    format!("streak_{streak_count}_{epoch_days}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn streak() -> Streak {
        Streak::new(Uuid::new_v4(), &RewardRules::default(), Utc::now())
    }

    #[test]
    fn test_first_recycle_starts_streak() {
        let (next, outcome) = streak().apply_recycle(day(2026, 3, 2), Utc::now());
        assert_eq!(outcome, StreakOutcome::Started);
        assert!(outcome.maintained());
        assert_eq!(next.current_streak_count, 1);
        assert_eq!(next.best_streak, 1);
        assert!(next.is_active);
    }

    #[test]
    fn test_weekly_cadence_strictly_increases() {
        let now = Utc::now();
        let mut s = streak();
        let mut date = day(2026, 3, 2);
        for expected in 1..=10u32 {
            let (next, outcome) = s.apply_recycle(date, now);
            assert!(outcome.maintained());
            assert_eq!(next.current_streak_count, expected);
            s = next;
            date = date + chrono::Days::new(7);
        }
        assert_eq!(s.best_streak, 10);
    }

    #[test]
    fn test_same_day_does_not_increment() {
        let now = Utc::now();
        let (s, _) = streak().apply_recycle(day(2026, 3, 2), now);
        let (next, outcome) = s.apply_recycle(day(2026, 3, 2), now);
        assert_eq!(outcome, StreakOutcome::SameDay);
        assert!(!outcome.maintained());
        assert_eq!(next.current_streak_count, 1);
    }

    #[test]
    fn test_gap_beyond_interval_resets_to_one() {
        let now = Utc::now();
        let mut s = streak();
        for date in [day(2026, 3, 2), day(2026, 3, 9), day(2026, 3, 16)] {
            s = s.apply_recycle(date, now).0;
        }
        assert_eq!(s.current_streak_count, 3);

        let (next, outcome) = s.apply_recycle(day(2026, 3, 30), now);
        assert_eq!(outcome, StreakOutcome::BrokenRestarted);
        assert_eq!(next.current_streak_count, 1);
        assert_eq!(next.best_streak, 3, "best streak survives the break");
    }

    #[test]
    fn test_out_of_order_date_is_harmless() {
        let now = Utc::now();
        let (s, _) = streak().apply_recycle(day(2026, 3, 9), now);
        let (next, outcome) = s.apply_recycle(day(2026, 3, 2), now);
        assert_eq!(outcome, StreakOutcome::SameDay);
        assert_eq!(next.last_recycle_date, Some(day(2026, 3, 9)));
    }

    #[test]
    fn test_status_query() {
        let now = Utc::now();
        let (s, _) = streak().apply_recycle(day(2026, 3, 2), now);

        let active = s.status(day(2026, 3, 5));
        assert!(active.is_active);
        assert_eq!(active.days_until_break, 4);

        let edge = s.status(day(2026, 3, 9));
        assert!(edge.is_active);
        assert_eq!(edge.days_until_break, 0);

        let lapsed = s.status(day(2026, 3, 10));
        assert!(!lapsed.is_active);
        assert_eq!(lapsed.days_until_break, 0);
    }

    #[test]
    fn test_status_without_history_is_inactive() {
        let status = streak().status(day(2026, 3, 2));
        assert!(!status.is_active);
        assert_eq!(status.current_streak_count, 0);
    }

    #[test]
    fn test_weekly_award_reference_is_stable_within_week() {
        // 2026-03-02 is a Monday.
        let a = weekly_award_reference(3, day(2026, 3, 2));
        let b = weekly_award_reference(3, day(2026, 3, 8));
        assert_eq!(a, b);

        let next_week = weekly_award_reference(3, day(2026, 3, 9));
        assert_ne!(a, next_week);

        let other_count = weekly_award_reference(4, day(2026, 3, 2));
        assert_ne!(a, other_count);
    }
}
