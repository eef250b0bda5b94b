//! Domain model: immutable value records plus pure transition functions.
//!
//! Nothing in this module performs I/O or reads the clock; timestamps and
//! dates are always supplied by the caller, which keeps the state machines
//! independently testable.

mod badge;
mod challenge;
mod impact;
mod ledger;
mod points;
mod referral;
mod streak;

pub use badge::{Badge, BadgeCriteria, BadgeFacts, UserBadge};
pub use challenge::{ChallengeDefinition, ChallengeProgress, GoalType};
pub use impact::EnvironmentalImpact;
pub use ledger::{LedgerEntry, RewardType};
pub use points::PointsAccount;
pub use referral::{ReferralReward, ReferralStatus, TransitionError};
pub use streak::{weekly_award_reference, Streak, StreakOutcome, StreakStatus};
