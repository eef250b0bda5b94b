//! Read-only query surface.
//!
//! Every query is a plain read over the stores; missing rows come back as
//! sensible defaults rather than errors so callers can render a fresh
//! user's dashboard without special cases.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Badge, ChallengeDefinition, EnvironmentalImpact, LedgerEntry, ReferralReward, ReferralStatus,
    StreakStatus,
};
use crate::engine::{Result, RewardEngine};

/// Points and level summary for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsOverview {
    pub user_id: Uuid,
    pub total_points: u64,
    pub current_level: u8,
    pub points_to_next_level: u64,
}

/// One page of a user's ledger activity, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPage {
    pub entries: Vec<LedgerEntry>,
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

/// An owned badge with its unlock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarnedBadge {
    pub badge: Badge,
    pub earned_at: DateTime<Utc>,
}

/// Earned/locked split of the active badge catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeOverview {
    pub earned: Vec<EarnedBadge>,
    pub locked: Vec<Badge>,
}

/// A challenge definition joined with the user's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub definition: ChallengeDefinition,
    pub current_progress: f64,
    /// Display percentage, capped at 100.
    pub percent: u8,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Active and completed challenges for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeOverview {
    pub active: Vec<ChallengeView>,
    pub completed: Vec<ChallengeView>,
}

/// Counts over a user's referrals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub redeemed: u64,
    pub cancelled: u64,
    /// Sum of points over completed and redeemed referrals.
    pub total_points: u64,
}

/// Referral list plus stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralOverview {
    pub referrals: Vec<ReferralReward>,
    pub stats: ReferralStats,
}

impl RewardEngine {
    /// Point total and level, defaulting to a fresh level-1 account.
    pub async fn points_overview(&self, user_id: Uuid) -> Result<PointsOverview> {
        let account = self.stores().points.get(user_id).await?;
        Ok(match account {
            Some(account) => PointsOverview {
                user_id,
                total_points: account.total_points,
                current_level: account.current_level,
                points_to_next_level: account.points_to_next_level,
            },
            None => {
                let (current_level, points_to_next_level) = self.rules().level_for(0);
                PointsOverview {
                    user_id,
                    total_points: 0,
                    current_level,
                    points_to_next_level,
                }
            }
        })
    }

    /// Paginated ledger activity, newest first. Pages are 1-based; a
    /// zero `per_page` yields an empty page with the total count.
    pub async fn ledger_activity(
        &self,
        user_id: Uuid,
        page: u32,
        per_page: u32,
    ) -> Result<ActivityPage> {
        let page = page.max(1);
        let offset = u64::from(page - 1) * u64::from(per_page);
        let entries = self
            .stores()
            .ledger
            .list_for_user(user_id, offset, u64::from(per_page))
            .await?;
        let total = self.stores().ledger.count_for_user(user_id).await?;
        Ok(ActivityPage {
            entries,
            total,
            page,
            per_page,
        })
    }

    /// Streak status as of a supplied date.
    pub async fn streak_status(&self, user_id: Uuid, today: NaiveDate) -> Result<StreakStatus> {
        let streak = self.stores().streaks.get(user_id).await?;
        Ok(match streak {
            Some(streak) => streak.status(today),
            None => StreakStatus {
                is_active: false,
                current_streak_count: 0,
                best_streak: 0,
                days_until_break: 0,
            },
        })
    }

    /// Environmental impact totals, defaulting to zeros.
    pub async fn impact_summary(&self, user_id: Uuid) -> Result<EnvironmentalImpact> {
        let impact = self.stores().impact.get(user_id).await?;
        Ok(impact
            .unwrap_or_else(|| EnvironmentalImpact::new(user_id, self.rules(), Utc::now())))
    }

    /// Active badges split into earned and still-locked.
    pub async fn badge_overview(&self, user_id: Uuid) -> Result<BadgeOverview> {
        let stores = self.stores();
        let owned = stores.badges.badges_for_user(user_id).await?;
        let catalog = stores.badges.active_badges().await?;

        let mut earned = Vec::new();
        let mut locked = Vec::new();
        for badge in catalog {
            match owned.iter().find(|ub| ub.badge_id == badge.badge_id) {
                Some(ub) => earned.push(EarnedBadge {
                    badge,
                    earned_at: ub.earned_at,
                }),
                None => locked.push(badge),
            }
        }
        Ok(BadgeOverview { earned, locked })
    }

    /// Challenges currently open for the user plus the ones they have
    /// completed, each joined with progress.
    pub async fn challenge_overview(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ChallengeOverview> {
        let stores = self.stores();
        let definitions = stores.challenges.definitions().await?;
        let progress_rows = stores.challenges.progress_for_user(user_id).await?;

        let mut active = Vec::new();
        let mut completed = Vec::new();
        for definition in definitions {
            let progress = progress_rows
                .iter()
                .find(|p| p.challenge_id == definition.challenge_id);
            let (current_progress, percent, completed_at, is_completed) = match progress {
                Some(p) => (
                    p.current_progress,
                    p.percent(definition.target_value),
                    p.completed_at,
                    p.completed,
                ),
                None => (0.0, 0, None, false),
            };
            let view = ChallengeView {
                current_progress,
                percent,
                completed_at,
                definition,
            };
            if is_completed {
                completed.push(view);
            } else if view.definition.is_open_at(now) {
                active.push(view);
            }
        }
        Ok(ChallengeOverview { active, completed })
    }

    /// Referral list and aggregate stats for a referrer.
    pub async fn referral_overview(&self, user_id: Uuid) -> Result<ReferralOverview> {
        let referrals = self.stores().referrals.list_for_referrer(user_id).await?;
        let mut stats = ReferralStats {
            total: referrals.len() as u64,
            ..ReferralStats::default()
        };
        for referral in &referrals {
            match referral.status {
                ReferralStatus::Pending => stats.pending += 1,
                ReferralStatus::Completed => {
                    stats.completed += 1;
                    stats.total_points += referral.points_awarded;
                }
                ReferralStatus::Redeemed => {
                    stats.redeemed += 1;
                    stats.total_points += referral.points_awarded;
                }
                ReferralStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(ReferralOverview { referrals, stats })
    }
}
