//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query
//! building. The UNIQUE indexes below are load-bearing: they are what
//! turns a redelivered event into a duplicate-key rejection.

use sea_query::Iden;

/// Ledger entries table schema.
#[derive(Iden)]
pub enum LedgerEntries {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "reward_type"]
    RewardType,
    #[iden = "points"]
    Points,
    #[iden = "reference_id"]
    ReferenceId,
    #[iden = "description"]
    Description,
    #[iden = "created_at"]
    CreatedAt,
}

/// Points accounts table schema.
#[derive(Iden)]
pub enum PointsAccounts {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "total_points"]
    TotalPoints,
    #[iden = "current_level"]
    CurrentLevel,
    #[iden = "points_to_next_level"]
    PointsToNextLevel,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Environmental impact table schema.
#[derive(Iden)]
pub enum EnvironmentalImpacts {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "total_kg_recycled"]
    TotalKgRecycled,
    #[iden = "co2_saved_kg"]
    Co2SavedKg,
    #[iden = "trees_equivalent"]
    TreesEquivalent,
    #[iden = "carbon_score"]
    CarbonScore,
    #[iden = "last_updated_at"]
    LastUpdatedAt,
}

/// Streaks table schema.
#[derive(Iden)]
pub enum Streaks {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "current_streak_count"]
    CurrentStreakCount,
    #[iden = "best_streak"]
    BestStreak,
    #[iden = "last_recycle_date"]
    LastRecycleDate,
    #[iden = "streak_interval_days"]
    StreakIntervalDays,
    #[iden = "is_active"]
    IsActive,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Challenge definitions table schema.
#[derive(Iden)]
pub enum ChallengeDefinitions {
    Table,
    #[iden = "challenge_id"]
    ChallengeId,
    #[iden = "title"]
    Title,
    #[iden = "goal_type"]
    GoalType,
    #[iden = "target_value"]
    TargetValue,
    #[iden = "reward_points"]
    RewardPoints,
    #[iden = "start_date"]
    StartDate,
    #[iden = "end_date"]
    EndDate,
    #[iden = "is_active"]
    IsActive,
}

/// Challenge progress table schema.
#[derive(Iden)]
pub enum ChallengeProgressRows {
    #[iden = "challenge_progress"]
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "challenge_id"]
    ChallengeId,
    #[iden = "current_progress"]
    CurrentProgress,
    #[iden = "completed"]
    Completed,
    #[iden = "completed_at"]
    CompletedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Badges table schema.
#[derive(Iden)]
pub enum Badges {
    Table,
    #[iden = "badge_id"]
    BadgeId,
    #[iden = "name"]
    Name,
    #[iden = "description"]
    Description,
    #[iden = "icon"]
    Icon,
    #[iden = "criteria"]
    Criteria,
    #[iden = "is_active"]
    IsActive,
}

/// User badges table schema.
#[derive(Iden)]
pub enum UserBadges {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "badge_id"]
    BadgeId,
    #[iden = "earned_at"]
    EarnedAt,
    #[iden = "source_event_id"]
    SourceEventId,
}

/// Referral rewards table schema.
#[derive(Iden)]
pub enum ReferralRewards {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "referrer_user_id"]
    ReferrerUserId,
    #[iden = "referred_user_id"]
    ReferredUserId,
    #[iden = "status"]
    Status,
    #[iden = "points_awarded"]
    PointsAwarded,
    #[iden = "completed_at"]
    CompletedAt,
    #[iden = "created_at"]
    CreatedAt,
}

/// SQL for creating the ledger table.
pub const CREATE_LEDGER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    reward_type TEXT NOT NULL,
    points INTEGER NOT NULL,
    reference_id TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_dedup
    ON ledger_entries(user_id, reward_type, reference_id);
CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_entries(user_id, created_at);
"#;

/// SQL for creating the points accounts table.
pub const CREATE_POINTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS points_accounts (
    user_id TEXT PRIMARY KEY,
    total_points INTEGER NOT NULL,
    current_level INTEGER NOT NULL,
    points_to_next_level INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// SQL for creating the environmental impact table.
pub const CREATE_IMPACT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS environmental_impacts (
    user_id TEXT PRIMARY KEY,
    total_kg_recycled REAL NOT NULL,
    co2_saved_kg REAL NOT NULL,
    trees_equivalent INTEGER NOT NULL,
    carbon_score TEXT NOT NULL,
    last_updated_at TEXT NOT NULL
);
"#;

/// SQL for creating the streaks table.
pub const CREATE_STREAKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS streaks (
    user_id TEXT PRIMARY KEY,
    current_streak_count INTEGER NOT NULL,
    best_streak INTEGER NOT NULL,
    last_recycle_date TEXT,
    streak_interval_days INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);
"#;

/// SQL for creating the challenge definitions table.
pub const CREATE_CHALLENGE_DEFINITIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS challenge_definitions (
    challenge_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    goal_type TEXT NOT NULL,
    target_value REAL NOT NULL,
    reward_points INTEGER NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);
"#;

/// SQL for creating the challenge progress table.
pub const CREATE_CHALLENGE_PROGRESS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS challenge_progress (
    user_id TEXT NOT NULL,
    challenge_id TEXT NOT NULL,
    current_progress REAL NOT NULL,
    completed INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, challenge_id)
);
"#;

/// SQL for creating the badges table.
pub const CREATE_BADGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS badges (
    badge_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    icon TEXT NOT NULL,
    criteria TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);
"#;

/// SQL for creating the user badges table.
pub const CREATE_USER_BADGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS user_badges (
    user_id TEXT NOT NULL,
    badge_id TEXT NOT NULL,
    earned_at TEXT NOT NULL,
    source_event_id TEXT NOT NULL,
    PRIMARY KEY (user_id, badge_id)
);
"#;

/// SQL for creating the referral rewards table.
pub const CREATE_REFERRALS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS referral_rewards (
    id TEXT PRIMARY KEY,
    referrer_user_id TEXT NOT NULL,
    referred_user_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    points_awarded INTEGER NOT NULL,
    completed_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referral_rewards(referrer_user_id);
"#;

/// All DDL statements in creation order.
pub const ALL_TABLES: &[&str] = &[
    CREATE_LEDGER_TABLE,
    CREATE_POINTS_TABLE,
    CREATE_IMPACT_TABLE,
    CREATE_STREAKS_TABLE,
    CREATE_CHALLENGE_DEFINITIONS_TABLE,
    CREATE_CHALLENGE_PROGRESS_TABLE,
    CREATE_BADGES_TABLE,
    CREATE_USER_BADGES_TABLE,
    CREATE_REFERRALS_TABLE,
];
