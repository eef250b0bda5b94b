//! SQLite implementations of the storage interfaces.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Badge, BadgeCriteria, ChallengeDefinition, ChallengeProgress, EnvironmentalImpact,
    GoalType, LedgerEntry, PointsAccount, ReferralReward, ReferralStatus, RewardType, Streak,
    UserBadge,
};
use crate::engine::EngineStores;
use crate::interfaces::{
    BadgeStore, ChallengeStore, ImpactStore, LedgerStore, PointsStore, ReferralStore, Result,
    StorageError, StreakStore,
};

use super::schema::{
    Badges, ChallengeDefinitions, ChallengeProgressRows, EnvironmentalImpacts, LedgerEntries,
    PointsAccounts, ReferralRewards, Streaks, UserBadges, ALL_TABLES,
};

/// SQLite implementation of every engine storage interface.
///
/// Duplicate-key rejections come from the UNIQUE indexes in the schema,
/// so they hold across processes, not just tasks.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        for ddl in ALL_TABLES {
            sqlx::raw_sql(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Bundle this store into engine handles.
    pub fn stores(self: &std::sync::Arc<Self>) -> EngineStores {
        EngineStores {
            ledger: std::sync::Arc::clone(self) as _,
            points: std::sync::Arc::clone(self) as _,
            impact: std::sync::Arc::clone(self) as _,
            streaks: std::sync::Arc::clone(self) as _,
            challenges: std::sync::Arc::clone(self) as _,
            badges: std::sync::Arc::clone(self) as _,
            referrals: std::sync::Arc::clone(self) as _,
        }
    }
}

/// Map a unique-constraint violation to [`StorageError::Duplicate`].
fn insert_error(key: String) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |e| {
        let unique = matches!(
            &e,
            sqlx::Error::Database(db)
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
        );
        if unique {
            StorageError::Duplicate { key }
        } else {
            StorageError::Database(e)
        }
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(value)?)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp {value:?}: {e}")))
}

fn parse_opt_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn parse_opt_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .as_deref()
        .map(|s| {
            s.parse::<NaiveDate>()
                .map_err(|e| StorageError::Corrupt(format!("date {s:?}: {e}")))
        })
        .transpose()
}

fn parse_tagged<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse::<T>().map_err(StorageError::Corrupt)
}

fn ledger_entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: parse_uuid(row.get("id"))?,
        user_id: parse_uuid(row.get("user_id"))?,
        reward_type: parse_tagged(row.get("reward_type"))?,
        points: row.get::<i64, _>("points") as u64,
        reference_id: row.get("reference_id"),
        description: row.get("description"),
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

fn referral_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ReferralReward> {
    Ok(ReferralReward {
        id: parse_uuid(row.get("id"))?,
        referrer_user_id: parse_uuid(row.get("referrer_user_id"))?,
        referred_user_id: parse_uuid(row.get("referred_user_id"))?,
        status: parse_tagged(row.get("status"))?,
        points_awarded: row.get::<i64, _>("points_awarded") as u64,
        completed_at: parse_opt_timestamp(row.get("completed_at"))?,
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

fn definition_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChallengeDefinition> {
    Ok(ChallengeDefinition {
        challenge_id: parse_uuid(row.get("challenge_id"))?,
        title: row.get("title"),
        goal_type: parse_tagged::<GoalType>(row.get("goal_type"))?,
        target_value: row.get("target_value"),
        reward_points: row.get::<i64, _>("reward_points") as u64,
        start_date: parse_timestamp(row.get("start_date"))?,
        end_date: parse_timestamp(row.get("end_date"))?,
        is_active: row.get::<i64, _>("is_active") != 0,
    })
}

fn badge_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Badge> {
    let criteria: BadgeCriteria = serde_json::from_str(row.get::<String, _>("criteria").as_str())?;
    Ok(Badge {
        badge_id: parse_uuid(row.get("badge_id"))?,
        name: row.get("name"),
        description: row.get("description"),
        icon: row.get("icon"),
        criteria,
        is_active: row.get::<i64, _>("is_active") != 0,
    })
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn append(&self, entry: LedgerEntry) -> Result<()> {
        let key = entry.dedup_key();
        let query = Query::insert()
            .into_table(LedgerEntries::Table)
            .columns([
                LedgerEntries::Id,
                LedgerEntries::UserId,
                LedgerEntries::RewardType,
                LedgerEntries::Points,
                LedgerEntries::ReferenceId,
                LedgerEntries::Description,
                LedgerEntries::CreatedAt,
            ])
            .values_panic([
                entry.id.to_string().into(),
                entry.user_id.to_string().into(),
                entry.reward_type.as_str().into(),
                (entry.points as i64).into(),
                entry.reference_id.clone().into(),
                entry.description.clone().into(),
                entry.created_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(insert_error(key))?;
        Ok(())
    }

    async fn find(
        &self,
        user_id: Uuid,
        reward_type: RewardType,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>> {
        let query = Query::select()
            .columns([
                LedgerEntries::Id,
                LedgerEntries::UserId,
                LedgerEntries::RewardType,
                LedgerEntries::Points,
                LedgerEntries::ReferenceId,
                LedgerEntries::Description,
                LedgerEntries::CreatedAt,
            ])
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(LedgerEntries::RewardType).eq(reward_type.as_str()))
            .and_where(Expr::col(LedgerEntries::ReferenceId).eq(reference_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(ledger_entry_from_row).transpose()
    }

    async fn count_by_type(&self, user_id: Uuid, reward_type: RewardType) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(LedgerEntries::Id).count())
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(LedgerEntries::RewardType).eq(reward_type.as_str()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>(0) as u64)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LedgerEntry>> {
        let query = Query::select()
            .columns([
                LedgerEntries::Id,
                LedgerEntries::UserId,
                LedgerEntries::RewardType,
                LedgerEntries::Points,
                LedgerEntries::ReferenceId,
                LedgerEntries::Description,
                LedgerEntries::CreatedAt,
            ])
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::UserId).eq(user_id.to_string()))
            .order_by(LedgerEntries::CreatedAt, Order::Desc)
            .offset(offset)
            .limit(limit)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(LedgerEntries::Id).count())
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::UserId).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>(0) as u64)
    }
}

#[async_trait]
impl PointsStore for SqliteStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<PointsAccount>> {
        let query = Query::select()
            .columns([
                PointsAccounts::UserId,
                PointsAccounts::TotalPoints,
                PointsAccounts::CurrentLevel,
                PointsAccounts::PointsToNextLevel,
                PointsAccounts::UpdatedAt,
            ])
            .from(PointsAccounts::Table)
            .and_where(Expr::col(PointsAccounts::UserId).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.map(|row| {
            Ok(PointsAccount {
                user_id: parse_uuid(row.get("user_id"))?,
                total_points: row.get::<i64, _>("total_points") as u64,
                current_level: row.get::<i64, _>("current_level") as u8,
                points_to_next_level: row.get::<i64, _>("points_to_next_level") as u64,
                updated_at: parse_timestamp(row.get("updated_at"))?,
            })
        })
        .transpose()
    }

    async fn put(&self, account: PointsAccount) -> Result<()> {
        let query = Query::insert()
            .into_table(PointsAccounts::Table)
            .columns([
                PointsAccounts::UserId,
                PointsAccounts::TotalPoints,
                PointsAccounts::CurrentLevel,
                PointsAccounts::PointsToNextLevel,
                PointsAccounts::UpdatedAt,
            ])
            .values_panic([
                account.user_id.to_string().into(),
                (account.total_points as i64).into(),
                i64::from(account.current_level).into(),
                (account.points_to_next_level as i64).into(),
                account.updated_at.to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::column(PointsAccounts::UserId)
                    .update_columns([
                        PointsAccounts::TotalPoints,
                        PointsAccounts::CurrentLevel,
                        PointsAccounts::PointsToNextLevel,
                        PointsAccounts::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ImpactStore for SqliteStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<EnvironmentalImpact>> {
        let query = Query::select()
            .columns([
                EnvironmentalImpacts::UserId,
                EnvironmentalImpacts::TotalKgRecycled,
                EnvironmentalImpacts::Co2SavedKg,
                EnvironmentalImpacts::TreesEquivalent,
                EnvironmentalImpacts::CarbonScore,
                EnvironmentalImpacts::LastUpdatedAt,
            ])
            .from(EnvironmentalImpacts::Table)
            .and_where(Expr::col(EnvironmentalImpacts::UserId).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.map(|row| {
            Ok(EnvironmentalImpact {
                user_id: parse_uuid(row.get("user_id"))?,
                total_kg_recycled: row.get("total_kg_recycled"),
                co2_saved_kg: row.get("co2_saved_kg"),
                trees_equivalent: row.get::<i64, _>("trees_equivalent") as u32,
                carbon_score: row.get("carbon_score"),
                last_updated_at: parse_timestamp(row.get("last_updated_at"))?,
            })
        })
        .transpose()
    }

    async fn put(&self, impact: EnvironmentalImpact) -> Result<()> {
        let query = Query::insert()
            .into_table(EnvironmentalImpacts::Table)
            .columns([
                EnvironmentalImpacts::UserId,
                EnvironmentalImpacts::TotalKgRecycled,
                EnvironmentalImpacts::Co2SavedKg,
                EnvironmentalImpacts::TreesEquivalent,
                EnvironmentalImpacts::CarbonScore,
                EnvironmentalImpacts::LastUpdatedAt,
            ])
            .values_panic([
                impact.user_id.to_string().into(),
                impact.total_kg_recycled.into(),
                impact.co2_saved_kg.into(),
                i64::from(impact.trees_equivalent).into(),
                impact.carbon_score.clone().into(),
                impact.last_updated_at.to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::column(EnvironmentalImpacts::UserId)
                    .update_columns([
                        EnvironmentalImpacts::TotalKgRecycled,
                        EnvironmentalImpacts::Co2SavedKg,
                        EnvironmentalImpacts::TreesEquivalent,
                        EnvironmentalImpacts::CarbonScore,
                        EnvironmentalImpacts::LastUpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StreakStore for SqliteStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<Streak>> {
        let query = Query::select()
            .columns([
                Streaks::UserId,
                Streaks::CurrentStreakCount,
                Streaks::BestStreak,
                Streaks::LastRecycleDate,
                Streaks::StreakIntervalDays,
                Streaks::IsActive,
                Streaks::UpdatedAt,
            ])
            .from(Streaks::Table)
            .and_where(Expr::col(Streaks::UserId).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.map(|row| {
            Ok(Streak {
                user_id: parse_uuid(row.get("user_id"))?,
                current_streak_count: row.get::<i64, _>("current_streak_count") as u32,
                best_streak: row.get::<i64, _>("best_streak") as u32,
                last_recycle_date: parse_opt_date(row.get("last_recycle_date"))?,
                streak_interval_days: row.get::<i64, _>("streak_interval_days") as u32,
                is_active: row.get::<i64, _>("is_active") != 0,
                updated_at: parse_timestamp(row.get("updated_at"))?,
            })
        })
        .transpose()
    }

    async fn put(&self, streak: Streak) -> Result<()> {
        let query = Query::insert()
            .into_table(Streaks::Table)
            .columns([
                Streaks::UserId,
                Streaks::CurrentStreakCount,
                Streaks::BestStreak,
                Streaks::LastRecycleDate,
                Streaks::StreakIntervalDays,
                Streaks::IsActive,
                Streaks::UpdatedAt,
            ])
            .values_panic([
                streak.user_id.to_string().into(),
                i64::from(streak.current_streak_count).into(),
                i64::from(streak.best_streak).into(),
                streak
                    .last_recycle_date
                    .map(|d| d.to_string())
                    .into(),
                i64::from(streak.streak_interval_days).into(),
                i32::from(streak.is_active).into(),
                streak.updated_at.to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::column(Streaks::UserId)
                    .update_columns([
                        Streaks::CurrentStreakCount,
                        Streaks::BestStreak,
                        Streaks::LastRecycleDate,
                        Streaks::StreakIntervalDays,
                        Streaks::IsActive,
                        Streaks::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for SqliteStore {
    async fn upsert_definition(&self, definition: ChallengeDefinition) -> Result<()> {
        let query = Query::insert()
            .into_table(ChallengeDefinitions::Table)
            .columns([
                ChallengeDefinitions::ChallengeId,
                ChallengeDefinitions::Title,
                ChallengeDefinitions::GoalType,
                ChallengeDefinitions::TargetValue,
                ChallengeDefinitions::RewardPoints,
                ChallengeDefinitions::StartDate,
                ChallengeDefinitions::EndDate,
                ChallengeDefinitions::IsActive,
            ])
            .values_panic([
                definition.challenge_id.to_string().into(),
                definition.title.clone().into(),
                definition.goal_type.to_string().into(),
                definition.target_value.into(),
                (definition.reward_points as i64).into(),
                definition.start_date.to_rfc3339().into(),
                definition.end_date.to_rfc3339().into(),
                i32::from(definition.is_active).into(),
            ])
            .on_conflict(
                OnConflict::column(ChallengeDefinitions::ChallengeId)
                    .update_columns([
                        ChallengeDefinitions::Title,
                        ChallengeDefinitions::GoalType,
                        ChallengeDefinitions::TargetValue,
                        ChallengeDefinitions::RewardPoints,
                        ChallengeDefinitions::StartDate,
                        ChallengeDefinitions::EndDate,
                        ChallengeDefinitions::IsActive,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn definition(&self, challenge_id: Uuid) -> Result<Option<ChallengeDefinition>> {
        let query = Query::select()
            .columns([
                ChallengeDefinitions::ChallengeId,
                ChallengeDefinitions::Title,
                ChallengeDefinitions::GoalType,
                ChallengeDefinitions::TargetValue,
                ChallengeDefinitions::RewardPoints,
                ChallengeDefinitions::StartDate,
                ChallengeDefinitions::EndDate,
                ChallengeDefinitions::IsActive,
            ])
            .from(ChallengeDefinitions::Table)
            .and_where(Expr::col(ChallengeDefinitions::ChallengeId).eq(challenge_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(definition_from_row).transpose()
    }

    async fn definitions(&self) -> Result<Vec<ChallengeDefinition>> {
        let query = Query::select()
            .columns([
                ChallengeDefinitions::ChallengeId,
                ChallengeDefinitions::Title,
                ChallengeDefinitions::GoalType,
                ChallengeDefinitions::TargetValue,
                ChallengeDefinitions::RewardPoints,
                ChallengeDefinitions::StartDate,
                ChallengeDefinitions::EndDate,
                ChallengeDefinitions::IsActive,
            ])
            .from(ChallengeDefinitions::Table)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(definition_from_row).collect()
    }

    async fn progress(
        &self,
        user_id: Uuid,
        challenge_id: Uuid,
    ) -> Result<Option<ChallengeProgress>> {
        let query = Query::select()
            .columns([
                ChallengeProgressRows::UserId,
                ChallengeProgressRows::ChallengeId,
                ChallengeProgressRows::CurrentProgress,
                ChallengeProgressRows::Completed,
                ChallengeProgressRows::CompletedAt,
                ChallengeProgressRows::UpdatedAt,
            ])
            .from(ChallengeProgressRows::Table)
            .and_where(Expr::col(ChallengeProgressRows::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(ChallengeProgressRows::ChallengeId).eq(challenge_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.map(|row| {
            Ok(ChallengeProgress {
                user_id: parse_uuid(row.get("user_id"))?,
                challenge_id: parse_uuid(row.get("challenge_id"))?,
                current_progress: row.get("current_progress"),
                completed: row.get::<i64, _>("completed") != 0,
                completed_at: parse_opt_timestamp(row.get("completed_at"))?,
                updated_at: parse_timestamp(row.get("updated_at"))?,
            })
        })
        .transpose()
    }

    async fn put_progress(&self, progress: ChallengeProgress) -> Result<()> {
        let query = Query::insert()
            .into_table(ChallengeProgressRows::Table)
            .columns([
                ChallengeProgressRows::UserId,
                ChallengeProgressRows::ChallengeId,
                ChallengeProgressRows::CurrentProgress,
                ChallengeProgressRows::Completed,
                ChallengeProgressRows::CompletedAt,
                ChallengeProgressRows::UpdatedAt,
            ])
            .values_panic([
                progress.user_id.to_string().into(),
                progress.challenge_id.to_string().into(),
                progress.current_progress.into(),
                i32::from(progress.completed).into(),
                progress.completed_at.map(|t| t.to_rfc3339()).into(),
                progress.updated_at.to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::columns([
                    ChallengeProgressRows::UserId,
                    ChallengeProgressRows::ChallengeId,
                ])
                .update_columns([
                    ChallengeProgressRows::CurrentProgress,
                    ChallengeProgressRows::Completed,
                    ChallengeProgressRows::CompletedAt,
                    ChallengeProgressRows::UpdatedAt,
                ])
                .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn progress_for_user(&self, user_id: Uuid) -> Result<Vec<ChallengeProgress>> {
        let query = Query::select()
            .columns([
                ChallengeProgressRows::UserId,
                ChallengeProgressRows::ChallengeId,
                ChallengeProgressRows::CurrentProgress,
                ChallengeProgressRows::Completed,
                ChallengeProgressRows::CompletedAt,
                ChallengeProgressRows::UpdatedAt,
            ])
            .from(ChallengeProgressRows::Table)
            .and_where(Expr::col(ChallengeProgressRows::UserId).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                Ok(ChallengeProgress {
                    user_id: parse_uuid(row.get("user_id"))?,
                    challenge_id: parse_uuid(row.get("challenge_id"))?,
                    current_progress: row.get("current_progress"),
                    completed: row.get::<i64, _>("completed") != 0,
                    completed_at: parse_opt_timestamp(row.get("completed_at"))?,
                    updated_at: parse_timestamp(row.get("updated_at"))?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl BadgeStore for SqliteStore {
    async fn upsert_badge(&self, badge: Badge) -> Result<()> {
        let criteria = serde_json::to_string(&badge.criteria)?;
        let query = Query::insert()
            .into_table(Badges::Table)
            .columns([
                Badges::BadgeId,
                Badges::Name,
                Badges::Description,
                Badges::Icon,
                Badges::Criteria,
                Badges::IsActive,
            ])
            .values_panic([
                badge.badge_id.to_string().into(),
                badge.name.clone().into(),
                badge.description.clone().into(),
                badge.icon.clone().into(),
                criteria.into(),
                i32::from(badge.is_active).into(),
            ])
            .on_conflict(
                OnConflict::column(Badges::BadgeId)
                    .update_columns([
                        Badges::Name,
                        Badges::Description,
                        Badges::Icon,
                        Badges::Criteria,
                        Badges::IsActive,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn badge(&self, badge_id: Uuid) -> Result<Option<Badge>> {
        let query = Query::select()
            .columns([
                Badges::BadgeId,
                Badges::Name,
                Badges::Description,
                Badges::Icon,
                Badges::Criteria,
                Badges::IsActive,
            ])
            .from(Badges::Table)
            .and_where(Expr::col(Badges::BadgeId).eq(badge_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(badge_from_row).transpose()
    }

    async fn active_badges(&self) -> Result<Vec<Badge>> {
        let query = Query::select()
            .columns([
                Badges::BadgeId,
                Badges::Name,
                Badges::Description,
                Badges::Icon,
                Badges::Criteria,
                Badges::IsActive,
            ])
            .from(Badges::Table)
            .and_where(Expr::col(Badges::IsActive).eq(1))
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(badge_from_row).collect()
    }

    async fn insert_user_badge(&self, user_badge: UserBadge) -> Result<()> {
        let key = format!("{}/{}", user_badge.user_id, user_badge.badge_id);
        let query = Query::insert()
            .into_table(UserBadges::Table)
            .columns([
                UserBadges::UserId,
                UserBadges::BadgeId,
                UserBadges::EarnedAt,
                UserBadges::SourceEventId,
            ])
            .values_panic([
                user_badge.user_id.to_string().into(),
                user_badge.badge_id.to_string().into(),
                user_badge.earned_at.to_rfc3339().into(),
                user_badge.source_event_id.to_string().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(insert_error(key))?;
        Ok(())
    }

    async fn badges_for_user(&self, user_id: Uuid) -> Result<Vec<UserBadge>> {
        let query = Query::select()
            .columns([
                UserBadges::UserId,
                UserBadges::BadgeId,
                UserBadges::EarnedAt,
                UserBadges::SourceEventId,
            ])
            .from(UserBadges::Table)
            .and_where(Expr::col(UserBadges::UserId).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                Ok(UserBadge {
                    user_id: parse_uuid(row.get("user_id"))?,
                    badge_id: parse_uuid(row.get("badge_id"))?,
                    earned_at: parse_timestamp(row.get("earned_at"))?,
                    source_event_id: parse_uuid(row.get("source_event_id"))?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ReferralStore for SqliteStore {
    async fn insert(&self, referral: ReferralReward) -> Result<()> {
        let key = referral.referred_user_id.to_string();
        let query = Query::insert()
            .into_table(ReferralRewards::Table)
            .columns([
                ReferralRewards::Id,
                ReferralRewards::ReferrerUserId,
                ReferralRewards::ReferredUserId,
                ReferralRewards::Status,
                ReferralRewards::PointsAwarded,
                ReferralRewards::CompletedAt,
                ReferralRewards::CreatedAt,
            ])
            .values_panic([
                referral.id.to_string().into(),
                referral.referrer_user_id.to_string().into(),
                referral.referred_user_id.to_string().into(),
                referral.status.to_string().into(),
                (referral.points_awarded as i64).into(),
                referral.completed_at.map(|t| t.to_rfc3339()).into(),
                referral.created_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(insert_error(key))?;
        Ok(())
    }

    async fn find_by_referred(&self, referred_user_id: Uuid) -> Result<Option<ReferralReward>> {
        let query = Query::select()
            .columns([
                ReferralRewards::Id,
                ReferralRewards::ReferrerUserId,
                ReferralRewards::ReferredUserId,
                ReferralRewards::Status,
                ReferralRewards::PointsAwarded,
                ReferralRewards::CompletedAt,
                ReferralRewards::CreatedAt,
            ])
            .from(ReferralRewards::Table)
            .and_where(Expr::col(ReferralRewards::ReferredUserId).eq(referred_user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(referral_from_row).transpose()
    }

    async fn list_for_referrer(&self, referrer_user_id: Uuid) -> Result<Vec<ReferralReward>> {
        let query = Query::select()
            .columns([
                ReferralRewards::Id,
                ReferralRewards::ReferrerUserId,
                ReferralRewards::ReferredUserId,
                ReferralRewards::Status,
                ReferralRewards::PointsAwarded,
                ReferralRewards::CompletedAt,
                ReferralRewards::CreatedAt,
            ])
            .from(ReferralRewards::Table)
            .and_where(Expr::col(ReferralRewards::ReferrerUserId).eq(referrer_user_id.to_string()))
            .order_by(ReferralRewards::CreatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(referral_from_row).collect()
    }

    async fn put(&self, referral: ReferralReward) -> Result<()> {
        let query = Query::update()
            .table(ReferralRewards::Table)
            .values([
                (ReferralRewards::Status, referral.status.to_string().into()),
                (
                    ReferralRewards::PointsAwarded,
                    (referral.points_awarded as i64).into(),
                ),
                (
                    ReferralRewards::CompletedAt,
                    referral.completed_at.map(|t| t.to_rfc3339()).into(),
                ),
            ])
            .and_where(Expr::col(ReferralRewards::Id).eq(referral.id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "referral",
                key: referral.id.to_string(),
            });
        }
        Ok(())
    }

    async fn redeem_completed(&self, referrer_user_id: Uuid) -> Result<Vec<ReferralReward>> {
        let completed = self
            .list_for_referrer(referrer_user_id)
            .await?
            .into_iter()
            .filter(|r| r.status == ReferralStatus::Completed)
            .collect::<Vec<_>>();
        if completed.is_empty() {
            return Ok(Vec::new());
        }

        // A single UPDATE flips the whole set atomically.
        let query = Query::update()
            .table(ReferralRewards::Table)
            .values([(
                ReferralRewards::Status,
                ReferralStatus::Redeemed.to_string().into(),
            )])
            .and_where(
                Expr::col(ReferralRewards::ReferrerUserId).eq(referrer_user_id.to_string()),
            )
            .and_where(Expr::col(ReferralRewards::Status).eq(ReferralStatus::Completed.to_string()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        completed
            .into_iter()
            .map(|r| {
                r.mark_redeemed()
                    .map_err(|e| StorageError::Corrupt(e.to_string()))
            })
            .collect()
    }
}
