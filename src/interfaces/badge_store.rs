//! Badge catalog and ownership storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use super::ledger_store::Result;
use crate::domain::{Badge, UserBadge};

/// Badge catalog plus per-user ownership rows.
#[async_trait]
pub trait BadgeStore: Send + Sync {
    /// Create or replace a catalog entry.
    async fn upsert_badge(&self, badge: Badge) -> Result<()>;

    async fn badge(&self, badge_id: Uuid) -> Result<Option<Badge>>;

    /// Catalog entries flagged active.
    async fn active_badges(&self) -> Result<Vec<Badge>>;

    /// Record ownership. A second insert for the same (user, badge) pair
    /// must fail with [`super::StorageError::Duplicate`]; that uniqueness
    /// is the badge dedup guard.
    async fn insert_user_badge(&self, user_badge: UserBadge) -> Result<()>;

    async fn badges_for_user(&self, user_id: Uuid) -> Result<Vec<UserBadge>>;
}
