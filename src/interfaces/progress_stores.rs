//! Per-user aggregate storage interfaces.
//!
//! All three follow the same read-modify-write shape: the engine loads the
//! current row (or bootstraps a default), applies a pure domain transition,
//! and writes the successor back while holding that user's lock.

use async_trait::async_trait;
use uuid::Uuid;

use super::ledger_store::Result;
use crate::domain::{EnvironmentalImpact, PointsAccount, Streak};

/// Points account persistence.
#[async_trait]
pub trait PointsStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<PointsAccount>>;

    async fn put(&self, account: PointsAccount) -> Result<()>;
}

/// Environmental impact persistence.
#[async_trait]
pub trait ImpactStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<EnvironmentalImpact>>;

    async fn put(&self, impact: EnvironmentalImpact) -> Result<()>;
}

/// Streak persistence.
#[async_trait]
pub trait StreakStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<Streak>>;

    async fn put(&self, streak: Streak) -> Result<()>;
}
