//! Environmental impact aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{MaterialType, RewardRules};

/// Running recycled-weight totals and derived CO2 metrics for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalImpact {
    pub user_id: Uuid,
    pub total_kg_recycled: f64,
    /// Sum of per-pickup `weight × material factor` contributions.
    pub co2_saved_kg: f64,
    pub trees_equivalent: u32,
    pub carbon_score: String,
    pub last_updated_at: DateTime<Utc>,
}

impl EnvironmentalImpact {
    pub fn new(user_id: Uuid, rules: &RewardRules, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            total_kg_recycled: 0.0,
            co2_saved_kg: 0.0,
            trees_equivalent: 0,
            carbon_score: rules.carbon_grade(0.0),
            last_updated_at: now,
        }
    }

    /// Apply a non-negative recycled-weight delta and rederive the CO2
    /// metrics. Accumulation is commutative: applying w1 then w2 of the
    /// same material ends at the same totals as w2 then w1.
    pub fn add_weight(
        &self,
        weight_kg: f64,
        material: MaterialType,
        rules: &RewardRules,
        now: DateTime<Utc>,
    ) -> Self {
        let co2_saved_kg = self.co2_saved_kg + weight_kg * rules.co2_factor(material);
        Self {
            user_id: self.user_id,
            total_kg_recycled: self.total_kg_recycled + weight_kg,
            co2_saved_kg,
            trees_equivalent: (co2_saved_kg / rules.co2_kg_per_tree).floor() as u32,
            carbon_score: rules.carbon_grade(co2_saved_kg),
            last_updated_at: now,
        }
    }
}
