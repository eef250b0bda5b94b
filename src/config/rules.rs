//! Reward rule tables.
//!
//! Every numeric constant the engine uses (point values, level thresholds,
//! CO2 factors, carbon-score bands) lives here so tests and deployments can
//! run with alternate rule sets instead of hard-coded values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Material categories accepted for recycling pickups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialType {
    Plastic,
    Paper,
    Glass,
    Metal,
    Organic,
    Electronic,
    Textile,
    Other,
}

impl std::fmt::Display for MaterialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MaterialType::Plastic => "plastic",
            MaterialType::Paper => "paper",
            MaterialType::Glass => "glass",
            MaterialType::Metal => "metal",
            MaterialType::Organic => "organic",
            MaterialType::Electronic => "electronic",
            MaterialType::Textile => "textile",
            MaterialType::Other => "other",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for MaterialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plastic" => Ok(MaterialType::Plastic),
            "paper" => Ok(MaterialType::Paper),
            "glass" => Ok(MaterialType::Glass),
            "metal" => Ok(MaterialType::Metal),
            "organic" => Ok(MaterialType::Organic),
            "electronic" => Ok(MaterialType::Electronic),
            "textile" => Ok(MaterialType::Textile),
            "other" => Ok(MaterialType::Other),
            other => Err(format!("unknown material type: {other}")),
        }
    }
}

/// One band of the carbon-score scale: grade applies when cumulative
/// CO2 saved is at least `min_co2_kg`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonBand {
    pub min_co2_kg: f64,
    pub grade: String,
}

/// Reward rule tables injected into the engine at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardRules {
    /// One-time bonus on a user's first ever recycle.
    pub first_recycle_bonus: u64,
    /// Points per kilogram of recycled weight.
    pub points_per_kg: u64,
    /// Points for maintaining the weekly streak.
    pub weekly_streak_points: u64,
    /// Points credited to the referrer when a referral completes.
    pub referral_points: u64,
    /// Fixed bonus credited when a badge unlocks.
    pub badge_earned_points: u64,
    /// Wallet units per referral point at redemption time.
    pub redemption_multiplier: u64,
    /// Ascending point totals at which the next level starts.
    pub level_thresholds: Vec<u64>,
    /// Maximum gap in days before a streak breaks.
    pub streak_interval_days: u32,
    /// kg CO2 saved per kg recycled, by material.
    pub co2_factors: HashMap<MaterialType, f64>,
    /// Factor applied to materials missing from the table.
    pub default_co2_factor: f64,
    /// kg CO2 represented by one tree equivalent.
    pub co2_kg_per_tree: f64,
    /// Descending carbon-score bands; first band at or below the
    /// cumulative CO2 saved wins.
    pub carbon_bands: Vec<CarbonBand>,
    /// Grade when no band matches.
    pub carbon_floor_grade: String,
}

impl Default for RewardRules {
    fn default() -> Self {
        Self {
            first_recycle_bonus: 50,
            points_per_kg: 20,
            weekly_streak_points: 30,
            referral_points: 100,
            badge_earned_points: 25,
            redemption_multiplier: 10,
            level_thresholds: vec![500, 2000],
            streak_interval_days: 7,
            co2_factors: default_co2_factors(),
            default_co2_factor: 2.0,
            co2_kg_per_tree: 22.0,
            carbon_bands: default_carbon_bands(),
            carbon_floor_grade: "F".to_string(),
        }
    }
}

impl RewardRules {
    /// kg CO2 saved per kg recycled for a material.
    pub fn co2_factor(&self, material: MaterialType) -> f64 {
        self.co2_factors
            .get(&material)
            .copied()
            .unwrap_or(self.default_co2_factor)
    }

    /// Level and points remaining until the next one for a point total.
    ///
    /// Levels start at 1; `points_to_next_level` is 0 at the top level.
    pub fn level_for(&self, total_points: u64) -> (u8, u64) {
        let mut level = 1u8;
        for threshold in &self.level_thresholds {
            if total_points >= *threshold {
                level += 1;
            } else {
                return (level, threshold - total_points);
            }
        }
        (level, 0)
    }

    /// Letter grade for a cumulative amount of CO2 saved.
    pub fn carbon_grade(&self, co2_saved_kg: f64) -> String {
        self.carbon_bands
            .iter()
            .find(|band| co2_saved_kg >= band.min_co2_kg)
            .map(|band| band.grade.clone())
            .unwrap_or_else(|| self.carbon_floor_grade.clone())
    }
}

fn default_co2_factors() -> HashMap<MaterialType, f64> {
    HashMap::from([
        (MaterialType::Plastic, 2.5),
        (MaterialType::Paper, 1.5),
        (MaterialType::Glass, 0.3),
        (MaterialType::Metal, 6.0),
        (MaterialType::Organic, 0.5),
        (MaterialType::Electronic, 8.0),
        (MaterialType::Textile, 3.0),
    ])
}

fn default_carbon_bands() -> Vec<CarbonBand> {
    [
        (500.0, "A+"),
        (300.0, "A"),
        (200.0, "B+"),
        (100.0, "B"),
        (50.0, "C+"),
        (25.0, "C"),
        (10.0, "D+"),
        (5.0, "D"),
    ]
    .into_iter()
    .map(|(min_co2_kg, grade)| CarbonBand {
        min_co2_kg,
        grade: grade.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        let rules = RewardRules::default();
        assert_eq!(rules.level_for(0), (1, 500));
        assert_eq!(rules.level_for(499), (1, 1));
        assert_eq!(rules.level_for(500), (2, 1500));
        assert_eq!(rules.level_for(1999), (2, 1));
        assert_eq!(rules.level_for(2000), (3, 0));
        assert_eq!(rules.level_for(1_000_000), (3, 0));
    }

    #[test]
    fn test_co2_factor_table() {
        let rules = RewardRules::default();
        assert_eq!(rules.co2_factor(MaterialType::Plastic), 2.5);
        assert_eq!(rules.co2_factor(MaterialType::Electronic), 8.0);
        assert_eq!(rules.co2_factor(MaterialType::Other), 2.0);
    }

    #[test]
    fn test_carbon_grades() {
        let rules = RewardRules::default();
        assert_eq!(rules.carbon_grade(0.0), "F");
        assert_eq!(rules.carbon_grade(4.9), "F");
        assert_eq!(rules.carbon_grade(5.0), "D");
        assert_eq!(rules.carbon_grade(12.5), "D+");
        assert_eq!(rules.carbon_grade(125.0), "B");
        assert_eq!(rules.carbon_grade(750.0), "A+");
    }
}
