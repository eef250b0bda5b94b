//! greenledger - Recycling reward engine
//!
//! Converts behavioral domain events (completed pickups, referrals,
//! challenges) into idempotent point awards over an append-only ledger,
//! with per-user aggregates for levels, environmental impact, weekly
//! streaks, challenge progress, badges, and referral state.

pub mod config;
pub mod domain;
pub mod engine;
pub mod interfaces;
pub mod storage;
pub mod test_utils;

pub use engine::RewardEngine;
