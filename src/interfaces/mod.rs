//! Storage contracts and external collaborator seams.

mod badge_store;
mod challenge_store;
mod collaborators;
mod ledger_store;
mod progress_stores;
mod referral_store;

pub use badge_store::BadgeStore;
pub use challenge_store::ChallengeStore;
pub use collaborators::{
    CollaboratorError, Result as CollaboratorResult, UserDirectory, UserProfile, WalletService,
};
pub use ledger_store::{LedgerStore, Result, StorageError};
pub use progress_stores::{ImpactStore, PointsStore, StreakStore};
pub use referral_store::ReferralStore;
