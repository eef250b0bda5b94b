//! Test utilities and mock implementations.
//!
//! This module provides mock implementations of the collaborator traits
//! for testing the engine without an identity service or wallet backend.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::interfaces::{
    CollaboratorError, CollaboratorResult, UserDirectory, UserProfile, WalletService,
};

/// Mock user directory backed by an in-memory set of known users.
///
/// An empty directory (via `new`) accepts every lookup, which is what most
/// engine tests want; `with_users` restricts lookups to the given set.
#[derive(Default)]
pub struct MockUserDirectory {
    known: Option<HashSet<Uuid>>,
    fail_on_lookup: RwLock<bool>,
}

impl MockUserDirectory {
    /// A directory that resolves every user id.
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory that resolves only the given user ids.
    pub fn with_users(users: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            known: Some(users.into_iter().collect()),
            fail_on_lookup: RwLock::new(false),
        }
    }

    pub async fn set_fail_on_lookup(&self, fail: bool) {
        *self.fail_on_lookup.write().await = fail;
    }
}

#[async_trait]
impl UserDirectory for MockUserDirectory {
    async fn lookup(&self, user_id: Uuid) -> CollaboratorResult<UserProfile> {
        if *self.fail_on_lookup.read().await {
            return Err(CollaboratorError::Unavailable(
                "Mock lookup failure".to_string(),
            ));
        }
        if let Some(known) = &self.known {
            if !known.contains(&user_id) {
                return Err(CollaboratorError::UserNotFound(user_id));
            }
        }
        Ok(UserProfile {
            user_id,
            display_name: format!("user-{user_id}"),
            email_verified: true,
        })
    }
}

/// A single credit recorded by [`MockWallet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletCredit {
    pub user_id: Uuid,
    pub amount: u64,
    pub reference: String,
}

/// Mock wallet that records credits and deduplicates by reference, the
/// same contract the engine relies on from a real wallet.
#[derive(Default)]
pub struct MockWallet {
    credits: RwLock<Vec<WalletCredit>>,
    seen_references: RwLock<HashSet<String>>,
    fail_on_credit: RwLock<bool>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_credit(&self, fail: bool) {
        *self.fail_on_credit.write().await = fail;
    }

    /// All credits that landed, in order. Replayed references do not
    /// appear twice.
    pub async fn credits(&self) -> Vec<WalletCredit> {
        self.credits.read().await.clone()
    }

    /// Sum of all landed credits for one user.
    pub async fn balance(&self, user_id: Uuid) -> u64 {
        self.credits
            .read()
            .await
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.amount)
            .sum()
    }
}

#[async_trait]
impl WalletService for MockWallet {
    async fn credit(&self, user_id: Uuid, amount: u64, reference: &str) -> CollaboratorResult<()> {
        if *self.fail_on_credit.read().await {
            return Err(CollaboratorError::Unavailable(
                "Mock credit failure".to_string(),
            ));
        }
        if !self.seen_references.write().await.insert(reference.to_string()) {
            return Ok(());
        }
        self.credits.write().await.push(WalletCredit {
            user_id,
            amount,
            reference: reference.to_string(),
        });
        Ok(())
    }
}

/// Helper to build an engine over a fresh in-memory store with permissive
/// collaborators. Returns the engine plus handles to the mocks for
/// assertions.
pub fn make_engine_parts() -> (
    Arc<crate::storage::MemoryStore>,
    Arc<MockUserDirectory>,
    Arc<MockWallet>,
    crate::RewardEngine,
) {
    let store = Arc::new(crate::storage::MemoryStore::new());
    let users = Arc::new(MockUserDirectory::new());
    let wallet = Arc::new(MockWallet::new());
    let engine = crate::RewardEngine::new(
        store.stores(),
        users.clone() as Arc<dyn UserDirectory>,
        wallet.clone() as Arc<dyn WalletService>,
        crate::config::RewardRules::default(),
    );
    (store, users, wallet, engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_directory_allows_all_by_default() {
        let directory = MockUserDirectory::new();
        let user = Uuid::new_v4();

        let profile = directory.lookup(user).await.unwrap();
        assert_eq!(profile.user_id, user);
    }

    #[tokio::test]
    async fn test_mock_directory_restricted_set() {
        let known = Uuid::new_v4();
        let directory = MockUserDirectory::with_users([known]);

        assert!(directory.lookup(known).await.is_ok());
        let result = directory.lookup(Uuid::new_v4()).await;
        assert!(matches!(result, Err(CollaboratorError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_mock_directory_fail_on_lookup() {
        let directory = MockUserDirectory::new();
        directory.set_fail_on_lookup(true).await;

        let result = directory.lookup(Uuid::new_v4()).await;
        assert!(matches!(result, Err(CollaboratorError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_mock_wallet_records_credits() {
        let wallet = MockWallet::new();
        let user = Uuid::new_v4();

        wallet.credit(user, 100, "ref-1").await.unwrap();
        wallet.credit(user, 50, "ref-2").await.unwrap();

        assert_eq!(wallet.balance(user).await, 150);
        assert_eq!(wallet.credits().await.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_wallet_dedups_by_reference() {
        let wallet = MockWallet::new();
        let user = Uuid::new_v4();

        wallet.credit(user, 100, "ref-1").await.unwrap();
        wallet.credit(user, 100, "ref-1").await.unwrap();

        assert_eq!(wallet.balance(user).await, 100);
    }

    #[tokio::test]
    async fn test_mock_wallet_fail_on_credit() {
        let wallet = MockWallet::new();
        wallet.set_fail_on_credit(true).await;

        let result = wallet.credit(Uuid::new_v4(), 100, "ref-1").await;
        assert!(result.is_err());
        assert!(wallet.credits().await.is_empty());
    }
}
