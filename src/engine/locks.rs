//! Per-user lock registry.
//!
//! Mutating engine operations for the same user must not interleave, or
//! two concurrent read-modify-write cycles could lose an award. Locks for
//! different users are independent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Hands out one async mutex per user id.
#[derive(Default)]
pub(crate) struct UserLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one user, creating it on first touch.
    ///
    /// The registry lock is held only long enough to clone the per-user
    /// Arc; the (potentially long) wait happens outside it.
    pub async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            Arc::clone(map.entry(user_id).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let user = Uuid::new_v4();
        let counter = Arc::new(Mutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(user).await;
                // Non-atomic read-modify-write; only safe if serialized.
                let read = *counter.lock().await;
                tokio::task::yield_now().await;
                *counter.lock().await = read + 1;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*counter.lock().await, 8);
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        // Would deadlock if user locks were shared.
        let _b = locks.acquire(Uuid::new_v4()).await;
    }
}
