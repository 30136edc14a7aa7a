//! Per-user write locks
//!
//! Ledger credits are single atomic UPDATEs and compose freely, but two paths
//! need a wider critical section: the badge engine's read-evaluate-write pass
//! and recalculation's destructive reset-then-rebuild. Both take the owning
//! user's lock; jobs touching different users never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

static USER_LOCKS: OnceLock<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>> = OnceLock::new();

/// Acquire the write lock for one user's ledger. Held for the duration of the
/// returned guard; different users lock independently.
pub async fn lock_user(user_id: i64) -> OwnedMutexGuard<()> {
    let lock = {
        let registry = USER_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut map = registry.lock().unwrap();
        map.entry(user_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    };
    lock.lock_owned().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_user_serializes_different_users_do_not() {
        let guard_a = lock_user(1).await;
        // A different user's lock is immediately available
        let _guard_b = lock_user(2).await;
        // The same user's lock is not
        assert!(tokio::time::timeout(
            std::time::Duration::from_millis(20),
            lock_user(1)
        )
        .await
        .is_err());
        drop(guard_a);
        let _reacquired = lock_user(1).await;
    }
}
