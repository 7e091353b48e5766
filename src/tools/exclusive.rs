//! Exclusive-execution locks
//!
//! Each exclusivity class maps to one async mutex. Tools in the same class
//! never run at the same time; tools without a class are not serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Class shared by tools that mutate workspace files
pub const FILE_MUTATION: &str = "file_mutation";

/// Lock for a single exclusivity class
pub type ExclusiveLock = Arc<AsyncMutex<()>>;

/// One lock per exclusivity class, created on first use
#[derive(Debug, Clone, Default)]
pub struct ExclusiveLocks {
    locks: Arc<Mutex<HashMap<&'static str, ExclusiveLock>>>,
}

impl ExclusiveLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for `class`, shared by every caller asking for the same class
    pub fn lock_for(&self, class: &'static str) -> ExclusiveLock {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(class)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Number of classes seen so far
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Acquire `lock` if present; the guard releases on drop (including unwinds)
pub async fn acquire(lock: Option<&ExclusiveLock>) -> Option<OwnedMutexGuard<()>> {
    match lock {
        Some(lock) => Some(lock.clone().lock_owned().await),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_class_shares_lock() {
        let locks = ExclusiveLocks::new();
        let a = locks.lock_for(FILE_MUTATION);
        let b = locks.lock_for(FILE_MUTATION);
        let c = locks.lock_for("other");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let locks = ExclusiveLocks::new();
        let lock = locks.lock_for(FILE_MUTATION);

        let guard = acquire(Some(&lock)).await;
        assert!(lock.try_lock().is_err());
        drop(guard);
        assert!(lock.try_lock().is_ok());

        assert!(acquire(None).await.is_none());
    }
}
