//! In-process exclusive locks over accounts and merge records.
//!
//! Merges and undos first take a lock set, then open their DB transaction.
//! A lock set is granted all-or-nothing, so two operations touching a common
//! account can never interleave, and keys are always taken in ascending
//! [`LockKey`] order.

use std::{
    collections::{BTreeSet, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use uuid::Uuid;

use crate::{EngineError, ResultEngine};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// A lockable resource. Accounts order before merge records, then by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Account(Uuid),
    Merge(Uuid),
}

#[derive(Debug, Default)]
pub struct LockManager {
    held: Mutex<HashSet<LockKey>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<LockKey>> {
        // The set is only touched by short non-panicking sections.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take every key in `keys` or none of them.
    ///
    /// Fails with `Busy` naming the first conflicting key.
    pub fn try_acquire(
        self: &Arc<Self>,
        keys: impl IntoIterator<Item = LockKey>,
    ) -> ResultEngine<LockGuard> {
        let keys: BTreeSet<LockKey> = keys.into_iter().collect();
        let mut held = self.held();
        if let Some(conflict) = keys.iter().find(|key| held.contains(key)) {
            return Err(EngineError::Busy(format!("{conflict:?} is locked")));
        }
        held.extend(keys.iter().copied());
        Ok(LockGuard {
            manager: Arc::clone(self),
            keys,
        })
    }

    /// Like [`try_acquire`](Self::try_acquire), polling for at most `wait`
    /// before giving up with `Busy`.
    pub async fn acquire(
        self: &Arc<Self>,
        keys: impl IntoIterator<Item = LockKey>,
        wait: Duration,
    ) -> ResultEngine<LockGuard> {
        let keys: BTreeSet<LockKey> = keys.into_iter().collect();
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match self.try_acquire(keys.iter().copied()) {
                Err(EngineError::Busy(_)) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                other => return other,
            }
        }
    }

    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.held().contains(key)
    }
}

/// Releases its keys on drop.
#[derive(Debug)]
pub struct LockGuard {
    manager: Arc<LockManager>,
    keys: BTreeSet<LockKey>,
}

impl LockGuard {
    pub fn keys(&self) -> impl Iterator<Item = &LockKey> {
        self.keys.iter()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut held = self.manager.held();
        for key in &self.keys {
            held.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_sets_conflict() {
        let locks = Arc::new(LockManager::new());
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let guard = locks
            .try_acquire([LockKey::Account(a), LockKey::Account(b)])
            .unwrap();
        let err = locks
            .try_acquire([LockKey::Account(c), LockKey::Account(b)])
            .unwrap_err();
        assert!(matches!(err, EngineError::Busy(_)));
        // All-or-nothing: `c` was not taken by the failed attempt.
        assert!(!locks.is_locked(&LockKey::Account(c)));

        drop(guard);
        assert!(!locks.is_locked(&LockKey::Account(a)));
        locks
            .try_acquire([LockKey::Account(c), LockKey::Account(b)])
            .unwrap();
    }

    #[test]
    fn keys_come_out_in_canonical_order() {
        let locks = Arc::new(LockManager::new());
        let (mut lo, mut hi) = (Uuid::new_v4(), Uuid::new_v4());
        if hi < lo {
            std::mem::swap(&mut lo, &mut hi);
        }
        let merge = Uuid::new_v4();

        let guard = locks
            .try_acquire([
                LockKey::Merge(merge),
                LockKey::Account(hi),
                LockKey::Account(lo),
            ])
            .unwrap();
        let keys: Vec<LockKey> = guard.keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                LockKey::Account(lo),
                LockKey::Account(hi),
                LockKey::Merge(merge)
            ]
        );
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let locks = Arc::new(LockManager::new());
        let account = LockKey::Account(Uuid::new_v4());

        let guard = locks.try_acquire([account]).unwrap();
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks
                    .acquire([account], Duration::from_secs(5))
                    .await
                    .map(|_| ())
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(guard);
        assert!(waiter.await.unwrap().is_ok());

        let _held = locks.try_acquire([account]).unwrap();
        let err = locks
            .acquire([account], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Busy(_)));
    }
}
