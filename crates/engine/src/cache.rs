//! Read-through cache of account balances for display purposes.
//!
//! Never consulted by merge or undo: those always sum the live records inside
//! their transaction. Every commit that moves records or changes amounts
//! invalidates the accounts it touched.

use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use uuid::Uuid;

#[derive(Debug, Default)]
pub struct BalanceCache {
    balances: RwLock<HashMap<Uuid, i64>>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, i64>> {
        self.balances.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, i64>> {
        self.balances
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, account_id: &Uuid) -> Option<i64> {
        self.read().get(account_id).copied()
    }

    pub fn insert(&self, account_id: Uuid, balance: i64) {
        self.write().insert(account_id, balance);
    }

    pub fn invalidate(&self, account_ids: &[Uuid]) {
        let mut balances = self.write();
        for id in account_ids {
            balances.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidate_only_drops_named_accounts() {
        let cache = BalanceCache::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        cache.insert(a, 300);
        cache.insert(b, 100);

        cache.invalidate(&[a]);
        assert_eq!(cache.get(&a), None);
        assert_eq!(cache.get(&b), Some(100));

        cache.invalidate(&[b]);
        assert!(cache.is_empty());
    }
}
