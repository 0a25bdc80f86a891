//! Concurrent mapping of outpoints to unspent outputs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use trustify_shared::{Address, Amount, BlockchainError, Hash256};

use crate::Result;

/// Identifies one unspent output: the transaction that created it, and its
/// position in that transaction's output list. Equality and hashing are
/// bytewise over `tx_hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    pub tx_hash: Hash256,
    pub tx_index: u32,
}

impl Outpoint {
    #[must_use]
    pub const fn new(tx_hash: Hash256, tx_index: u32) -> Self {
        Self { tx_hash, tx_index }
    }
}

/// An unspent output: an amount credited to an address, named by its outpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: Outpoint,
    pub owner: Address,
    pub amount: Amount,
}

impl Utxo {
    #[must_use]
    pub const fn new(outpoint: Outpoint, owner: Address, amount: Amount) -> Self {
        Self {
            outpoint,
            owner,
            amount,
        }
    }
}

/// In-memory `outpoint -> UTXO` map, guarded by a single exclusive lock —
/// writes happen only once per block commit, so contention is not a concern.
#[derive(Debug, Default)]
pub struct UtxoSet {
    inner: RwLock<HashMap<Outpoint, Utxo>>,
}

impl UtxoSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts `utxo`.
    ///
    /// # Errors
    /// Returns `DoubleSpending` if `utxo.outpoint` already exists — two
    /// distinct transactions producing the same outpoint is as much a
    /// conflict as two transactions consuming it.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    pub fn add(&self, utxo: Utxo) -> Result<()> {
        let mut guard = self.inner.write().expect("utxo set lock poisoned");
        if guard.contains_key(&utxo.outpoint) {
            return Err(BlockchainError::DoubleSpending);
        }
        guard.insert(utxo.outpoint, utxo);
        Ok(())
    }

    /// Removes and returns the UTXO at `outpoint`.
    ///
    /// # Errors
    /// Returns `UtxoNotFound` if no such outpoint is present.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    pub fn remove(&self, outpoint: &Outpoint) -> Result<Utxo> {
        let mut guard = self.inner.write().expect("utxo set lock poisoned");
        guard.remove(outpoint).ok_or(BlockchainError::UtxoNotFound)
    }

    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    #[must_use]
    pub fn get(&self, outpoint: &Outpoint) -> Option<Utxo> {
        self.inner
            .read()
            .expect("utxo set lock poisoned")
            .get(outpoint)
            .cloned()
    }

    /// A full clone of every live UTXO, used to seed fork-resolution replay.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Utxo> {
        self.inner
            .read()
            .expect("utxo set lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Linear scan over every UTXO owned by `address`. Used only at wallet
    /// startup; no index is maintained for it.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    #[must_use]
    pub fn by_address(&self, address: &Address) -> Vec<Utxo> {
        self.inner
            .read()
            .expect("utxo set lock poisoned")
            .values()
            .filter(|utxo| &utxo.owner == address)
            .cloned()
            .collect()
    }

    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("utxo set lock poisoned").len()
    }

    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("utxo set lock poisoned").is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: u8) -> Address {
        Address::from_bytes(vec![tag; 32])
    }

    #[test]
    fn add_then_get_then_remove_roundtrips() {
        let set = UtxoSet::new();
        let outpoint = Outpoint::new(Hash256::zero(), 0);
        let utxo = Utxo::new(outpoint, addr(1), 100);

        set.add(utxo.clone()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&outpoint), Some(utxo.clone()));

        let removed = set.remove(&outpoint).unwrap();
        assert_eq!(removed, utxo);
        assert!(set.is_empty());
    }

    #[test]
    fn add_rejects_duplicate_outpoint() {
        let set = UtxoSet::new();
        let outpoint = Outpoint::new(Hash256::zero(), 0);
        set.add(Utxo::new(outpoint, addr(1), 100)).unwrap();
        let err = set.add(Utxo::new(outpoint, addr(2), 50)).unwrap_err();
        assert!(matches!(err, BlockchainError::DoubleSpending));
    }

    #[test]
    fn remove_missing_outpoint_fails() {
        let set = UtxoSet::new();
        let err = set.remove(&Outpoint::new(Hash256::zero(), 0)).unwrap_err();
        assert!(matches!(err, BlockchainError::UtxoNotFound));
    }

    #[test]
    fn by_address_filters_to_owner() {
        let set = UtxoSet::new();
        set.add(Utxo::new(Outpoint::new(Hash256::zero(), 0), addr(1), 10))
            .unwrap();
        set.add(Utxo::new(Outpoint::new(Hash256::zero(), 1), addr(2), 20))
            .unwrap();

        let owned = set.by_address(&addr(1));
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].amount, 10);
    }
}
