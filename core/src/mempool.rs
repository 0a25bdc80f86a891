//! Fee-priority queue of pending transactions.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use trustify_shared::{Amount, Hash256, Sequence};

use crate::transaction::Transaction;

#[derive(Debug, Clone, Eq, PartialEq)]
struct PriorityKey {
    fee: Amount,
    sequence: Sequence,
    id: Hash256,
}

impl Ord for PriorityKey {
    /// Orders ascending by priority so the *last* element of a `BTreeSet` is
    /// always the transaction `take` should pop next: higher fee first,
    /// lower sequence breaking ties.
    fn cmp(&self, other: &Self) -> Ordering {
        self.fee
            .cmp(&other.fee)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| self.id.as_bytes().cmp(other.id.as_bytes()))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Inner {
    queue: BTreeSet<PriorityKey>,
    by_id: HashMap<Hash256, (PriorityKey, Transaction)>,
}

/// Priority queue keyed by `(fee desc, sequence asc)`, paired with a `by_id`
/// index for membership and removal. The mempool does not validate
/// transactions beyond id uniqueness — that is the ledger's job.
#[derive(Default)]
pub struct Mempool {
    inner: RwLock<Inner>,
}

impl Mempool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `tx` with priority `fee`. Idempotent: a duplicate `tx.id` is a
    /// no-op returning `false`.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    pub fn add(&self, tx: Transaction, fee: Amount) -> bool {
        let mut inner = self.inner.write().expect("mempool lock poisoned");
        if inner.by_id.contains_key(&tx.id) {
            return false;
        }
        let key = PriorityKey {
            fee,
            sequence: tx.sequence,
            id: tx.id,
        };
        inner.queue.insert(key.clone());
        inner.by_id.insert(tx.id, (key, tx));
        true
    }

    /// Removes `id` from both structures.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    pub fn remove(&self, id: &Hash256) -> Option<Transaction> {
        let mut inner = self.inner.write().expect("mempool lock poisoned");
        let (key, tx) = inner.by_id.remove(id)?;
        inner.queue.remove(&key);
        Some(tx)
    }

    /// Pops up to `n` highest-priority transactions.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    pub fn take(&self, n: usize) -> Vec<Transaction> {
        let mut inner = self.inner.write().expect("mempool lock poisoned");
        let mut taken = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(key) = inner.queue.pop_last() else {
                break;
            };
            if let Some((_, tx)) = inner.by_id.remove(&key.id) {
                taken.push(tx);
            }
        }
        taken
    }

    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    #[must_use]
    pub fn contains(&self, id: &Hash256) -> bool {
        self.inner
            .read()
            .expect("mempool lock poisoned")
            .by_id
            .contains_key(id)
    }

    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("mempool lock poisoned").by_id.len()
    }

    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking writer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionData;

    fn review_tx(sequence: Sequence) -> Transaction {
        Transaction::new(
            TransactionData::Review {
                reviewer: trustify_shared::Address::from_bytes(vec![sequence as u8; 32]),
                product_id: "widget".to_string(),
                rating: 5,
            },
            vec![],
            vec![],
            sequence,
            sequence as i64,
        )
        .unwrap()
    }

    #[test]
    fn add_is_idempotent_on_duplicate_id() {
        let pool = Mempool::new();
        let tx = review_tx(0);
        assert!(pool.add(tx.clone(), 5));
        assert!(!pool.add(tx, 5));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn take_returns_non_increasing_fee_order() {
        let pool = Mempool::new();
        pool.add(review_tx(0), 5);
        pool.add(review_tx(1), 10);
        pool.add(review_tx(2), 3);

        let taken = pool.take(2);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].sequence, 1);
        assert_eq!(taken[1].sequence, 0);
    }

    #[test]
    fn equal_fee_breaks_tie_by_lower_sequence() {
        let pool = Mempool::new();
        pool.add(review_tx(5), 10);
        pool.add(review_tx(2), 10);

        let taken = pool.take(1);
        assert_eq!(taken[0].sequence, 2);
    }

    #[test]
    fn remove_deletes_from_both_structures() {
        let pool = Mempool::new();
        let tx = review_tx(0);
        pool.add(tx.clone(), 5);
        assert!(pool.contains(&tx.id));

        let removed = pool.remove(&tx.id).unwrap();
        assert_eq!(removed.id, tx.id);
        assert!(!pool.contains(&tx.id));
        assert!(pool.is_empty());
    }
}
