//! Transaction-set commitment.

use trustify_shared::{BlockchainError, Hash256};

use crate::transaction::Transaction;
use crate::Result;

/// Sorts `transactions` ascending by id — this is what removes ordering
/// ambiguity introduced by draining the mempool concurrently, and is the
/// order blocks store their transactions in on the wire.
#[must_use]
pub fn canonical_order(mut transactions: Vec<Transaction>) -> Vec<Transaction> {
    transactions.sort_by(|a, b| a.id.as_bytes().cmp(b.id.as_bytes()));
    transactions
}

/// Computes the Merkle root over `transactions`. The block itself stores
/// its transactions coinbase-first (see `Block::validate_structure`); this
/// function re-sorts a local copy by id first, so the root is reproducible
/// regardless of storage order. Pairwise `SHA-256(left || right)`,
/// duplicating the last node at any level with an odd count.
///
/// # Errors
/// Returns `EmptyTransactions` if `transactions` is empty.
pub fn root(transactions: &[Transaction]) -> Result<Hash256> {
    if transactions.is_empty() {
        return Err(BlockchainError::EmptyTransactions);
    }

    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by(|a, b| a.id.as_bytes().cmp(b.id.as_bytes()));

    let mut level: Vec<Hash256> = ordered.iter().map(|tx| tx.id).collect();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| Hash256::combine(&pair[0], &pair[1]))
            .collect();
    }

    Ok(level[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionData;
    use trustify_shared::Address;

    fn review_tx(sequence: u64, reviewer: u8) -> Transaction {
        Transaction::new(
            TransactionData::Review {
                reviewer: Address::from_bytes(vec![reviewer; 32]),
                product_id: "widget".to_string(),
                rating: 5,
            },
            vec![],
            vec![],
            sequence,
            0,
        )
        .unwrap()
    }

    #[test]
    fn root_rejects_empty_transaction_list() {
        assert!(matches!(
            root(&[]).unwrap_err(),
            BlockchainError::EmptyTransactions
        ));
    }

    #[test]
    fn root_is_order_independent_after_canonicalization() {
        let a = review_tx(0, 1);
        let b = review_tx(1, 2);
        let c = review_tx(2, 3);

        let sorted_ab = canonical_order(vec![a.clone(), b.clone(), c.clone()]);
        let sorted_ba = canonical_order(vec![c, b, a]);

        assert_eq!(root(&sorted_ab).unwrap(), root(&sorted_ba).unwrap());
    }

    #[test]
    fn root_duplicates_last_leaf_on_odd_count() {
        let a = review_tx(0, 1);
        let b = review_tx(1, 2);
        let c = review_tx(2, 3);
        let txs = canonical_order(vec![a, b, c]);

        let leaves: Vec<Hash256> = txs.iter().map(|tx| tx.id).collect();
        let expected_level1 = vec![
            Hash256::combine(&leaves[0], &leaves[1]),
            Hash256::combine(&leaves[2], &leaves[2]),
        ];
        let expected_root = Hash256::combine(&expected_level1[0], &expected_level1[1]);

        assert_eq!(root(&txs).unwrap(), expected_root);
    }
}
