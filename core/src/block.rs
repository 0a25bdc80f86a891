//! Merkle-anchored block structure.

use serde::{Deserialize, Serialize};
use trustify_shared::{Address, Amount, BlockchainError, Hash256, Timestamp};

use crate::codec;
use crate::merkle;
use crate::transaction::{Transaction, TransactionData};
use crate::Result;

/// The pre-hash content of a header; `block_hash` is hashed over this,
/// including `nonce`, and is never itself part of what gets hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlockHeaderWire {
    previous_hash: Hash256,
    merkle_root: Hash256,
    timestamp_ns: Timestamp,
    target_hash: Hash256,
    nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BlockHeaderWire", from = "BlockHeaderWire")]
pub struct BlockHeader {
    pub block_hash: Hash256,
    pub previous_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp_ns: Timestamp,
    pub target_hash: Hash256,
    pub nonce: u64,
}

impl From<BlockHeaderWire> for BlockHeader {
    fn from(wire: BlockHeaderWire) -> Self {
        let block_hash = codec::hash(&wire).expect("header wire always encodes");
        Self {
            block_hash,
            previous_hash: wire.previous_hash,
            merkle_root: wire.merkle_root,
            timestamp_ns: wire.timestamp_ns,
            target_hash: wire.target_hash,
            nonce: wire.nonce,
        }
    }
}

impl From<BlockHeader> for BlockHeaderWire {
    fn from(header: BlockHeader) -> Self {
        Self {
            previous_hash: header.previous_hash,
            merkle_root: header.merkle_root,
            timestamp_ns: header.timestamp_ns,
            target_hash: header.target_hash,
            nonce: header.nonce,
        }
    }
}

impl BlockHeader {
    /// # Errors
    /// Returns `SerializationError` only if `bincode` itself fails, which
    /// does not happen for these domain types.
    pub fn new(
        previous_hash: Hash256,
        merkle_root: Hash256,
        timestamp_ns: Timestamp,
        target_hash: Hash256,
        nonce: u64,
    ) -> Result<Self> {
        Ok(BlockHeaderWire {
            previous_hash,
            merkle_root,
            timestamp_ns,
            target_hash,
            nonce,
        }
        .into())
    }

    /// Rebuilds this header with a new `nonce`, recomputing `block_hash`.
    /// Used by the miner's nonce loop.
    ///
    /// # Errors
    /// Returns `SerializationError` only if `bincode` itself fails, which
    /// does not happen for these domain types.
    pub fn with_nonce(&self, nonce: u64) -> Result<Self> {
        Self::new(
            self.previous_hash,
            self.merkle_root,
            self.timestamp_ns,
            self.target_hash,
            nonce,
        )
    }

    #[must_use]
    pub fn meets_target(&self) -> bool {
        self.block_hash.meets_target(&self.target_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transaction_count: u32,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assembles a block from an already-built header and canonically
    /// ordered transaction list. Does not validate; callers run the full
    /// ledger validation separately.
    #[must_use]
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transaction_count: transactions.len() as u32,
            transactions,
        }
    }

    /// Builds the pre-materialized genesis block: a single coinbase
    /// distributing `allocations` to their respective addresses.
    ///
    /// # Errors
    /// Returns `EmptyTransactions` if `allocations` is empty, or propagates
    /// a serialization error from header/coinbase construction.
    pub fn genesis(allocations: Vec<(Address, Amount)>, timestamp_ns: Timestamp) -> Result<Self> {
        let outputs = allocations
            .into_iter()
            .map(|(owner, amount)| crate::transaction::TxOutput::new(owner, amount))
            .collect();
        let coinbase = Transaction::new(
            TransactionData::Coinbase { block_height: 0 },
            vec![],
            outputs,
            0,
            timestamp_ns,
        )?;
        let transactions = vec![coinbase];
        let merkle_root = merkle::root(&transactions)?;
        let header = BlockHeader::new(
            Hash256::zero(),
            merkle_root,
            timestamp_ns,
            Hash256::zero(),
            0,
        )?;
        Ok(Self::new(header, transactions))
    }

    /// Structural checks independent of ledger state: non-empty, first
    /// transaction is a coinbase, and no later transaction is one.
    ///
    /// # Errors
    /// Returns `EmptyTransactions` or `InvalidTransactionType`.
    pub fn validate_structure(&self) -> Result<()> {
        let Some(first) = self.transactions.first() else {
            return Err(BlockchainError::EmptyTransactions);
        };
        if !first.is_coinbase() {
            return Err(BlockchainError::InvalidTransactionType);
        }
        if self.transactions[1..].iter().any(Transaction::is_coinbase) {
            return Err(BlockchainError::InvalidTransactionType);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustify_shared::Address;

    #[test]
    fn genesis_block_has_zero_previous_hash_and_single_coinbase() {
        let block = Block::genesis(vec![(Address::from_bytes(vec![1; 32]), 100)], 1).unwrap();
        assert_eq!(block.header.previous_hash, Hash256::zero());
        assert_eq!(block.transactions.len(), 1);
        assert!(block.transactions[0].is_coinbase());
    }

    #[test]
    fn header_hash_changes_with_nonce() {
        let header =
            BlockHeader::new(Hash256::zero(), Hash256::zero(), 1, Hash256::zero(), 0).unwrap();
        let rehashed = header.with_nonce(1).unwrap();
        assert_ne!(header.block_hash, rehashed.block_hash);
    }

    #[test]
    fn header_roundtrips_through_serialization() {
        let header =
            BlockHeader::new(Hash256::zero(), Hash256::zero(), 1, Hash256::zero(), 7).unwrap();
        let bytes = codec::serialize(&header).unwrap();
        let back: BlockHeader = codec::deserialize(&bytes).unwrap();
        assert_eq!(header, back);
    }

    #[test]
    fn validate_structure_rejects_missing_coinbase() {
        let block = Block {
            header: BlockHeader::new(Hash256::zero(), Hash256::zero(), 1, Hash256::zero(), 0)
                .unwrap(),
            transaction_count: 0,
            transactions: vec![],
        };
        assert!(matches!(
            block.validate_structure().unwrap_err(),
            BlockchainError::EmptyTransactions
        ));
    }
}
