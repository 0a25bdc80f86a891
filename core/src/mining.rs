//! Block assembly and the proof-of-work loop.
//!
//! Mining is single-threaded per node: there is no nonce-space splitting.
//! Cancellation is cooperative via a single shared `AtomicBool`, checked
//! between nonce trials — the trial in flight always finishes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};
use trustify_shared::{Address, Amount, BlockHeight, Hash256, Timestamp};

use crate::block::{Block, BlockHeader};
use crate::mempool::Mempool;
use crate::merkle;
use crate::transaction::{Transaction, TransactionData, TxOutput};
use crate::utxo::UtxoSet;
use crate::Result;

fn now_nanos() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as Timestamp
}

/// Parameters controlling one mining attempt.
#[derive(Debug, Clone)]
pub struct MiningContext {
    pub miner_address: Address,
    pub block_size: usize,
    pub mining_reward: Amount,
    pub review_reward: Amount,
    pub previous_hash: Hash256,
    pub target_hash: Hash256,
    pub block_height: BlockHeight,
}

/// Single-threaded PoW miner. Holds the shared stop flag consulted each
/// nonce trial; the inbound dispatcher sets it when a competing block
/// extending the same `previous_hash` is accepted.
pub struct Miner {
    stop: Arc<AtomicBool>,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new()
    }
}

impl Miner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A clone of the stop flag, for the inbound dispatcher to set.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Assembles a candidate block from up to `block_size - 1` mempool
    /// transactions plus a synthesized coinbase, then searches for a
    /// nonce satisfying `target_hash`. Returns `Ok(None)` if mining was
    /// cancelled via the stop flag before a solution was found.
    ///
    /// Any purchases the coinbase collected fees for, and any reviews
    /// included, are already removed from `mempool` by the time this
    /// returns — callers re-add them on behalf of a displaced block during
    /// fork resolution, never here.
    ///
    /// # Errors
    /// Propagates codec errors from header/coinbase construction, or the
    /// merkle tree's `EmptyTransactions` if somehow zero transactions
    /// (including the coinbase) were assembled — not reachable in practice
    /// since the coinbase is always present.
    pub fn mine(
        &self,
        mempool: &Mempool,
        utxo_set: &UtxoSet,
        ctx: &MiningContext,
    ) -> Result<Option<Block>> {
        self.stop.store(false, Ordering::Relaxed);

        let candidates = mempool.take(ctx.block_size.saturating_sub(1));
        let coinbase = build_coinbase(&candidates, utxo_set, ctx)?;

        let mut transactions = Vec::with_capacity(candidates.len() + 1);
        transactions.push(coinbase);
        transactions.extend(candidates);

        let merkle_root = merkle::root(&transactions)?;
        let header = BlockHeader::new(
            ctx.previous_hash,
            merkle_root,
            now_nanos(),
            ctx.target_hash,
            0,
        )?;

        let Some(header) = self.search(header)? else {
            return Ok(None);
        };

        info!(nonce = header.nonce, hash = %header.block_hash, "block mined");
        Ok(Some(Block::new(header, transactions)))
    }

    /// The nonce loop proper: increments `nonce` from zero, recomputing the
    /// header hash each trial, until it meets `target_hash` or the stop
    /// flag is set.
    fn search(&self, header: BlockHeader) -> Result<Option<BlockHeader>> {
        let mut nonce: u64 = 0;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                debug!(nonce, "mining cancelled");
                return Ok(None);
            }
            let candidate = header.with_nonce(nonce)?;
            if candidate.meets_target() {
                return Ok(Some(candidate));
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}

/// Builds the coinbase outputs: the mining reward to the miner, then each
/// purchase's fee to the miner, then each review's reward to its reviewer —
/// in that order.
fn build_coinbase(
    candidates: &[Transaction],
    utxo_set: &UtxoSet,
    ctx: &MiningContext,
) -> Result<Transaction> {
    let mut outputs = vec![TxOutput::new(ctx.miner_address.clone(), ctx.mining_reward)];

    for tx in candidates {
        match &tx.data {
            TransactionData::Purchase { .. } => {
                let fee = crate::blockchain::purchase_fee(tx, utxo_set)?;
                outputs.push(TxOutput::new(ctx.miner_address.clone(), fee));
            }
            TransactionData::Review { reviewer, .. } => {
                outputs.push(TxOutput::new(reviewer.clone(), ctx.review_reward));
            }
            TransactionData::Coinbase { .. } => {}
        }
    }

    Transaction::new(
        TransactionData::Coinbase {
            block_height: ctx.block_height,
        },
        vec![],
        outputs,
        0,
        now_nanos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low_target() -> Hash256 {
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x7f;
        Hash256::from_bytes(bytes)
    }

    fn impossible_target() -> Hash256 {
        Hash256::zero()
    }

    #[test]
    fn mine_finds_a_block_under_an_easy_target() {
        let miner = Miner::new();
        let mempool = Mempool::new();
        let utxo_set = UtxoSet::new();
        let ctx = MiningContext {
            miner_address: Address::from_bytes(vec![1; 32]),
            block_size: 4,
            mining_reward: 50,
            review_reward: 5,
            previous_hash: Hash256::zero(),
            target_hash: low_target(),
            block_height: 1,
        };

        let block = miner.mine(&mempool, &utxo_set, &ctx).unwrap().unwrap();
        assert!(block.header.meets_target());
        assert_eq!(block.transactions.len(), 1);
        assert!(block.transactions[0].is_coinbase());
    }

    #[test]
    fn stop_flag_cancels_the_search() {
        let miner = Miner::new();
        let mempool = Mempool::new();
        let utxo_set = UtxoSet::new();
        let ctx = MiningContext {
            miner_address: Address::from_bytes(vec![1; 32]),
            block_size: 4,
            mining_reward: 50,
            review_reward: 5,
            previous_hash: Hash256::zero(),
            target_hash: impossible_target(),
            block_height: 1,
        };

        miner.stop_flag().store(true, Ordering::Relaxed);
        let result = miner.mine(&mempool, &utxo_set, &ctx).unwrap();
        assert!(result.is_none());
    }
}
