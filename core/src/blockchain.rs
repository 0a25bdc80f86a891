//! The two-phase ledger: tentative chain tip, confirmation-depth-gated
//! commit, and peer-driven fork resolution.
//!
//! Blocks are appended to `chain` the moment they pass structural and
//! proof-of-work checks. Only once a block has `confirmation_depth` more
//! blocks mined on top of it does `commit_tail` fold its transactions into
//! `utxo_set`/`purchased`/`reviewed` — until then it is "tentative" and can
//! still be displaced by a longer or higher-fee competing tail.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use trustify_shared::{Address, Amount, BlockHeight, BlockchainError, Hash256, ProductId};

use crate::block::Block;
use crate::getblocks::GetBlocksResponse;
use crate::mempool::Mempool;
use crate::transaction::{Transaction, TransactionData};
use crate::utxo::{Outpoint, Utxo, UtxoSet};
use crate::Result;

/// Computes a purchase's fee — the gap between what its inputs are worth
/// and what its outputs pay out — by looking each input up in `utxo_set`.
/// Used by the miner to size the coinbase, and by the ledger to reinsert a
/// displaced purchase into the mempool at its original priority.
///
/// # Errors
/// Returns `UtxoNotFound` if an input does not name a live UTXO, or
/// `InsufficientFunds` if the inputs are worth less than the outputs.
pub fn purchase_fee(tx: &Transaction, utxo_set: &UtxoSet) -> Result<Amount> {
    let mut input_total: Amount = 0;
    for input in &tx.inputs {
        let utxo = utxo_set
            .get(&input.outpoint)
            .ok_or(BlockchainError::UtxoNotFound)?;
        input_total += utxo.amount;
    }
    let output_total = tx.total_output_value();
    if input_total < output_total {
        return Err(BlockchainError::InsufficientFunds);
    }
    Ok(input_total - output_total)
}

/// The peer-facing half of fork resolution: given a hash this node already
/// has, return the blocks a peer holds strictly after it. An empty result
/// means the peer doesn't recognize the hash or has nothing further.
pub trait ChainSource: Send + Sync {
    /// # Errors
    /// Returns `NetworkError` if the request could not be completed.
    fn fetch_since(&self, last_known_hash: Hash256) -> Result<Vec<Block>>;
}

/// A `ChainSource` with nothing to offer — used where no peer is reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPeers;

impl ChainSource for NoPeers {
    fn fetch_since(&self, _last_known_hash: Hash256) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainStats {
    pub height: BlockHeight,
    pub committed_height: BlockHeight,
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub total_utxos: u64,
}

struct ReplayState {
    utxo: HashMap<Outpoint, Utxo>,
    purchased: HashSet<(Address, ProductId)>,
    reviewed: HashSet<(Address, ProductId)>,
}

/// UTXO ledger plus the committed chain of blocks that produced it.
pub struct Blockchain {
    chain: RwLock<Vec<Block>>,
    block_index: RwLock<HashMap<Hash256, usize>>,
    /// Index of the last block folded into `utxo_set`/`purchased`/`reviewed`,
    /// or `-1` if nothing has been committed yet (genesis included — it sits
    /// behind the confirmation window like any other block).
    committed_index: RwLock<i64>,
    utxo_set: UtxoSet,
    purchased: RwLock<HashSet<(Address, ProductId)>>,
    reviewed: RwLock<HashSet<(Address, ProductId)>>,
    mempool: std::sync::Arc<Mempool>,
    mining_reward: Amount,
    review_reward: Amount,
    confirmation_depth: usize,
    target_hash: Hash256,
    /// Serializes `add_block`/`commit_tail`/`resolve_fork`. Acquired before
    /// any of the finer per-field locks above, never after.
    ledger_lock: Mutex<()>,
}

impl Blockchain {
    /// Bootstraps a ledger from a pre-materialized genesis block. Like any
    /// other block, genesis only becomes committed once `confirmation_depth`
    /// blocks have been mined on top of it — `commit_tail` folds it in the
    /// same way it folds every later block.
    ///
    /// # Errors
    /// Propagates a structural validation error from the genesis block.
    pub fn new(
        genesis: Block,
        mempool: std::sync::Arc<Mempool>,
        mining_reward: Amount,
        review_reward: Amount,
        confirmation_depth: usize,
        target_hash: Hash256,
    ) -> Result<Self> {
        genesis.validate_structure()?;

        let mut block_index = HashMap::new();
        block_index.insert(genesis.header.block_hash, 0);

        let chain = Self {
            chain: RwLock::new(vec![genesis]),
            block_index: RwLock::new(block_index),
            committed_index: RwLock::new(-1),
            utxo_set: UtxoSet::new(),
            purchased: RwLock::new(HashSet::new()),
            reviewed: RwLock::new(HashSet::new()),
            mempool,
            mining_reward,
            review_reward,
            confirmation_depth,
            target_hash,
            ledger_lock: Mutex::new(()),
        };
        chain.commit_tail();
        Ok(chain)
    }

    #[must_use]
    pub fn tip_hash(&self) -> Hash256 {
        self.chain
            .read()
            .expect("chain lock poisoned")
            .last()
            .expect("genesis always present")
            .header
            .block_hash
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tip_height(&self) -> BlockHeight {
        (self.chain.read().expect("chain lock poisoned").len() - 1) as BlockHeight
    }

    #[must_use]
    pub const fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    /// Serves a `GetBlocks` request: everything strictly after `hash`, or
    /// `not_found` if `hash` names no block this node knows.
    #[must_use]
    pub fn blocks_since(&self, hash: Hash256) -> GetBlocksResponse {
        let chain = self.chain.read().expect("chain lock poisoned");
        let block_index = self.block_index.read().expect("block index lock poisoned");
        match block_index.get(&hash) {
            Some(&index) => GetBlocksResponse::found(chain[index + 1..].to_vec()),
            None => GetBlocksResponse::not_found(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> BlockchainStats {
        let chain = self.chain.read().expect("chain lock poisoned");
        BlockchainStats {
            height: self.tip_height(),
            committed_height: (*self.committed_index.read().expect("committed index lock poisoned"))
                .max(0) as BlockHeight,
            total_blocks: chain.len() as u64,
            total_transactions: chain.iter().map(|b| b.transactions.len() as u64).sum(),
            total_utxos: self.utxo_set.len() as u64,
        }
    }

    /// Accepts `block` if it extends the current tip, or hands it to
    /// `resolve_fork` if its `previous_hash` names an earlier block.
    ///
    /// # Errors
    /// Any `BlockchainError` from structural, proof-of-work, or transaction
    /// validation; `NoValidChain` if fork resolution exhausts its candidates.
    pub fn add_block(&self, block: Block, source: &dyn ChainSource) -> Result<()> {
        let _guard = self.ledger_lock.lock().expect("ledger lock poisoned");
        self.validate_block_shape(&block)?;

        let tip_index = self.chain.read().expect("chain lock poisoned").len() - 1;
        let tip_hash = self.tip_hash();

        if block.header.previous_hash == tip_hash {
            self.replay_and_splice(tip_index, vec![block])?;
        } else {
            self.resolve_fork_locked(block, source)?;
        }
        self.commit_tail();
        Ok(())
    }

    /// Structural checks independent of ledger state: merkle root, proof of
    /// work, and the coinbase-first invariant.
    fn validate_block_shape(&self, block: &Block) -> Result<()> {
        block.validate_structure()?;
        if !block.header.meets_target() {
            return Err(BlockchainError::InvalidProofOfWork);
        }
        let recomputed = crate::merkle::root(&block.transactions)?;
        if recomputed != block.header.merkle_root {
            return Err(BlockchainError::InvalidMerkleRoot);
        }
        Ok(())
    }

    /// Walks back from `block.header.previous_hash` to find a locally known
    /// ancestor, fetches the peer's tail from there, and — if it is longer
    /// or (tied, higher total fees) — splices it in over our own tentative
    /// tail. Requires that the divergence point lie at or after the last
    /// committed block; committed history is final.
    fn resolve_fork_locked(&self, block: Block, source: &dyn ChainSource) -> Result<()> {
        let divergence_index = {
            let block_index = self.block_index.read().expect("block index lock poisoned");
            *block_index
                .get(&block.header.previous_hash)
                .ok_or(BlockchainError::NoValidChain)?
        };

        let committed_index = *self
            .committed_index
            .read()
            .expect("committed index lock poisoned");
        if (divergence_index as i64) < committed_index {
            return Err(BlockchainError::NoValidChain);
        }

        let divergence_hash = self.chain.read().expect("chain lock poisoned")[divergence_index]
            .header
            .block_hash;
        let mut candidate_tail = source.fetch_since(divergence_hash)?;
        if candidate_tail.is_empty() || candidate_tail[0].header.block_hash != block.header.block_hash
        {
            candidate_tail = vec![block];
        }

        let our_tail_len = self.chain.read().expect("chain lock poisoned").len() - 1 - divergence_index;
        if candidate_tail.len() < our_tail_len {
            info!("competing fork shorter than current tail, discarding");
            return Ok(());
        }
        if candidate_tail.len() == our_tail_len {
            let ours_fees = self.tail_fees(divergence_index + 1)?;
            let theirs_fees = Self::tail_fee_total(&candidate_tail, &self.utxo_set)?;
            if theirs_fees <= ours_fees {
                info!("competing fork ties on length and does not exceed our fees, discarding");
                return Ok(());
            }
        }

        let displaced: Vec<Block> = self
            .chain
            .read()
            .expect("chain lock poisoned")[divergence_index + 1..]
            .to_vec();

        self.replay_and_splice(divergence_index, candidate_tail)?;

        for block in &displaced {
            for tx in &block.transactions {
                if tx.is_coinbase() {
                    continue;
                }
                let fee = match &tx.data {
                    TransactionData::Purchase { .. } => {
                        purchase_fee(tx, &self.utxo_set).unwrap_or(0)
                    }
                    _ => self.review_reward,
                };
                self.mempool.add(tx.clone(), fee);
            }
        }

        Ok(())
    }

    fn tail_fees(&self, from_index: usize) -> Result<Amount> {
        let chain = self.chain.read().expect("chain lock poisoned");
        Self::tail_fee_total(&chain[from_index..], &self.utxo_set)
    }

    fn tail_fee_total(tail: &[Block], utxo_set: &UtxoSet) -> Result<Amount> {
        let mut total = 0;
        for block in tail {
            for tx in &block.transactions {
                if let TransactionData::Purchase { .. } = tx.data {
                    total += purchase_fee(tx, utxo_set).unwrap_or(0);
                }
            }
        }
        Ok(total)
    }

    /// Validates `tail` by replaying it on top of the committed state plus
    /// whatever tentative blocks survive up to `start_index`, then — only if
    /// every block validates — truncates the in-memory chain to
    /// `start_index` and appends `tail`.
    fn replay_and_splice(&self, start_index: usize, tail: Vec<Block>) -> Result<()> {
        let committed_index = *self
            .committed_index
            .read()
            .expect("committed index lock poisoned");

        let mut state = ReplayState {
            utxo: HashMap::new(),
            purchased: self.purchased.read().expect("purchased lock poisoned").clone(),
            reviewed: self.reviewed.read().expect("reviewed lock poisoned").clone(),
        };
        // Seed the replay map from the live committed UTXO set; committed
        // history through `committed_index` never needs to be replayed.
        for utxo in self.utxo_set.snapshot() {
            state.utxo.insert(utxo.outpoint, utxo);
        }

        let chain = self.chain.read().expect("chain lock poisoned").clone();
        let mut previous_hash = chain[start_index].header.block_hash;
        let mut previous_timestamp = chain[start_index].header.timestamp_ns;
        let mut previous_height = Self::coinbase_height(&chain[start_index])?;

        let replay_start = (committed_index + 1).max(0) as usize;
        for (idx, block) in chain.iter().enumerate().take(start_index + 1).skip(replay_start) {
            if idx == 0 {
                apply_genesis_to_state(block, &mut state);
            } else {
                apply_block_to_state(block, &mut state, self.mining_reward, self.review_reward)?;
            }
        }

        for block in &tail {
            if block.header.previous_hash != previous_hash {
                return Err(BlockchainError::InvalidPreviousHash);
            }
            if block.header.timestamp_ns <= previous_timestamp {
                return Err(BlockchainError::InvalidTimestamp);
            }
            if block.header.target_hash != self.target_hash {
                return Err(BlockchainError::InvalidTargetHash);
            }
            let height = Self::coinbase_height(block)?;
            if height != previous_height + 1 {
                return Err(BlockchainError::InvalidTransactionType);
            }
            apply_block_to_state(block, &mut state, self.mining_reward, self.review_reward)?;
            previous_hash = block.header.block_hash;
            previous_timestamp = block.header.timestamp_ns;
            previous_height = height;
        }

        // Validated: commit the splice.
        let mut chain_guard = self.chain.write().expect("chain lock poisoned");
        let mut index_guard = self.block_index.write().expect("block index lock poisoned");
        for stale in chain_guard[start_index + 1..].iter() {
            index_guard.remove(&stale.header.block_hash);
        }
        chain_guard.truncate(start_index + 1);
        for block in &tail {
            index_guard.insert(block.header.block_hash, chain_guard.len());
            chain_guard.push(block.clone());
        }
        Ok(())
    }

    fn coinbase_height(block: &Block) -> Result<BlockHeight> {
        match block.transactions.first().map(|tx| &tx.data) {
            Some(TransactionData::Coinbase { block_height }) => Ok(*block_height),
            _ => Err(BlockchainError::InvalidTransactionType),
        }
    }

    /// Folds every block that now has `confirmation_depth` confirmations
    /// into `utxo_set`/`purchased`/`reviewed`. Individual apply failures are
    /// logged and skipped rather than panicking — the block already passed
    /// replay validation when it was accepted, so a failure here points at
    /// a bookkeeping bug rather than an invalid block.
    fn commit_tail(&self) {
        let chain_len = self.chain.read().expect("chain lock poisoned").len() as i64;
        let target = chain_len - 1 - self.confirmation_depth as i64;
        let mut committed_index = self
            .committed_index
            .write()
            .expect("committed index lock poisoned");

        while *committed_index < target {
            let next = *committed_index + 1;
            #[allow(clippy::cast_sign_loss)]
            let block = self.chain.read().expect("chain lock poisoned")[next as usize].clone();
            for tx in &block.transactions {
                for input in &tx.inputs {
                    if let Err(e) = self.utxo_set.remove(&input.outpoint) {
                        warn!(error = %e, outpoint = ?input.outpoint, "commit: missing input, skipping");
                    }
                }
                for (i, output) in tx.outputs.iter().enumerate() {
                    let outpoint = Outpoint::new(tx.id, i as u32);
                    if let Err(e) = self.utxo_set.add(Utxo::new(
                        outpoint,
                        output.owner.clone(),
                        output.amount,
                    )) {
                        warn!(error = %e, ?outpoint, "commit: duplicate output, skipping");
                    }
                }
                match &tx.data {
                    TransactionData::Purchase {
                        buyer, product_id, ..
                    } => {
                        self.purchased
                            .write()
                            .expect("purchased lock poisoned")
                            .insert((buyer.clone(), product_id.clone()));
                    }
                    TransactionData::Review {
                        reviewer,
                        product_id,
                        ..
                    } => {
                        self.reviewed
                            .write()
                            .expect("reviewed lock poisoned")
                            .insert((reviewer.clone(), product_id.clone()));
                    }
                    TransactionData::Coinbase { .. } => {}
                }
            }
            *committed_index = next;
        }
    }
}

/// Inserts genesis's coinbase outputs into the replay map. Genesis has no
/// inputs and its coinbase pays out arbitrary `genesis_allocations` rather
/// than `mining_reward + fees`, so it skips the reward-consistency check
/// `apply_block_to_state` applies to every later block.
fn apply_genesis_to_state(block: &Block, state: &mut ReplayState) {
    let coinbase = &block.transactions[0];
    for (i, output) in coinbase.outputs.iter().enumerate() {
        state.utxo.insert(
            Outpoint::new(coinbase.id, i as u32),
            Utxo::new(Outpoint::new(coinbase.id, i as u32), output.owner.clone(), output.amount),
        );
    }
}

fn apply_block_to_state(
    block: &Block,
    state: &mut ReplayState,
    mining_reward: Amount,
    review_reward: Amount,
) -> Result<()> {
    let mut expected_coinbase = mining_reward;
    let mut spent_this_block: HashSet<Outpoint> = HashSet::new();

    for tx in &block.transactions[1..] {
        match &tx.data {
            TransactionData::Purchase {
                buyer, product_id, ..
            } => {
                let mut input_total = 0;
                for input in &tx.inputs {
                    if !spent_this_block.insert(input.outpoint) {
                        return Err(BlockchainError::DoubleSpending);
                    }
                    let utxo = state
                        .utxo
                        .remove(&input.outpoint)
                        .ok_or(BlockchainError::UtxoNotFound)?;
                    input_total += utxo.amount;
                }
                let output_total = tx.total_output_value();
                if input_total < output_total {
                    return Err(BlockchainError::InsufficientFunds);
                }
                expected_coinbase += input_total - output_total;
                for (i, output) in tx.outputs.iter().enumerate() {
                    state.utxo.insert(
                        Outpoint::new(tx.id, i as u32),
                        Utxo::new(Outpoint::new(tx.id, i as u32), output.owner.clone(), output.amount),
                    );
                }
                state.purchased.insert((buyer.clone(), product_id.clone()));
            }
            TransactionData::Review {
                reviewer,
                product_id,
                ..
            } => {
                let key = (reviewer.clone(), product_id.clone());
                if !state.purchased.contains(&key) {
                    return Err(BlockchainError::ProductNotPurchased);
                }
                if state.reviewed.contains(&key) {
                    return Err(BlockchainError::DuplicateReview);
                }
                expected_coinbase += review_reward;
                state.reviewed.insert(key);
            }
            TransactionData::Coinbase { .. } => {
                return Err(BlockchainError::InvalidTransactionType);
            }
        }
    }

    let coinbase = &block.transactions[0];
    if coinbase.total_output_value() != expected_coinbase {
        return Err(BlockchainError::InvalidTransactionType);
    }
    for (i, output) in coinbase.outputs.iter().enumerate() {
        state.utxo.insert(
            Outpoint::new(coinbase.id, i as u32),
            Utxo::new(Outpoint::new(coinbase.id, i as u32), output.owner.clone(), output.amount),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;
    use std::sync::Arc;
    use trustify_shared::Address;

    fn easy_target() -> Hash256 {
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x7f;
        Hash256::from_bytes(bytes)
    }

    fn mined(mut header: BlockHeader, target: Hash256) -> BlockHeader {
        let mut nonce = 0u64;
        loop {
            let candidate = header.with_nonce(nonce).unwrap();
            if candidate.block_hash.meets_target(&target) {
                return candidate;
            }
            nonce += 1;
            header = candidate;
        }
    }

    fn mined_coinbase_block(
        previous_hash: Hash256,
        block_height: BlockHeight,
        timestamp_ns: i64,
        miner: &Address,
        target: Hash256,
    ) -> Block {
        let coinbase = Transaction::new(
            TransactionData::Coinbase { block_height },
            vec![],
            vec![crate::transaction::TxOutput::new(miner.clone(), 50)],
            0,
            timestamp_ns,
        )
        .unwrap();
        let merkle_root = crate::merkle::root(&[coinbase.clone()]).unwrap();
        let header = BlockHeader::new(previous_hash, merkle_root, timestamp_ns, target, 0).unwrap();
        let header = mined(header, target);
        Block::new(header, vec![coinbase])
    }

    fn genesis_chain() -> (Blockchain, Address) {
        let miner = Address::from_bytes(vec![1; 32]);
        let genesis = Block::genesis(vec![(miner.clone(), 1_000)], 1).unwrap();
        let chain = Blockchain::new(
            genesis,
            Arc::new(Mempool::new()),
            50,
            5,
            0,
            easy_target(),
        )
        .unwrap();
        (chain, miner)
    }

    #[test]
    fn new_ledger_commits_genesis_immediately() {
        let (chain, miner) = genesis_chain();
        assert_eq!(chain.utxo_set().by_address(&miner).len(), 1);
        assert_eq!(chain.tip_height(), 0);
    }

    #[test]
    fn add_block_extends_tip_and_commits_after_depth() {
        let (chain, miner) = genesis_chain();
        let target = easy_target();

        let coinbase = Transaction::new(
            TransactionData::Coinbase { block_height: 1 },
            vec![],
            vec![crate::transaction::TxOutput::new(miner.clone(), 50)],
            0,
            2,
        )
        .unwrap();
        let merkle_root = crate::merkle::root(&[coinbase.clone()]).unwrap();
        let header = BlockHeader::new(chain.tip_hash(), merkle_root, 2, target, 0).unwrap();
        let header = mined(header, target);
        let block = Block::new(header, vec![coinbase]);

        chain.add_block(block, &NoPeers).unwrap();
        assert_eq!(chain.tip_height(), 1);
        // confirmation_depth of 0 means every accepted block commits immediately.
        assert_eq!(chain.utxo_set().by_address(&miner).len(), 2);
    }

    #[test]
    fn genesis_stays_tentative_until_confirmation_depth_is_reached() {
        let miner = Address::from_bytes(vec![1; 32]);
        let genesis = Block::genesis(vec![(miner.clone(), 1_000)], 1).unwrap();
        let target = easy_target();
        let genesis_hash = genesis.header.block_hash;
        let chain = Blockchain::new(genesis, Arc::new(Mempool::new()), 50, 5, 2, target).unwrap();

        // confirmation_depth=2: right after init nothing has 2 confirmations yet,
        // so the UTXO set must still be empty.
        assert_eq!(chain.utxo_set().by_address(&miner).len(), 0);
        assert_eq!(chain.stats().committed_height, 0);

        let block_1 = mined_coinbase_block(genesis_hash, 1, 2, &miner, target);
        chain.add_block(block_1.clone(), &NoPeers).unwrap();
        assert_eq!(chain.utxo_set().by_address(&miner).len(), 0);

        let block_2 = mined_coinbase_block(block_1.header.block_hash, 2, 3, &miner, target);
        chain.add_block(block_2, &NoPeers).unwrap();
        // Genesis now has 2 blocks stacked on top of it and commits.
        assert_eq!(chain.utxo_set().by_address(&miner).len(), 1);
    }

    #[test]
    fn add_block_replaces_tentative_tail_with_longer_peer_chain() {
        let miner = Address::from_bytes(vec![1; 32]);
        let genesis = Block::genesis(vec![(miner.clone(), 1_000)], 1).unwrap();
        let target = easy_target();
        let genesis_hash = genesis.header.block_hash;
        let chain = Blockchain::new(genesis, Arc::new(Mempool::new()), 50, 5, 5, target).unwrap();

        let our_block = mined_coinbase_block(genesis_hash, 1, 2, &miner, target);
        chain.add_block(our_block, &NoPeers).unwrap();
        assert_eq!(chain.tip_height(), 1);

        let fork_block_1 = mined_coinbase_block(genesis_hash, 1, 3, &miner, target);
        let fork_block_2 = mined_coinbase_block(fork_block_1.header.block_hash, 2, 4, &miner, target);

        struct StubSource {
            since: Hash256,
            tail: Vec<Block>,
        }
        impl ChainSource for StubSource {
            fn fetch_since(&self, last_known_hash: Hash256) -> Result<Vec<Block>> {
                if last_known_hash == self.since {
                    Ok(self.tail.clone())
                } else {
                    Ok(Vec::new())
                }
            }
        }
        let source = StubSource {
            since: genesis_hash,
            tail: vec![fork_block_1.clone(), fork_block_2.clone()],
        };

        chain.add_block(fork_block_1, &source).unwrap();
        assert_eq!(chain.tip_height(), 2);
        assert_eq!(chain.tip_hash(), fork_block_2.header.block_hash);
    }

    #[test]
    fn add_block_rejects_wrong_previous_hash_with_no_peers() {
        let (chain, miner) = genesis_chain();
        let target = easy_target();

        let coinbase = Transaction::new(
            TransactionData::Coinbase { block_height: 1 },
            vec![],
            vec![crate::transaction::TxOutput::new(miner, 50)],
            0,
            2,
        )
        .unwrap();
        let merkle_root = crate::merkle::root(&[coinbase.clone()]).unwrap();
        let header = BlockHeader::new(Hash256::sha256(b"not the tip"), merkle_root, 2, target, 0).unwrap();
        let header = mined(header, target);
        let block = Block::new(header, vec![coinbase]);

        let err = chain.add_block(block, &NoPeers).unwrap_err();
        assert!(matches!(err, BlockchainError::NoValidChain));
    }

    #[test]
    fn add_block_rejects_intra_block_double_spend() {
        let (chain, miner) = genesis_chain();
        let target = easy_target();
        let outpoint = chain.utxo_set().by_address(&miner)[0].outpoint;

        let coinbase = Transaction::new(
            TransactionData::Coinbase { block_height: 1 },
            vec![],
            vec![crate::transaction::TxOutput::new(miner.clone(), 50)],
            0,
            2,
        )
        .unwrap();
        let buyer = Address::from_bytes(vec![2; 32]);
        let purchase_a = Transaction::new(
            TransactionData::Purchase {
                buyer: buyer.clone(),
                seller: miner.clone(),
                product_id: "widget".to_string(),
                amount: 100,
            },
            vec![crate::transaction::TxInput::new(outpoint)],
            vec![crate::transaction::TxOutput::new(miner.clone(), 100)],
            0,
            3,
        )
        .unwrap();
        let purchase_b = Transaction::new(
            TransactionData::Purchase {
                buyer,
                seller: miner.clone(),
                product_id: "gadget".to_string(),
                amount: 100,
            },
            vec![crate::transaction::TxInput::new(outpoint)],
            vec![crate::transaction::TxOutput::new(miner, 100)],
            1,
            4,
        )
        .unwrap();

        let transactions = vec![coinbase, purchase_a, purchase_b];
        let merkle_root = crate::merkle::root(&transactions).unwrap();
        let header = BlockHeader::new(chain.tip_hash(), merkle_root, 5, target, 0).unwrap();
        let header = mined(header, target);
        let block = Block::new(header, transactions);

        let err = chain.add_block(block, &NoPeers).unwrap_err();
        assert!(matches!(err, BlockchainError::DoubleSpending));
    }
}
