//! Wires the ledger, mempool, miner, and network transport into one running
//! node: an inbound dispatcher, a mining loop, per-peer `GetBlocks` fallback,
//! and the config-driven scripted-transaction emitters used to drive demo
//! traffic.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use trustify_core::{
    Blockchain, ChainSource, Config, GetBlocksResponse, Mempool, MiningContext, Miner, Result,
    Transaction, TransactionData, Wallet,
};
use trustify_shared::{Address, Crypto, Hash256};

use crate::network::{InboundEvent, Network, SignedTransaction};

/// Asks configured peers for blocks since a given hash, bridging the
/// synchronous `ChainSource` the ledger expects onto the async `Network`.
pub struct PeerChainSource {
    network: Arc<Network>,
    peers: Vec<SocketAddr>,
    timeout: Duration,
}

impl ChainSource for PeerChainSource {
    fn fetch_since(&self, last_known_hash: Hash256) -> Result<Vec<trustify_core::Block>> {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                for &peer in &self.peers {
                    match self
                        .network
                        .request_blocks(peer, last_known_hash, self.timeout)
                        .await
                    {
                        Ok(GetBlocksResponse { success: true, blocks }) => return Ok(blocks),
                        Ok(_) => continue,
                        Err(e) => {
                            warn!(%peer, error = %e, "GetBlocks request failed");
                        }
                    }
                }
                Ok(Vec::new())
            })
        })
    }
}

/// Everything one running node needs, bundled for the task spawners below.
pub struct Node {
    pub ledger: Arc<Blockchain>,
    pub mempool: Arc<Mempool>,
    pub network: Arc<Network>,
    pub wallet: Arc<Mutex<Wallet>>,
    pub crypto: Arc<dyn Crypto>,
    pub config: Arc<Config>,
    pub peers: Vec<SocketAddr>,
    /// The stop flag and `previous_hash` of the block currently being mined,
    /// set once per `mining_loop` iteration. `handle_inbound_block` signals
    /// it when an accepted block extends the same tip, so the miner abandons
    /// a now-stale search instead of grinding it to completion.
    pub mining_target: Mutex<Option<(Hash256, Arc<AtomicBool>)>>,
}

impl Node {
    fn chain_source(&self) -> PeerChainSource {
        PeerChainSource {
            network: Arc::clone(&self.network),
            peers: self.peers.clone(),
            timeout: Duration::from_secs(self.config.blockchain_settings.protocols.get_blocks.timeout_seconds),
        }
    }

    /// Runs the node until the process exits: spawns the inbound dispatcher,
    /// the mining loop, and one emitter task per scripted transaction, then
    /// blocks on the inbound listener.
    ///
    /// # Errors
    /// Returns whatever error binding the inbound listener produced.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (tx_events, rx_events) = mpsc::channel(256);

        let dispatcher = Arc::clone(&self);
        tokio::spawn(async move { dispatcher.dispatch_inbound(rx_events).await });

        let miner = Arc::clone(&self);
        tokio::task::spawn_blocking(move || miner.mining_loop());

        for scripted in self.config.transactions.clone() {
            let emitter = Arc::clone(&self);
            tokio::spawn(async move { emitter.run_scripted_transaction(scripted).await });
        }

        self.network.run_inbound(tx_events).await
    }

    async fn dispatch_inbound(self: Arc<Self>, mut events: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                InboundEvent::Transaction(signed) => self.handle_inbound_transaction(signed),
                InboundEvent::Block(block) => self.handle_inbound_block(block),
                InboundEvent::GetBlocks { request, reply } => {
                    let response = self.ledger.blocks_since(request.last_known_hash);
                    let _ = reply.send(response);
                }
            }
        }
    }

    fn handle_inbound_transaction(&self, signed: SignedTransaction) {
        let tx = signed.transaction;
        match self
            .crypto
            .verify(&signed.public_key, &tx.id, &signed.signature)
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(tx = %tx.id, "rejecting transaction with invalid signature");
                return;
            }
            Err(e) => {
                warn!(tx = %tx.id, error = %e, "signature verification failed");
                return;
            }
        }

        let fee = match &tx.data {
            TransactionData::Purchase { .. } => {
                match trustify_core::purchase_fee(&tx, self.ledger.utxo_set()) {
                    Ok(fee) => fee,
                    Err(e) => {
                        warn!(tx = %tx.id, error = %e, "rejecting purchase with unresolvable fee");
                        return;
                    }
                }
            }
            TransactionData::Review { .. } => self.config.blockchain_settings.review_reward,
            TransactionData::Coinbase { .. } => {
                warn!(tx = %tx.id, "rejecting coinbase submitted as a peer transaction");
                return;
            }
        };

        if self.mempool.add(tx.clone(), fee) {
            info!(tx = %tx.id, fee, "admitted transaction to mempool");
        }
    }

    fn handle_inbound_block(&self, block: trustify_core::Block) {
        let hash = block.header.block_hash;
        let previous_hash = block.header.previous_hash;
        match self.ledger.add_block(block, &self.chain_source()) {
            Ok(()) => {
                info!(%hash, height = self.ledger.tip_height(), "accepted block");
                let target = self.mining_target.lock().expect("mining target lock poisoned");
                if let Some((mining_on, stop)) = target.as_ref() {
                    if *mining_on == previous_hash {
                        stop.store(true, Ordering::Relaxed);
                    }
                }
            }
            Err(e) => warn!(%hash, error = %e, "rejected inbound block"),
        }
    }

    /// Single-threaded proof-of-work loop. Assembles and mines a candidate
    /// block from the current mempool and ledger tip, submits and
    /// broadcasts it on success, and loops — picking up whatever new
    /// transactions have arrived since the last attempt.
    fn mining_loop(self: Arc<Self>) {
        let handle = tokio::runtime::Handle::current();
        let settings = &self.config.blockchain_settings;
        let block_size = settings.block_size;
        let mining_reward = settings.mining_reward;
        let review_reward = settings.review_reward;
        let target_hash = match self.config.target_hash() {
            Ok(hash) => hash,
            Err(e) => {
                error!(error = %e, "invalid target_hash in configuration, mining disabled");
                return;
            }
        };
        let miner_address = self.wallet.lock().expect("wallet lock poisoned").address.clone();

        loop {
            let miner = Miner::new();
            let previous_hash = self.ledger.tip_hash();
            let ctx = MiningContext {
                miner_address: miner_address.clone(),
                block_size,
                mining_reward,
                review_reward,
                previous_hash,
                target_hash,
                block_height: self.ledger.tip_height() + 1,
            };

            *self.mining_target.lock().expect("mining target lock poisoned") =
                Some((previous_hash, miner.stop_flag()));

            match miner.mine(&self.mempool, self.ledger.utxo_set(), &ctx) {
                Ok(Some(block)) => {
                    let hash = block.header.block_hash;
                    match self.ledger.add_block(block.clone(), &self.chain_source()) {
                        Ok(()) => {
                            info!(%hash, height = self.ledger.tip_height(), "mined block");
                            handle.block_on(async {
                                if let Err(e) = self.network.broadcast_block(&block).await {
                                    warn!(error = %e, "failed to broadcast mined block");
                                }
                            });
                        }
                        Err(e) => warn!(%hash, error = %e, "mined block rejected by own ledger"),
                    }
                }
                Ok(None) => {}
                Err(e) => error!(error = %e, "mining attempt failed"),
            }
        }
    }

    async fn run_scripted_transaction(self: Arc<Self>, scripted: trustify_core::config::ScriptedTransaction) {
        use trustify_core::config::ScriptedTransaction;

        let (delay, tx) = match scripted {
            ScriptedTransaction::Purchase {
                delay,
                seller_address,
                product_id,
                amount,
                fee,
            } => {
                let seller = match trustify_core::config::decode_address(&seller_address) {
                    Ok(addr) => addr,
                    Err(e) => {
                        error!(error = %e, "invalid seller_address in scripted transaction");
                        return;
                    }
                };
                let tx = {
                    let mut wallet = self.wallet.lock().expect("wallet lock poisoned");
                    wallet.new_purchase(seller, amount, fee, product_id)
                };
                (delay, tx.map(|tx| (tx, fee)))
            }
            ScriptedTransaction::Review {
                delay,
                product_id,
                rating,
            } => {
                let tx = {
                    let mut wallet = self.wallet.lock().expect("wallet lock poisoned");
                    wallet.new_review(product_id, rating)
                };
                let review_reward = self.config.blockchain_settings.review_reward;
                (delay, tx.map(|tx| (tx, review_reward)))
            }
        };

        tokio::time::sleep(Duration::from_secs(delay)).await;

        let (tx, fee) = match tx {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "failed to build scripted transaction");
                return;
            }
        };

        self.submit_and_broadcast(tx, fee).await;
    }

    async fn submit_and_broadcast(&self, tx: Transaction, fee: trustify_shared::Amount) {
        let (signature, public_key) = {
            let wallet = self.wallet.lock().expect("wallet lock poisoned");
            let signature = match wallet.sign_transaction(&tx, self.crypto.as_ref()) {
                Ok(sig) => sig,
                Err(e) => {
                    error!(error = %e, "failed to sign scripted transaction");
                    return;
                }
            };
            (signature, wallet.public_key().clone())
        };

        self.mempool.add(tx.clone(), fee);

        let signed = SignedTransaction {
            transaction: tx,
            signature,
            public_key,
        };
        if let Err(e) = self.network.broadcast_transaction(&signed).await {
            warn!(error = %e, "failed to broadcast scripted transaction");
        }
    }
}

/// Formats a known node's wallet address for the startup log line.
#[must_use]
pub fn greeting(address: &Address) -> String {
    format!("trustify node starting, wallet address {address}")
}
