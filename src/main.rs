//! `trustify` node binary: loads a YAML network configuration, builds the
//! ledger, mempool and wallet for one configured node, and runs it against
//! its configured peers.

mod network;
mod node;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::info;

use trustify_core::{Block, Blockchain, Config, Mempool, Result, Wallet};
use trustify_shared::{BlockchainError, Crypto, EcdsaCrypto, PrivateKey};

use network::Network;
use node::Node;

#[derive(Parser)]
#[command(name = "trustify")]
#[command(about = "A peer-to-peer UTXO blockchain with purchases and reviews as first-class transactions")]
#[command(version)]
struct Cli {
    /// Path to the network's YAML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// This node's key into `nodes` in the configuration file.
    #[arg(long)]
    node_id: String,

    /// Address to listen for peer connections on.
    #[arg(short, long, default_value = "127.0.0.1:0")]
    listen: SocketAddr,

    /// Peer addresses to broadcast to and request blocks from.
    #[arg(short, long)]
    peer: Vec<SocketAddr>,
}

fn load_config(path: &PathBuf) -> Result<Config> {
    let bytes = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&bytes)
        .map_err(|e| BlockchainError::SerializationError(format!("invalid config yaml: {e}")))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let node_config = config.nodes.get(&cli.node_id).ok_or_else(|| {
        BlockchainError::SerializationError(format!("unknown node_id {}", cli.node_id))
    })?;

    let private_key_bytes = hex::decode(&node_config.wallet.private_key)
        .map_err(|e| BlockchainError::SerializationError(format!("invalid private_key hex: {e}")))?;
    let private_key = PrivateKey::from_bytes(&private_key_bytes)?;
    let crypto: Arc<dyn Crypto> = Arc::new(EcdsaCrypto);
    let public_key = private_key.public_key();
    let mut wallet = Wallet::new(private_key, public_key, crypto.as_ref());

    let genesis = Block::genesis(config.genesis_allocations()?, config.genesis_block.timestamp)?;

    let mempool = Arc::new(Mempool::new());
    let ledger = Arc::new(Blockchain::new(
        genesis,
        Arc::clone(&mempool),
        config.blockchain_settings.mining_reward,
        config.blockchain_settings.review_reward,
        config.blockchain_settings.block_confirmation_depth,
        config.target_hash()?,
    )?);

    for utxo in ledger.utxo_set().by_address(&wallet.address) {
        wallet.track_utxo(utxo);
    }

    info!("{}", node::greeting(&wallet.address));

    let network = Arc::new(Network::new(cli.listen, cli.peer.clone()));

    let node = Arc::new(Node {
        ledger,
        mempool,
        network,
        wallet: Arc::new(Mutex::new(wallet)),
        crypto,
        config: Arc::new(config),
        peers: cli.peer,
        mining_target: Mutex::new(None),
    });

    node.run().await
}
