pub mod codec;
pub mod config;
pub mod getblocks;
pub mod mempool;
pub mod merkle;
pub mod mining;
pub mod transaction;
pub mod utxo;

pub mod block;
pub mod blockchain;

pub use block::{Block, BlockHeader};
pub use blockchain::{purchase_fee, Blockchain, BlockchainStats, ChainSource, NoPeers};
pub use config::Config;
pub use getblocks::{GetBlocksRequest, GetBlocksResponse};
pub use mempool::Mempool;
pub use mining::{Miner, MiningContext};
pub use transaction::{Transaction, TransactionData, TxInput, TxOutput, Wallet};
pub use utxo::{Outpoint, Utxo, UtxoSet};

pub use trustify_shared::{Address, BlockchainError, Crypto, Hash256};

pub type Result<T> = std::result::Result<T, BlockchainError>;
