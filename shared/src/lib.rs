pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{Address, Crypto, EcdsaCrypto, PrivateKey, PublicKey, Signature};
pub use error::BlockchainError;
pub use hash::Hash256;
pub use types::{Amount, BlockHeight, BlockId, OutputIndex, ProductId, Sequence, Timestamp, TxId};

pub type Result<T> = std::result::Result<T, BlockchainError>;
