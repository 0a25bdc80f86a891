use thiserror::Error;

/// Errors surfaced at the ledger, mempool, or codec boundary.
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("block contains no transactions")]
    EmptyTransactions,

    #[error("previous_hash does not match the expected predecessor")]
    InvalidPreviousHash,

    #[error("target_hash is malformed")]
    InvalidTargetHash,

    #[error("recomputed merkle root does not match header.merkle_root")]
    InvalidMerkleRoot,

    #[error("header.timestamp does not strictly follow the predecessor's")]
    InvalidTimestamp,

    #[error("block_hash does not compare less than target_hash")]
    InvalidProofOfWork,

    #[error("transaction data variant is not valid in this context")]
    InvalidTransactionType,

    #[error("outpoint not found in the UTXO set")]
    UtxoNotFound,

    #[error("an outpoint is spent more than once")]
    DoubleSpending,

    #[error("input sum is less than output sum")]
    InsufficientFunds,

    #[error("reviewer has no prior committed purchase of this product")]
    ProductNotPurchased,

    #[error("reviewer already reviewed this product")]
    DuplicateReview,

    #[error("signature does not verify against the claimed public key")]
    InvalidSignature,

    #[error("no block with the requested hash or height is known")]
    BlockNotFound,

    #[error("fork resolution exhausted candidates back to genesis")]
    NoValidChain,

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("cryptographic error: {0}")]
    CryptographicError(String),
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
