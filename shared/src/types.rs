//! Wire-level type aliases shared by the core and node crates.

/// Identifies a transaction: `hash(serialize(tx))`.
pub type TxId = crate::Hash256;

/// Identifies a block: `hash(serialize(header))`.
pub type BlockId = crate::Hash256;

/// A non-negative value in the ledger's base unit.
pub type Amount = i64;

/// Nanosecond timestamp (see spec's design notes on header precision).
pub type Timestamp = i64;

/// Height of a block within the ledger (genesis = 0).
pub type BlockHeight = u64;

/// Index of an output within a transaction's output list.
pub type OutputIndex = u32;

/// A product identifier, as used by Purchase and Review transactions.
pub type ProductId = String;

/// Monotonically increasing local ordinal, used to break mempool fee ties.
pub type Sequence = u64;
