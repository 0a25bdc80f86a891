//! Deterministic binary serialization and content hashing.
//!
//! Every domain type in this crate derives `Serialize`/`Deserialize` from
//! `serde` and is encoded with `bincode`'s fixed-width, fixed-order wire
//! format — no map types with nondeterministic iteration order are ever
//! serialized directly; types that logically are maps (the UTXO set) are
//! serialized as sorted `Vec<(K, V)>` pairs instead.

use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use trustify_shared::{BlockchainError, Hash256};

/// Default cap on a single framed message, in bytes.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Wire discriminator prefixing every peer-to-peer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Transaction = 0x00,
    Block = 0x01,
    GetBlocksRequest = 0x02,
    GetBlocksResponse = 0x03,
}

impl MessageKind {
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Transaction),
            0x01 => Some(Self::Block),
            0x02 => Some(Self::GetBlocksRequest),
            0x03 => Some(Self::GetBlocksResponse),
            _ => None,
        }
    }
}

/// Canonical serialization for any domain type.
///
/// # Errors
/// Returns `SerializationError` if `bincode` fails to encode `value`.
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| BlockchainError::SerializationError(e.to_string()))
}

/// Inverse of [`serialize`].
///
/// # Errors
/// Returns `SerializationError` if `bytes` is not a valid encoding of `T`.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| BlockchainError::SerializationError(e.to_string()))
}

/// `hash(x) = SHA-256(serialize(x))`.
///
/// # Errors
/// Propagates a `SerializationError` if `value` cannot be encoded.
pub fn hash<T: Serialize>(value: &T) -> Result<Hash256> {
    Ok(Hash256::sha256(&serialize(value)?))
}

/// Prefixes `payload` with its `MessageKind` discriminator.
#[must_use]
pub fn frame_payload(kind: MessageKind, payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 1);
    framed.push(kind.as_byte());
    framed.extend_from_slice(payload);
    framed
}

/// Splits a discriminator-prefixed frame into its `MessageKind` and payload.
///
/// # Errors
/// Returns `InvalidTransactionType` if the frame is empty or the
/// discriminator is unrecognized.
pub fn split_frame(frame: &[u8]) -> Result<(MessageKind, &[u8])> {
    let (&discriminator, payload) = frame
        .split_first()
        .ok_or(BlockchainError::InvalidTransactionType)?;
    let kind = MessageKind::from_byte(discriminator).ok_or(BlockchainError::InvalidTransactionType)?;
    Ok((kind, payload))
}
