use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 256-bit hash identifying blocks, transactions, and header contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// SHA-256 of the provided bytes.
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Combines two child hashes as `SHA-256(left || right)` (Merkle parent).
    #[must_use]
    pub fn combine(left: &Self, right: &Self) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&left.0);
        buf.extend_from_slice(&right.0);
        Self::sha256(&buf)
    }

    /// Bytewise big-endian comparison against a proof-of-work target.
    #[must_use]
    pub fn meets_target(&self, target: &Self) -> bool {
        self.0 < target.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&str> for Hash256 {
    type Error = hex::FromHexError;

    fn try_from(hex_string: &str) -> Result<Self, Self::Error> {
        let bytes = hex::decode(hex_string)?;
        let mut hash = [0u8; 32];
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_displays_as_64_zero_hex_digits() {
        let hash = Hash256::zero();
        assert_eq!(hash.to_string(), "0".repeat(64));
    }

    #[test]
    fn sha256_is_deterministic_and_nonzero() {
        let a = Hash256::sha256(b"hello world");
        let b = Hash256::sha256(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, Hash256::zero());
    }

    #[test]
    fn meets_target_is_bytewise_big_endian() {
        let low = Hash256::from_bytes([0u8; 32]);
        let mut target_bytes = [0u8; 32];
        target_bytes[31] = 1;
        let target = Hash256::from_bytes(target_bytes);
        assert!(low.meets_target(&target));
        assert!(!target.meets_target(&low));
    }

    #[test]
    fn combine_matches_manual_concatenation() {
        let left = Hash256::sha256(b"left");
        let right = Hash256::sha256(b"right");
        let mut buf = Vec::new();
        buf.extend_from_slice(left.as_bytes());
        buf.extend_from_slice(right.as_bytes());
        assert_eq!(Hash256::combine(&left, &right), Hash256::sha256(&buf));
    }
}
