//! The `Crypto` capability: signing, verification, and address derivation.
//!
//! Trustify's core consensus logic treats key generation and address
//! derivation as an external collaborator (see spec); this module still
//! ships one concrete, usable implementation — DER-encoded ECDSA over
//! secp256k1 with SHA-256 message digests — so the node binary has
//! something real to wire in.

use crate::{BlockchainError, Hash256, Result};
use rand::RngCore;
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey, Signature as Secp256k1Signature};
use serde::{Deserialize, Serialize};

/// An address: the hash of a public key. Structural, not string, equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(Vec<u8>);

impl Address {
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

#[derive(Debug, Clone)]
pub struct PrivateKey(SecretKey);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "pubkey_bytes")] Secp256k1PublicKey);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

mod pubkey_bytes {
    use secp256k1::PublicKey;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(key: &PublicKey, s: S) -> Result<S::Ok, S::Error> {
        key.serialize().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PublicKey, D::Error> {
        let bytes: Vec<u8> = Vec::<u8>::deserialize(d)?;
        PublicKey::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

impl PrivateKey {
    /// Loads a private key from its 32-byte scalar representation.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a valid secp256k1 scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey(Secp256k1PublicKey::from_secret_key(&secp, &self.0))
    }
}

impl PublicKey {
    /// Loads a public key from its SEC1 (compressed or uncompressed) encoding.
    ///
    /// # Errors
    /// Returns an error if the bytes do not encode a valid curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Secp256k1PublicKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> Vec<u8> {
        self.0.serialize().to_vec()
    }
}

impl Signature {
    /// Loads a signature from its DER encoding.
    ///
    /// # Errors
    /// Returns an error if the bytes are not valid DER.
    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        Secp256k1Signature::from_der(bytes)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        Ok(Self(bytes.to_vec()))
    }

    #[must_use]
    pub fn as_der_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Sign / verify / derive-address, injected into the consensus core so it
/// never has to know how keys are generated or stored.
pub trait Crypto: Send + Sync {
    /// Signs `hash(serialize(tx))` (or any message digest) with `private_key`.
    ///
    /// # Errors
    /// Returns an error if the underlying signing operation fails.
    fn sign(&self, private_key: &PrivateKey, message: &Hash256) -> Result<Signature>;

    /// Verifies `signature` over `message` against `public_key`.
    ///
    /// # Errors
    /// Returns an error if the signature is malformed (not just "doesn't verify").
    fn verify(
        &self,
        public_key: &PublicKey,
        message: &Hash256,
        signature: &Signature,
    ) -> Result<bool>;

    /// Derives an address from a public key.
    fn hash_address(&self, public_key: &PublicKey) -> Address;
}

/// Reference `Crypto` implementation: ECDSA over secp256k1, DER signatures,
/// SHA-256 message digests and address derivation.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaCrypto;

impl EcdsaCrypto {
    /// Generates a fresh keypair using the OS RNG, resampling on the
    /// (astronomically unlikely) out-of-range scalar.
    #[must_use]
    pub fn generate_keypair() -> (PrivateKey, PublicKey) {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Ok(secret_key) = SecretKey::from_slice(&bytes) {
                let public_key = Secp256k1PublicKey::from_secret_key(&secp, &secret_key);
                return (PrivateKey(secret_key), PublicKey(public_key));
            }
        }
    }
}

impl Crypto for EcdsaCrypto {
    fn sign(&self, private_key: &PrivateKey, message: &Hash256) -> Result<Signature> {
        let secp = Secp256k1::new();
        let msg = Message::from_slice(message.as_bytes())
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let sig = secp.sign(&msg, &private_key.0);
        Ok(Signature(sig.serialize_der().to_vec()))
    }

    fn verify(
        &self,
        public_key: &PublicKey,
        message: &Hash256,
        signature: &Signature,
    ) -> Result<bool> {
        let secp = Secp256k1::new();
        let msg = Message::from_slice(message.as_bytes())
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let sig = match Secp256k1Signature::from_der(&signature.0) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };
        Ok(secp.verify(&msg, &sig, &public_key.0).is_ok())
    }

    fn hash_address(&self, public_key: &PublicKey) -> Address {
        Address::from_bytes(Hash256::sha256(&public_key.as_bytes()).as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let (private, public) = EcdsaCrypto::generate_keypair();
        let crypto = EcdsaCrypto;
        let message = Hash256::sha256(b"trustify purchase");

        let signature = crypto.sign(&private, &message).unwrap();
        assert!(crypto.verify(&public, &message, &signature).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let (private, public) = EcdsaCrypto::generate_keypair();
        let crypto = EcdsaCrypto;
        let signature = crypto.sign(&private, &Hash256::sha256(b"a")).unwrap();
        assert!(!crypto
            .verify(&public, &Hash256::sha256(b"b"), &signature)
            .unwrap());
    }

    #[test]
    fn hash_address_is_deterministic() {
        let (_, public) = EcdsaCrypto::generate_keypair();
        let crypto = EcdsaCrypto;
        assert_eq!(crypto.hash_address(&public), crypto.hash_address(&public));
    }
}
