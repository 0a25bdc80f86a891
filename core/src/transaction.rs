//! Purchase/Review/Coinbase transaction data, and the wallet that builds them.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use trustify_shared::{
    Address, Amount, BlockHeight, BlockchainError, Crypto, Hash256, PrivateKey, ProductId,
    PublicKey, Sequence, Signature, Timestamp,
};

use crate::codec;
use crate::utxo::{Outpoint, Utxo};
use crate::Result;

/// The closed set of payload kinds a transaction may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionData {
    Purchase {
        buyer: Address,
        seller: Address,
        product_id: ProductId,
        amount: Amount,
    },
    Review {
        reviewer: Address,
        product_id: ProductId,
        rating: u8,
    },
    Coinbase {
        block_height: BlockHeight,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub outpoint: Outpoint,
}

impl TxInput {
    #[must_use]
    pub const fn new(outpoint: Outpoint) -> Self {
        Self { outpoint }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub owner: Address,
    pub amount: Amount,
}

impl TxOutput {
    #[must_use]
    pub const fn new(owner: Address, amount: Amount) -> Self {
        Self { owner, amount }
    }
}

/// The pre-id content a transaction's id is hashed over. Kept separate from
/// `Transaction` so the id can never drift from what it was computed from —
/// `Transaction`'s `Serialize`/`Deserialize` round-trips through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransactionWire {
    data: TransactionData,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    sequence: Sequence,
    timestamp: Timestamp,
}

/// A Purchase, Review, or Coinbase transaction.
///
/// `id` is always `hash(serialize(data, inputs, outputs, sequence, timestamp))`
/// — it is never transmitted on the wire, only recomputed on deserialization,
/// so it can never disagree with its own content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TransactionWire", from = "TransactionWire")]
pub struct Transaction {
    pub id: Hash256,
    pub data: TransactionData,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub sequence: Sequence,
    pub timestamp: Timestamp,
}

impl From<TransactionWire> for Transaction {
    fn from(wire: TransactionWire) -> Self {
        let id = codec::hash(&wire).expect("transaction wire always encodes");
        Self {
            id,
            data: wire.data,
            inputs: wire.inputs,
            outputs: wire.outputs,
            sequence: wire.sequence,
            timestamp: wire.timestamp,
        }
    }
}

impl From<Transaction> for TransactionWire {
    fn from(tx: Transaction) -> Self {
        Self {
            data: tx.data,
            inputs: tx.inputs,
            outputs: tx.outputs,
            sequence: tx.sequence,
            timestamp: tx.timestamp,
        }
    }
}

fn now_nanos() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as Timestamp
}

impl Transaction {
    /// # Errors
    /// Returns `SerializationError` only if `bincode` itself fails, which
    /// does not happen for these domain types.
    pub fn new(
        data: TransactionData,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        sequence: Sequence,
        timestamp: Timestamp,
    ) -> Result<Self> {
        Ok(TransactionWire {
            data,
            inputs,
            outputs,
            sequence,
            timestamp,
        }
        .into())
    }

    #[must_use]
    pub const fn is_coinbase(&self) -> bool {
        matches!(self.data, TransactionData::Coinbase { .. })
    }

    #[must_use]
    pub fn total_output_value(&self) -> Amount {
        self.outputs.iter().map(|o| o.amount).sum()
    }
}

/// Holds keys, owned UTXOs (in insertion order), and a local sequence
/// counter used to stamp every transaction this wallet builds.
pub struct Wallet {
    private_key: PrivateKey,
    public_key: PublicKey,
    pub address: Address,
    owned_utxos: Vec<Utxo>,
    next_sequence: Sequence,
}

impl Wallet {
    pub fn new(private_key: PrivateKey, public_key: PublicKey, crypto: &dyn Crypto) -> Self {
        let address = crypto.hash_address(&public_key);
        Self {
            private_key,
            public_key,
            address,
            owned_utxos: Vec::new(),
            next_sequence: 0,
        }
    }

    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub fn balance(&self) -> Amount {
        self.owned_utxos.iter().map(|u| u.amount).sum()
    }

    pub fn track_utxo(&mut self, utxo: Utxo) {
        self.owned_utxos.push(utxo);
    }

    fn next_sequence(&mut self) -> Sequence {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Greedily consumes owned UTXOs, oldest first, until their sum covers
    /// `target`. Consumed UTXOs are removed from local tracking.
    ///
    /// # Errors
    /// Returns `InsufficientFunds` if the wallet's total balance is below
    /// `target`.
    pub fn create_inputs(&mut self, target: Amount) -> Result<(Vec<TxInput>, Amount)> {
        let mut total = 0i64;
        let mut taken = 0usize;
        for utxo in &self.owned_utxos {
            total += utxo.amount;
            taken += 1;
            if total >= target {
                break;
            }
        }
        if total < target {
            return Err(BlockchainError::InsufficientFunds);
        }
        let spent: Vec<Utxo> = self.owned_utxos.drain(0..taken).collect();
        let inputs = spent
            .iter()
            .map(|utxo| TxInput::new(utxo.outpoint))
            .collect();
        Ok((inputs, total - target))
    }

    /// Builds a `Purchase` spending `amount + fee` from owned UTXOs, paying
    /// `seller` and returning any change to this wallet.
    ///
    /// # Errors
    /// Returns `InsufficientFunds` if the wallet cannot cover `amount + fee`.
    pub fn new_purchase(
        &mut self,
        seller: Address,
        amount: Amount,
        fee: Amount,
        product_id: ProductId,
    ) -> Result<Transaction> {
        let (inputs, change) = self.create_inputs(amount + fee)?;
        let mut outputs = vec![TxOutput::new(seller.clone(), amount)];
        if change > 0 {
            outputs.push(TxOutput::new(self.address.clone(), change));
        }

        let tx = Transaction::new(
            TransactionData::Purchase {
                buyer: self.address.clone(),
                seller,
                product_id,
                amount,
            },
            inputs,
            outputs,
            self.next_sequence(),
            now_nanos(),
        )?;

        if change > 0 {
            self.track_utxo(Utxo::new(
                Outpoint::new(tx.id, 1),
                self.address.clone(),
                change,
            ));
        }

        Ok(tx)
    }

    /// Builds a `Review` with no inputs or outputs; rewarded by the block's
    /// coinbase if accepted.
    ///
    /// # Errors
    /// Propagates a `SerializationError` only in the unreachable case that
    /// encoding fails.
    pub fn new_review(&mut self, product_id: ProductId, rating: u8) -> Result<Transaction> {
        Transaction::new(
            TransactionData::Review {
                reviewer: self.address.clone(),
                product_id,
                rating,
            },
            vec![],
            vec![],
            self.next_sequence(),
            now_nanos(),
        )
    }

    /// Signs `tx.id` — the hash of the transaction's canonical serialization.
    ///
    /// # Errors
    /// Propagates whatever error the injected `Crypto` capability returns.
    pub fn sign_transaction(&self, tx: &Transaction, crypto: &dyn Crypto) -> Result<Signature> {
        crypto.sign(&self.private_key, &tx.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustify_shared::EcdsaCrypto;

    fn wallet() -> Wallet {
        let (sk, pk) = EcdsaCrypto::generate_keypair();
        Wallet::new(sk, pk, &EcdsaCrypto)
    }

    #[test]
    fn transaction_id_is_stable_across_reconstruction() {
        let tx = Transaction::new(
            TransactionData::Coinbase { block_height: 1 },
            vec![],
            vec![],
            0,
            1,
        )
        .unwrap();
        let bytes = codec::serialize(&tx).unwrap();
        let back: Transaction = codec::deserialize(&bytes).unwrap();
        assert_eq!(tx.id, back.id);
        assert_eq!(codec::serialize(&back).unwrap(), bytes);
    }

    #[test]
    fn create_inputs_is_greedy_and_reports_change() {
        let mut w = wallet();
        w.track_utxo(Utxo::new(Outpoint::new(Hash256::zero(), 0), w.address.clone(), 60));
        w.track_utxo(Utxo::new(Outpoint::new(Hash256::zero(), 1), w.address.clone(), 60));

        let (inputs, change) = w.create_inputs(100).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(change, 20);
        assert_eq!(w.balance(), 0);
    }

    #[test]
    fn create_inputs_fails_when_balance_insufficient() {
        let mut w = wallet();
        w.track_utxo(Utxo::new(Outpoint::new(Hash256::zero(), 0), w.address.clone(), 10));
        assert!(matches!(
            w.create_inputs(100).unwrap_err(),
            BlockchainError::InsufficientFunds
        ));
    }

    #[test]
    fn new_purchase_produces_change_output_and_tracks_it() {
        let mut w = wallet();
        w.track_utxo(Utxo::new(Outpoint::new(Hash256::zero(), 0), w.address.clone(), 100));

        let seller = Address::from_bytes(vec![9; 32]);
        let tx = w
            .new_purchase(seller.clone(), 50, 5, "widget".to_string())
            .unwrap();

        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].owner, seller);
        assert_eq!(tx.outputs[0].amount, 50);
        assert_eq!(tx.outputs[1].owner, w.address);
        assert_eq!(tx.outputs[1].amount, 45);
        assert_eq!(w.balance(), 45);
    }

    #[test]
    fn sign_then_verify_with_wallet_public_key() {
        let mut w = wallet();
        let tx = w.new_review("widget".to_string(), 5).unwrap();
        let signature = w.sign_transaction(&tx, &EcdsaCrypto).unwrap();
        assert!(EcdsaCrypto
            .verify(w.public_key(), &tx.id, &signature)
            .unwrap());
    }
}
