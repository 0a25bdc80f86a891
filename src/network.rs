//! Peer transport: length-prefixed framing over plain TCP.
//!
//! Every message is a short-lived connection carrying exactly one frame —
//! broadcast opens one outbound connection per peer per message; GetBlocks
//! opens one outbound connection, writes the request, and reads the
//! response back on the same socket. This mirrors the one-UDP-packet-per-
//! broadcast and one-libp2p-stream-per-request shapes of the original
//! network layer without needing a peer discovery or gossip layer.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use trustify_core::codec::{self, MessageKind, MAX_FRAME_SIZE};
use trustify_core::{Block, GetBlocksRequest, GetBlocksResponse, Result, Transaction};
use trustify_shared::{BlockchainError, Hash256, PublicKey, Signature};

/// A transaction as it travels the wire: payload plus the signature and
/// public key authorizing its inputs, carried alongside rather than inside
/// the hashed transaction content.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: Signature,
    pub public_key: PublicKey,
}

/// What an accepted inbound connection produced, handed to the node's
/// dispatcher over a channel.
pub enum InboundEvent {
    Transaction(SignedTransaction),
    Block(Block),
    GetBlocks {
        request: GetBlocksRequest,
        reply: oneshot::Sender<GetBlocksResponse>,
    },
}

async fn write_frame(stream: &mut TcpStream, kind: MessageKind, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(BlockchainError::NetworkError(format!(
            "payload of {} bytes exceeds frame limit",
            payload.len()
        )));
    }
    stream.write_all(&[kind.as_byte()]).await?;
    stream.write_all(&(payload.len() as u64).to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream) -> Result<(MessageKind, Vec<u8>)> {
    let mut discriminator = [0u8; 1];
    stream.read_exact(&mut discriminator).await?;
    let kind = MessageKind::from_byte(discriminator[0]).ok_or(BlockchainError::InvalidTransactionType)?;

    let mut len_bytes = [0u8; 8];
    stream.read_exact(&mut len_bytes).await?;
    let len = u64::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(BlockchainError::NetworkError(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok((kind, payload))
}

fn split_var_bytes(buf: &[u8]) -> Result<(&[u8], &[u8])> {
    if buf.len() < 8 {
        return Err(BlockchainError::NetworkError("truncated length prefix".to_string()));
    }
    let (len_bytes, rest) = buf.split_at(8);
    let len = u64::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
    if rest.len() < len {
        return Err(BlockchainError::NetworkError("truncated field".to_string()));
    }
    Ok(rest.split_at(len))
}

/// Serializes a transaction alongside its authorizing signature and public
/// key as three length-prefixed fields, the same shape the original
/// network layer's `writeVarBytes` used for each field.
fn encode_transaction_payload(signed: &SignedTransaction) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let tx_bytes = codec::serialize(&signed.transaction)?;
    buf.extend_from_slice(&(tx_bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(&tx_bytes);
    buf.extend_from_slice(&(signed.signature.as_der_bytes().len() as u64).to_be_bytes());
    buf.extend_from_slice(signed.signature.as_der_bytes());
    let pk_bytes = signed.public_key.as_bytes();
    buf.extend_from_slice(&(pk_bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(&pk_bytes);
    Ok(buf)
}

fn decode_transaction_payload(payload: &[u8]) -> Result<SignedTransaction> {
    let (tx_bytes, rest) = split_var_bytes(payload)?;
    let (sig_bytes, rest) = split_var_bytes(rest)?;
    let (pk_bytes, _) = split_var_bytes(rest)?;

    let transaction: Transaction = codec::deserialize(tx_bytes)?;
    let signature = Signature::from_der(sig_bytes).map_err(|_| BlockchainError::InvalidSignature)?;
    let public_key = PublicKey::from_bytes(pk_bytes).map_err(|_| BlockchainError::InvalidSignature)?;
    Ok(SignedTransaction {
        transaction,
        signature,
        public_key,
    })
}

/// TCP transport for one node: a fixed, configured peer list (no discovery),
/// a listener accepting inbound connections, and outbound dialing for
/// broadcast and GetBlocks requests.
pub struct Network {
    listen_addr: SocketAddr,
    peers: Vec<SocketAddr>,
}

impl Network {
    #[must_use]
    pub const fn new(listen_addr: SocketAddr, peers: Vec<SocketAddr>) -> Self {
        Self { listen_addr, peers }
    }

    /// Binds the listener and serves inbound connections forever, handing
    /// each decoded message to `events`. Runs until the process exits or the
    /// socket errors.
    ///
    /// # Errors
    /// Returns `IoError` if the listener cannot bind.
    pub async fn run_inbound(&self, events: mpsc::Sender<InboundEvent>) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!(addr = %self.listen_addr, "listening for peer connections");

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let events = events.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_inbound(stream, events).await {
                    warn!(peer = %peer_addr, error = %e, "inbound connection ended with error");
                }
            });
        }
    }

    /// Opens one connection per known peer and writes the transaction frame.
    /// Returns the number of peers it reached.
    ///
    /// # Errors
    /// Returns `SerializationError` if the transaction cannot be encoded.
    pub async fn broadcast_transaction(&self, signed: &SignedTransaction) -> Result<usize> {
        let payload = encode_transaction_payload(signed)?;
        Ok(self.broadcast(MessageKind::Transaction, &payload).await)
    }

    /// Opens one connection per known peer and writes the block frame.
    ///
    /// # Errors
    /// Returns `SerializationError` if the block cannot be encoded.
    pub async fn broadcast_block(&self, block: &Block) -> Result<usize> {
        let payload = codec::serialize(block)?;
        Ok(self.broadcast(MessageKind::Block, &payload).await)
    }

    async fn broadcast(&self, kind: MessageKind, payload: &[u8]) -> usize {
        let mut reached = 0;
        for &peer in &self.peers {
            match TcpStream::connect(peer).await {
                Ok(mut stream) => match write_frame(&mut stream, kind, payload).await {
                    Ok(()) => reached += 1,
                    Err(e) => warn!(%peer, error = %e, "failed writing broadcast frame"),
                },
                Err(e) => debug!(%peer, error = %e, "peer unreachable"),
            }
        }
        reached
    }

    /// Requests blocks strictly after `last_known_hash` from `peer`, bounded
    /// by `timeout`.
    ///
    /// # Errors
    /// Returns `NetworkError` on connection failure, malformed response, or
    /// if `timeout` elapses first.
    pub async fn request_blocks(
        &self,
        peer: SocketAddr,
        last_known_hash: Hash256,
        timeout: Duration,
    ) -> Result<GetBlocksResponse> {
        let request = GetBlocksRequest { last_known_hash };
        let payload = codec::serialize(&request)?;

        tokio::time::timeout(timeout, async move {
            let mut stream = TcpStream::connect(peer).await?;
            write_frame(&mut stream, MessageKind::GetBlocksRequest, &payload).await?;
            let (kind, response_payload) = read_frame(&mut stream).await?;
            if kind != MessageKind::GetBlocksResponse {
                return Err(BlockchainError::NetworkError(
                    "peer replied with the wrong message kind".to_string(),
                ));
            }
            codec::deserialize(&response_payload)
        })
        .await
        .map_err(|_| BlockchainError::NetworkError("GetBlocks request timed out".to_string()))?
    }
}

async fn handle_inbound(mut stream: TcpStream, events: mpsc::Sender<InboundEvent>) -> Result<()> {
    let (kind, payload) = read_frame(&mut stream).await?;

    match kind {
        MessageKind::Transaction => {
            let signed = decode_transaction_payload(&payload)?;
            let _ = events.send(InboundEvent::Transaction(signed)).await;
        }
        MessageKind::Block => {
            let block: Block = codec::deserialize(&payload)?;
            let _ = events.send(InboundEvent::Block(block)).await;
        }
        MessageKind::GetBlocksRequest => {
            let request: GetBlocksRequest = codec::deserialize(&payload)?;
            let (reply_tx, reply_rx) = oneshot::channel();
            if events
                .send(InboundEvent::GetBlocks {
                    request,
                    reply: reply_tx,
                })
                .await
                .is_ok()
            {
                if let Ok(response) = reply_rx.await {
                    let response_payload = codec::serialize(&response)?;
                    write_frame(&mut stream, MessageKind::GetBlocksResponse, &response_payload).await?;
                }
            }
        }
        MessageKind::GetBlocksResponse => {
            return Err(BlockchainError::NetworkError(
                "unsolicited GetBlocksResponse on inbound listener".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_var_bytes_reads_length_prefixed_field() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3u64.to_be_bytes());
        buf.extend_from_slice(b"abcXYZ");
        let (field, rest) = split_var_bytes(&buf).unwrap();
        assert_eq!(field, b"abc");
        assert_eq!(rest, b"XYZ");
    }

    #[test]
    fn split_var_bytes_rejects_truncated_field() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u64.to_be_bytes());
        buf.extend_from_slice(b"short");
        assert!(split_var_bytes(&buf).is_err());
    }

    #[tokio::test]
    async fn request_blocks_times_out_against_an_unreachable_peer() {
        let network = Network::new(
            "127.0.0.1:0".parse().unwrap(),
            vec!["127.0.0.1:1".parse().unwrap()],
        );
        let result = network
            .request_blocks(
                "127.0.0.1:1".parse().unwrap(),
                Hash256::zero(),
                Duration::from_millis(50),
            )
            .await;
        assert!(result.is_err());
    }
}
