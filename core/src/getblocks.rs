//! Request/response types for the GetBlocks protocol. Transport, peer
//! enumeration, and timeout-bounded draining live in the node binary; this
//! module only defines the wire payloads, which is all the ledger-side
//! fork resolver needs to reason about.

use serde::{Deserialize, Serialize};
use trustify_shared::Hash256;

use crate::block::Block;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlocksRequest {
    pub last_known_hash: Hash256,
}

/// `blocks` is the responder's ledger suffix strictly after
/// `last_known_hash`, or empty with `success = false` if that hash is
/// unknown to the responder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlocksResponse {
    pub success: bool,
    pub blocks: Vec<Block>,
}

impl GetBlocksResponse {
    #[must_use]
    pub const fn not_found() -> Self {
        Self {
            success: false,
            blocks: Vec::new(),
        }
    }

    #[must_use]
    pub const fn found(blocks: Vec<Block>) -> Self {
        Self {
            success: true,
            blocks,
        }
    }
}
