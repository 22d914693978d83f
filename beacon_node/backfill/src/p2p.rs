//! Contracts with the peer layer and the wire protocol.
//!
//! Peer discovery, scoring and RPC framing all live outside this crate; the
//! engine consumes them through the traits below.

use crate::block::BackfillBlock;
use async_trait::async_trait;
use std::fmt;
use types::{Epoch, Slot};

pub use libp2p_identity::PeerId;

/// A `blocks_by_range` request covering `count` slots from `start_slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlocksByRangeRequest {
    pub start_slot: Slot,
    pub count: u64,
}

/// No connected peer is able to serve the requested epoch range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoSuitablePeers;

impl fmt::Display for NoSuitablePeers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "no suitable peers to serve the requested epoch")
    }
}

/// Selects a peer willing to serve blocks around a given epoch.
///
/// Implemented by the peer layer. Assignment failures are retryable; the
/// batch will be re-sequenced and assigned again later.
pub trait PeerAssigner: Send + Sync + 'static {
    fn assign(&self, epoch: Epoch) -> Result<PeerId, NoSuitablePeers>;

    /// Notify the peer layer that a batch served by `peer_id` failed checks
    /// performed after download. Scoring consequences are at the peer
    /// layer's discretion.
    fn report_batch_failure(&self, _peer_id: &PeerId) {}
}

/// A wire-protocol failure. All fetch failures are retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError(pub String);

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "blocks_by_range request failed: {}", self.0)
    }
}

/// The `blocks_by_range` RPC.
///
/// Responses must be ascending by slot and may be sparse where slots were
/// skipped. Cancellation is by dropping the returned future.
#[async_trait]
pub trait BlocksByRangeFetcher<B: BackfillBlock>: Send + Sync + 'static {
    async fn blocks_by_range(
        &self,
        peer_id: &PeerId,
        request: BlocksByRangeRequest,
    ) -> Result<Vec<B>, FetchError>;
}
