//! Historical block backfill for a beacon node started from a checkpoint.
//!
//! A node started from a recent weak-subjectivity state holds a finalized
//! state at some high slot but none of the blocks below it. This crate
//! downloads those ancestor blocks from peers in fixed-size slot-range
//! batches, verifies that each batch forms a contiguous parent-root chain,
//! imports batches into the store strictly newest-to-oldest so roots can be
//! chained across batch boundaries, and stops once local history reaches the
//! oldest slot the node is required to retain.
//!
//! The centre of the crate is the [`BatchSequencer`]: a fixed-capacity window
//! of batches in descending slot order. The [`BackfillService`] drains a
//! worker pool, feeds completed batches back into the sequencer, imports the
//! ready prefix of the window and schedules replacement batches, while the
//! retention floor rises underneath it as wall-clock time passes.

mod batch;
mod batcher;
pub mod block;
pub mod metrics;
pub mod p2p;
mod pool;
mod sequencer;
mod service;
mod status;
pub mod test_utils;
mod verifier;

pub use batch::{Batch, BatchState};
pub use batcher::Batcher;
pub use block::BackfillBlock;
pub use pool::{BatchWorkerPool, PoolError};
pub use sequencer::{BatchSequencer, SequencerError};
pub use service::{
    max_safe_epoch, minimum_backfill_slot, BackfillConfig, BackfillError, BackfillService,
    DEFAULT_BATCH_SIZE, DEFAULT_WORKER_COUNT,
};
pub use status::{BackfillStatus, BlockStore, ImportError, StatusUpdater, StoreError};
pub use verifier::{BackfillVerifier, SignatureVerifier, VerifyError};

use p2p::{BlocksByRangeFetcher, PeerAssigner};
use slot_clock::SlotClock;

/// The collaborators the backfill service is generic over.
///
/// Bundling them into a single trait keeps the service signature manageable
/// and lets tests swap every seam at once.
pub trait BackfillTypes: Send + Sync + 'static {
    type Block: BackfillBlock;
    type Store: BlockStore<Self::Block>;
    type SlotClock: SlotClock;
    type Assigner: PeerAssigner;
    type Fetcher: BlocksByRangeFetcher<Self::Block>;
    type SignatureVerifier: SignatureVerifier<Self::Block>;
}
