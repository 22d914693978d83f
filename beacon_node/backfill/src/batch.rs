use crate::block::BackfillBlock;
use crate::p2p::{BlocksByRangeRequest, PeerId};
use std::fmt;
use types::{Epoch, Hash256, Slot};

/// The lifecycle of a batch as it moves between the sequencer, the worker
/// pool and the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchState {
    /// An unused window slot, not yet assigned a range.
    #[default]
    Nil,
    /// Freshly produced by the batcher, not yet handed out.
    Init,
    /// Returned by `sequence`, ready for a worker.
    Sequenced,
    /// Held by a worker for download and verification.
    InFlight,
    /// Downloaded and verified, awaiting ordered import.
    Importable,
    /// Imported into the store; will be compacted out of the window.
    ImportComplete,
    /// Failed download or verification; will be re-sequenced.
    Retryable,
    /// Sentinel emitted once the batcher reaches the retention floor.
    EndSequence,
}

/// One half-open slot range `[begin, end)` of historical blocks, processed as
/// a unit.
///
/// Batches are values: transitions return a new batch, and at any instant
/// exactly one of the sequencer, the todo queue, a worker or the done queue
/// holds a given range.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<B: BackfillBlock> {
    /// Inclusive lower bound.
    pub begin: Slot,
    /// Exclusive upper bound.
    pub end: Slot,
    pub state: BatchState,
    /// The peer assigned to the current attempt.
    pub peer: Option<PeerId>,
    /// Verified blocks, ascending by slot.
    pub results: Vec<B>,
    /// Retryable failures so far.
    pub retries: u8,
    /// Description of the most recent retryable failure.
    pub failure: Option<String>,
}

impl<B: BackfillBlock> Batch<B> {
    pub(crate) fn new(begin: Slot, end: Slot, state: BatchState) -> Self {
        Self {
            begin,
            end,
            state,
            peer: None,
            results: Vec::new(),
            retries: 0,
            failure: None,
        }
    }

    /// An unused window slot.
    pub fn nil() -> Self {
        Self::new(Slot::new(0), Slot::new(0), BatchState::Nil)
    }

    /// The identity of a batch is its slot range.
    pub fn replaces(&self, other: &Self) -> bool {
        self.begin == other.begin && self.end == other.end
    }

    pub fn with_state(mut self, state: BatchState) -> Self {
        self.state = state;
        self
    }

    pub fn with_peer(mut self, peer: PeerId) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Records a retryable failure and discards any partial results.
    pub fn with_retryable_error<E: fmt::Display>(mut self, error: E) -> Self {
        self.retries = self.retries.saturating_add(1);
        self.failure = Some(error.to_string());
        self.results.clear();
        self.state = BatchState::Retryable;
        self
    }

    /// Attaches verified results and marks the batch ready for import.
    pub fn with_results(mut self, results: Vec<B>) -> Self {
        self.results = results;
        self.failure = None;
        self.state = BatchState::Importable;
        self
    }

    /// The wire request covering this batch.
    pub fn request(&self) -> BlocksByRangeRequest {
        BlocksByRangeRequest {
            start_slot: self.begin,
            count: (self.end - self.begin).as_u64(),
        }
    }

    /// The epoch at the midpoint of the range, used for peer assignment.
    pub fn midpoint_epoch(&self, slots_per_epoch: u64) -> Epoch {
        let span = (self.end - self.begin).as_u64();
        (self.begin + span / 2).epoch(slots_per_epoch)
    }

    /// Root of the highest-slot result, if any.
    pub fn newest_root(&self) -> Option<Hash256> {
        self.results.last().map(|block| block.canonical_root())
    }

    /// Parent root of the lowest-slot result, if any.
    pub fn oldest_parent_root(&self) -> Option<Hash256> {
        self.results.first().map(|block| block.parent_root())
    }
}
