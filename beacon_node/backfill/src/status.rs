use crate::batch::Batch;
use crate::block::BackfillBlock;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use types::{Hash256, Slot};

/// Persisted progress of the backfill process.
///
/// `low_slot` starts at the origin (checkpoint) slot and moves strictly
/// downward as batches import, reaching the retention floor when backfill
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillStatus {
    /// The lowest slot for which a block has been imported.
    pub low_slot: Slot,
    /// The parent root of the block at `low_slot`. The next batch to import
    /// must chain up to this root.
    pub low_parent_root: Hash256,
    /// The slot of the origin block the node started from.
    pub origin_slot: Slot,
    /// The root of the origin block.
    pub origin_root: Hash256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Database(String),
    /// The persisted status disagrees with the blocks actually in the store.
    CorruptStatus(String),
    /// No backfill status has been persisted; the node was never initialised
    /// from a checkpoint.
    MissingStatus,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "database error: {e}"),
            StoreError::CorruptStatus(e) => write!(f, "corrupt backfill status: {e}"),
            StoreError::MissingStatus => write!(f, "no backfill status in the store"),
        }
    }
}

/// The storage surface the backfill engine requires.
pub trait BlockStore<B: BackfillBlock>: Send + Sync + 'static {
    /// Atomically import a span of blocks and persist the updated status.
    /// Either both take effect or neither does.
    fn import(&self, blocks: &[B], status: &BackfillStatus) -> Result<(), StoreError>;

    /// The status persisted by the most recent `import` (or by checkpoint
    /// initialisation).
    fn load_status(&self) -> Result<Option<BackfillStatus>, StoreError>;

    /// Parent root of the lowest-slot block currently in the store.
    fn parent_root_of_lowest_imported(&self) -> Result<Option<Hash256>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// The batch's newest block does not chain up to the previously imported
    /// batch.
    ParentMismatch {
        expected: Hash256,
        got: Hash256,
        slot: Slot,
    },
    Store(StoreError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImportError::ParentMismatch {
                expected,
                got,
                slot,
            } => write!(
                f,
                "block at slot {slot} has root {got:?}, expected parent {expected:?}"
            ),
            ImportError::Store(e) => write!(f, "{e}"),
        }
    }
}

/// Owns the in-memory status snapshot and serialises imports against it.
///
/// The driver is the only writer. Other node components may hold a shared
/// handle and use [`StatusUpdater::available_block`] to safely determine
/// whether a given slot has been backfilled yet.
pub struct StatusUpdater<B: BackfillBlock, S: BlockStore<B>> {
    store: Arc<S>,
    status: RwLock<BackfillStatus>,
    _phantom: PhantomData<B>,
}

impl<B: BackfillBlock, S: BlockStore<B>> StatusUpdater<B, S> {
    pub fn new(store: Arc<S>, status: BackfillStatus) -> Self {
        Self {
            store,
            status: RwLock::new(status),
            _phantom: PhantomData,
        }
    }

    /// Restores the snapshot persisted by a previous run, checking it against
    /// the store contents.
    pub fn from_store(store: Arc<S>) -> Result<Self, StoreError> {
        let status = store.load_status()?.ok_or(StoreError::MissingStatus)?;
        if let Some(root) = store.parent_root_of_lowest_imported()? {
            if root != status.low_parent_root {
                return Err(StoreError::CorruptStatus(format!(
                    "low_parent_root {:?} does not match store contents {:?}",
                    status.low_parent_root, root
                )));
            }
        }
        Ok(Self::new(store, status))
    }

    /// The current snapshot.
    pub fn status(&self) -> BackfillStatus {
        *self.status.read()
    }

    /// Confirms the batch's newest block chains up to the lowest imported
    /// block. A batch with no results has nothing to check.
    pub fn ensure_parent(&self, batch: &Batch<B>) -> Result<(), ImportError> {
        let expected = self.status.read().low_parent_root;
        match (batch.newest_root(), batch.results.last()) {
            (Some(root), Some(newest)) if root != expected => Err(ImportError::ParentMismatch {
                expected,
                got: root,
                slot: newest.slot(),
            }),
            _ => Ok(()),
        }
    }

    /// Atomically imports `blocks` (ascending, already verified) and advances
    /// the status downward. An empty span is a no-op: every slot in the batch
    /// was skipped, so the status is unchanged.
    ///
    /// A failure here means the database rejected the write; callers must
    /// treat it as non-recoverable.
    pub fn fill_back(&self, blocks: &[B]) -> Result<BackfillStatus, StoreError> {
        let mut status = self.status.write();
        let (oldest, newest) = match (blocks.first(), blocks.last()) {
            (Some(oldest), Some(newest)) => (oldest, newest),
            _ => return Ok(*status),
        };
        if newest.slot() >= status.low_slot {
            return Err(StoreError::CorruptStatus(format!(
                "import at slot {} does not extend history below slot {}",
                newest.slot(),
                status.low_slot
            )));
        }

        let mut updated = *status;
        updated.low_slot = oldest.slot();
        updated.low_parent_root = oldest.parent_root();
        self.store.import(blocks, &updated)?;
        *status = updated;
        Ok(updated)
    }

    /// True once the block at `slot` is within locally-held history.
    pub fn available_block(&self, slot: Slot) -> bool {
        slot >= self.status.read().low_slot
    }
}
