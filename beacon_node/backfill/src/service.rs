use crate::batch::{Batch, BatchState};
use crate::metrics;
use crate::p2p::PeerAssigner;
use crate::pool::{BatchWorkerPool, PoolError};
use crate::sequencer::{BatchSequencer, SequencerError};
use crate::status::{BackfillStatus, ImportError, StatusUpdater, StoreError};
use crate::verifier::BackfillVerifier;
use crate::BackfillTypes;
use serde::{Deserialize, Serialize};
use slog::{crit, debug, info, o, Logger};
use slot_clock::SlotClock;
use std::fmt;
use std::sync::Arc;
use types::{ChainSpec, Epoch, Slot};

pub const DEFAULT_WORKER_COUNT: usize = 5;
pub const DEFAULT_BATCH_SIZE: u64 = 64;

/// Runtime configuration for the backfill service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Number of download workers; also the capacity of the batch window.
    pub worker_count: usize,
    /// Slots per batch, i.e. the span of one blocks-by-range request.
    pub batch_size: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Non-recoverable service failures. Retryable batch failures never surface
/// here; they are re-sequenced internally.
#[derive(Debug)]
pub enum BackfillError {
    /// The genesis clock reports a pre-genesis time; the service cannot
    /// compute a retention floor.
    ClockNotReady,
    /// The retention floor attempted to move backwards, indicating a broken
    /// clock or misconfiguration.
    Sequencer(SequencerError),
    /// The store rejected an import; local history may be corrupt and
    /// further processing would compound the damage.
    Store(StoreError),
    /// The worker pool shut down while work remained.
    PoolShutdown,
}

impl fmt::Display for BackfillError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackfillError::ClockNotReady => write!(f, "genesis clock not ready"),
            BackfillError::Sequencer(e) => write!(f, "{e}"),
            BackfillError::Store(e) => write!(f, "{e}"),
            BackfillError::PoolShutdown => write!(f, "worker pool shut down unexpectedly"),
        }
    }
}

/// Drives the backfill to completion: schedules batches onto the worker
/// pool, imports completed batches strictly newest-to-oldest and raises the
/// retention floor as the wall clock advances.
pub struct BackfillService<T: BackfillTypes> {
    config: BackfillConfig,
    spec: ChainSpec,
    clock: T::SlotClock,
    status: Arc<StatusUpdater<T::Block, T::Store>>,
    assigner: Arc<T::Assigner>,
    fetcher: Arc<T::Fetcher>,
    verifier: Arc<BackfillVerifier<T::Block, T::SignatureVerifier>>,
    log: Logger,
}

impl<T: BackfillTypes> BackfillService<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BackfillConfig,
        spec: ChainSpec,
        clock: T::SlotClock,
        status: Arc<StatusUpdater<T::Block, T::Store>>,
        assigner: Arc<T::Assigner>,
        fetcher: Arc<T::Fetcher>,
        verifier: Arc<BackfillVerifier<T::Block, T::SignatureVerifier>>,
        log: Logger,
    ) -> Self {
        Self {
            config,
            spec,
            clock,
            status,
            assigner,
            fetcher,
            verifier,
            log: log.new(o!("service" => "backfill")),
        }
    }

    /// Runs the backfill to completion or to a fatal error.
    ///
    /// Returns `Ok(())` both when history has been extended down to the
    /// retention floor and when there was nothing to do. Cancellation is by
    /// dropping the returned future: the pool signals its workers, which
    /// abandon any in-flight fetch; interrupted batches are rebuilt from the
    /// persisted status on restart.
    pub async fn run(self) -> Result<(), BackfillError> {
        let current = self.clock.now().ok_or(BackfillError::ClockNotReady)?;
        let min = minimum_backfill_slot(current, &self.spec);
        let status = self.status.status();
        if status.low_slot < min {
            info!(
                self.log, "No backfill required";
                "low_slot" => %status.low_slot, "minimum" => %min
            );
            return Ok(());
        }

        let mut sequencer = BatchSequencer::<T::Block>::new(
            self.config.worker_count,
            min,
            status.low_slot,
            Slot::new(self.config.batch_size),
        );
        let mut pool = BatchWorkerPool::<T>::spawn(
            self.config.worker_count,
            self.spec.slots_per_epoch,
            self.assigner.clone(),
            self.fetcher.clone(),
            self.verifier.clone(),
            self.log.clone(),
        );
        info!(
            self.log, "Starting historical block backfill";
            "from" => %status.low_slot, "to" => %min, "batches" => sequencer.num_todo()
        );
        self.schedule_todos(&mut sequencer, &mut pool).await?;

        loop {
            let batch = match pool.complete().await {
                Ok(batch) => batch,
                Err(PoolError::EndSequence { final_slot }) => {
                    info!(
                        self.log, "Historical block backfill complete";
                        "backfill_slot" => %final_slot
                    );
                    return Ok(());
                }
                Err(PoolError::Shutdown) => {
                    crit!(self.log, "Backfill worker pool shut down unexpectedly");
                    return Err(BackfillError::PoolShutdown);
                }
            };
            sequencer.update(batch);

            self.import_batches(&mut sequencer)?;
            metrics::set_gauge(
                &metrics::BACKFILL_BATCHES_WAITING,
                sequencer.count_with_state(BatchState::Importable) as i64,
            );

            let now = self.clock.now().ok_or(BackfillError::ClockNotReady)?;
            if let Err(e) = sequencer.move_minimum(minimum_backfill_slot(now, &self.spec)) {
                crit!(self.log, "Backfill retention floor moved backwards"; "error" => %e);
                return Err(BackfillError::Sequencer(e));
            }

            self.schedule_todos(&mut sequencer, &mut pool).await?;
        }
    }

    /// Imports the ready prefix of the window, stopping at the first batch
    /// that fails to chain.
    fn import_batches(
        &self,
        sequencer: &mut BatchSequencer<T::Block>,
    ) -> Result<(), BackfillError> {
        let importable = sequencer.importable();
        let total = importable.len();
        let mut imported: u64 = 0;
        for batch in importable {
            if batch.results.is_empty() {
                // Every slot in the range was skipped; importing is a no-op
                // status advance.
                debug!(
                    self.log, "Importable batch contains no blocks";
                    "begin" => %batch.begin, "end" => %batch.end
                );
            }
            match self.import_batch(&batch) {
                Ok(_) => {
                    sequencer.update(batch.with_state(BatchState::ImportComplete));
                    imported += 1;
                }
                Err(ImportError::ParentMismatch {
                    expected,
                    got,
                    slot,
                }) => {
                    debug!(
                        self.log, "Backfill batch failed to chain";
                        "begin" => %batch.begin, "end" => %batch.end, "slot" => %slot,
                        "expected_parent" => ?expected, "got" => ?got
                    );
                    if let Some(peer) = batch.peer {
                        self.assigner.report_batch_failure(&peer);
                    }
                    sequencer.update(batch.with_retryable_error("parent root mismatch"));
                    // Batches below this one cannot be chained until it is
                    // re-downloaded.
                    break;
                }
                Err(ImportError::Store(e)) => {
                    crit!(
                        self.log, "Non-recoverable database error during backfill import";
                        "error" => %e
                    );
                    return Err(BackfillError::Store(e));
                }
            }
        }
        if imported > 0 {
            metrics::inc_counter_by(&metrics::BACKFILL_BATCHES_IMPORTED, imported);
        }
        info!(
            self.log, "Backfill batches processed";
            "imported" => imported, "importable" => total,
            "batches_remaining" => sequencer.num_todo()
        );
        Ok(())
    }

    fn import_batch(&self, batch: &Batch<T::Block>) -> Result<BackfillStatus, ImportError> {
        self.status.ensure_parent(batch)?;
        self.status
            .fill_back(&batch.results)
            .map_err(ImportError::Store)
    }

    /// Hands newly sequenced batches to the pool, marking their window slots
    /// in flight.
    async fn schedule_todos(
        &self,
        sequencer: &mut BatchSequencer<T::Block>,
        pool: &mut BatchWorkerPool<T>,
    ) -> Result<(), BackfillError> {
        let batches = match sequencer.sequence() {
            Ok(batches) => batches,
            // Importable batches are stuck behind a batch that must complete
            // first so that parent roots can be chained across batches.
            Err(SequencerError::MaxBatches) => {
                debug!(
                    self.log,
                    "Backfill batches waiting for descendant batch to complete"
                );
                return Ok(());
            }
            Err(e) => return Err(BackfillError::Sequencer(e)),
        };
        for batch in batches {
            if batch.state == BatchState::EndSequence {
                pool.todo(batch)
                    .await
                    .map_err(|_| BackfillError::PoolShutdown)?;
                continue;
            }
            let batch = batch.with_state(BatchState::InFlight);
            sequencer.update(batch.clone());
            pool.todo(batch)
                .await
                .map_err(|_| BackfillError::PoolShutdown)?;
        }
        Ok(())
    }
}

/// The lowest slot the node is required to retain, looking back
/// `MIN_EPOCHS_FOR_BLOCK_REQUESTS` from the current slot. Rises as the clock
/// advances.
pub fn minimum_backfill_slot(current: Slot, spec: &ChainSpec) -> Slot {
    let epochs = spec
        .min_epochs_for_block_requests
        .min(max_safe_epoch(spec.slots_per_epoch).as_u64());
    let offset = Epoch::new(epochs).start_slot(spec.slots_per_epoch);
    current.saturating_sub(offset)
}

/// The highest epoch whose first slot still fits in a `u64`.
pub fn max_safe_epoch(slots_per_epoch: u64) -> Epoch {
    Epoch::new(u64::MAX / slots_per_epoch)
}
