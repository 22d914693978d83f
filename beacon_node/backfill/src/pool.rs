use crate::batch::{Batch, BatchState};
use crate::metrics;
use crate::verifier::BackfillVerifier;
use crate::p2p::{BlocksByRangeFetcher, PeerAssigner};
use crate::BackfillTypes;
use slog::{debug, warn, Logger};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex};
use types::Slot;

#[derive(Debug)]
pub enum PoolError {
    /// The batcher reached the retention floor and all in-flight work has
    /// drained; no more batches will complete.
    EndSequence { final_slot: Slot },
    /// The workers went away while work remained.
    Shutdown,
}

type SharedTodo<B> = Arc<Mutex<mpsc::Receiver<Batch<B>>>>;

/// A bounded pool of workers that download and verify batches.
///
/// Sequenced batches enter on the todo queue, are picked up by whichever
/// worker is idle and come back on the done queue as `Importable` or
/// `Retryable`. Dropping the pool signals the workers to exit, abandoning any
/// in-flight fetch.
pub struct BatchWorkerPool<T: BackfillTypes> {
    todo_tx: mpsc::Sender<Batch<T::Block>>,
    done_rx: mpsc::Receiver<Batch<T::Block>>,
    /// Dropped with the pool; workers observe the closure and exit.
    _shutdown_tx: watch::Sender<()>,
    /// The end-of-sequence sentinel, held back until the pool drains.
    end_sequence: Option<Batch<T::Block>>,
    /// Batches currently inside the pool (queued, with a worker, or done but
    /// not yet collected).
    in_flight: usize,
    log: Logger,
}

impl<T: BackfillTypes> BatchWorkerPool<T> {
    /// Starts `worker_count` workers on the current tokio runtime.
    pub fn spawn(
        worker_count: usize,
        slots_per_epoch: u64,
        assigner: Arc<T::Assigner>,
        fetcher: Arc<T::Fetcher>,
        verifier: Arc<BackfillVerifier<T::Block, T::SignatureVerifier>>,
        log: Logger,
    ) -> Self {
        let buffer = worker_count.max(1) * 2;
        let (todo_tx, todo_rx) = mpsc::channel(buffer);
        let (done_tx, done_rx) = mpsc::channel(buffer);
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let todo_rx: SharedTodo<T::Block> = Arc::new(Mutex::new(todo_rx));

        for id in 0..worker_count {
            let worker = Worker::<T> {
                id,
                todo: todo_rx.clone(),
                done: done_tx.clone(),
                shutdown: shutdown_rx.clone(),
                assigner: assigner.clone(),
                fetcher: fetcher.clone(),
                verifier: verifier.clone(),
                slots_per_epoch,
                log: log.clone(),
            };
            tokio::spawn(worker.run());
        }

        Self {
            todo_tx,
            done_rx,
            _shutdown_tx: shutdown_tx,
            end_sequence: None,
            in_flight: 0,
            log,
        }
    }

    /// Queue a sequenced batch for download, or record the end-of-sequence
    /// sentinel.
    pub async fn todo(&mut self, batch: Batch<T::Block>) -> Result<(), PoolError> {
        if batch.state == BatchState::EndSequence {
            debug!(self.log, "Backfill batch sequence ended"; "final_slot" => %batch.begin);
            self.end_sequence = Some(batch);
            return Ok(());
        }
        self.in_flight += 1;
        self.todo_tx
            .send(batch)
            .await
            .map_err(|_| PoolError::Shutdown)
    }

    /// Block until a worker finishes a batch.
    ///
    /// Once the sentinel has been recorded and no batches remain in flight,
    /// returns [`PoolError::EndSequence`].
    pub async fn complete(&mut self) -> Result<Batch<T::Block>, PoolError> {
        if self.in_flight == 0 {
            if let Some(end) = self.end_sequence.take() {
                return Err(PoolError::EndSequence {
                    final_slot: end.begin,
                });
            }
        }
        let batch = self.done_rx.recv().await.ok_or(PoolError::Shutdown)?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Ok(batch)
    }
}

/// One member of the pool: loops over the shared todo queue, downloading and
/// verifying one batch at a time.
struct Worker<T: BackfillTypes> {
    id: usize,
    todo: SharedTodo<T::Block>,
    done: mpsc::Sender<Batch<T::Block>>,
    shutdown: watch::Receiver<()>,
    assigner: Arc<T::Assigner>,
    fetcher: Arc<T::Fetcher>,
    verifier: Arc<BackfillVerifier<T::Block, T::SignatureVerifier>>,
    slots_per_epoch: u64,
    log: Logger,
}

impl<T: BackfillTypes> Worker<T> {
    async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        loop {
            let batch = tokio::select! {
                _ = shutdown.changed() => {
                    debug!(self.log, "Backfill worker exiting"; "worker" => self.id);
                    return;
                }
                batch = Self::next(&self.todo) => match batch {
                    Some(batch) => batch,
                    None => return,
                },
            };
            debug!(
                self.log, "Backfill worker received batch";
                "worker" => self.id, "begin" => %batch.begin, "end" => %batch.end
            );
            let finished = tokio::select! {
                _ = shutdown.changed() => {
                    debug!(self.log, "Backfill worker exiting"; "worker" => self.id);
                    return;
                }
                finished = self.handle(batch) => finished,
            };
            if self.done.send(finished).await.is_err() {
                return;
            }
        }
    }

    async fn next(todo: &SharedTodo<T::Block>) -> Option<Batch<T::Block>> {
        todo.lock().await.recv().await
    }

    async fn handle(&self, batch: Batch<T::Block>) -> Batch<T::Block> {
        let peer = match self.assigner.assign(batch.midpoint_epoch(self.slots_per_epoch)) {
            Ok(peer) => peer,
            Err(e) => {
                debug!(
                    self.log, "No peer available for backfill batch";
                    "worker" => self.id, "begin" => %batch.begin, "error" => %e
                );
                return batch.with_retryable_error(e);
            }
        };
        let batch = batch.with_peer(peer);

        let start = Instant::now();
        let blocks = match self.fetcher.blocks_by_range(&peer, batch.request()).await {
            Ok(blocks) => blocks,
            Err(e) => {
                debug!(
                    self.log, "Backfill batch download failed";
                    "worker" => self.id, "begin" => %batch.begin, "peer" => %peer, "error" => %e
                );
                return batch.with_retryable_error(e);
            }
        };
        metrics::observe(
            &metrics::BACKFILL_BATCH_TIME_DOWNLOADING,
            start.elapsed().as_millis() as f64,
        );

        let verify_start = Instant::now();
        let verified = self.verifier.verify(batch.begin, batch.end, blocks);
        metrics::observe(
            &metrics::BACKFILL_BATCH_TIME_VERIFYING,
            verify_start.elapsed().as_millis() as f64,
        );
        match verified {
            Ok(blocks) => batch.with_results(blocks),
            Err(e) => {
                warn!(
                    self.log, "Backfill batch failed verification";
                    "worker" => self.id, "begin" => %batch.begin, "peer" => %peer, "error" => %e
                );
                batch.with_retryable_error(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::{NoSuitablePeers, PeerAssigner, PeerId};
    use crate::test_utils::{
        discard_logger, ChainBuilder, RootSignatureVerifier, SharedManualClock, StaticAssigner,
        TestFetcher,
    };
    use crate::BackfillTypes;
    use types::{ChainSpec, Epoch, ForkSchedule, Hash256, SignedBeaconBlockHeader};

    struct NoPeersAssigner;

    impl PeerAssigner for NoPeersAssigner {
        fn assign(&self, _epoch: Epoch) -> Result<PeerId, NoSuitablePeers> {
            Err(NoSuitablePeers)
        }
    }

    struct NoPeersTypes;

    impl BackfillTypes for NoPeersTypes {
        type Block = SignedBeaconBlockHeader;
        type Store = crate::test_utils::MemoryStore;
        type SlotClock = SharedManualClock;
        type Assigner = NoPeersAssigner;
        type Fetcher = TestFetcher;
        type SignatureVerifier = RootSignatureVerifier;
    }

    struct TestTypes;

    impl BackfillTypes for TestTypes {
        type Block = SignedBeaconBlockHeader;
        type Store = crate::test_utils::MemoryStore;
        type SlotClock = SharedManualClock;
        type Assigner = StaticAssigner;
        type Fetcher = TestFetcher;
        type SignatureVerifier = RootSignatureVerifier;
    }

    fn verifier() -> Arc<BackfillVerifier<SignedBeaconBlockHeader, RootSignatureVerifier>> {
        Arc::new(BackfillVerifier::new(
            ForkSchedule::single([0; 4]),
            Hash256::zero(),
            ChainSpec::mainnet(),
            RootSignatureVerifier,
        ))
    }

    fn batch(begin: u64, end: u64) -> Batch<SignedBeaconBlockHeader> {
        Batch::new(Slot::new(begin), Slot::new(end), BatchState::Sequenced)
    }

    #[tokio::test]
    async fn workers_download_and_verify_batches() {
        let chain = ChainBuilder::mainnet(320);
        let fetcher = Arc::new(TestFetcher::new(chain.blocks().to_vec()));
        let mut pool = BatchWorkerPool::<TestTypes>::spawn(
            3,
            32,
            Arc::new(StaticAssigner::random_peer()),
            fetcher,
            verifier(),
            discard_logger(),
        );

        pool.todo(batch(192, 256)).await.unwrap();
        pool.todo(batch(128, 192)).await.unwrap();

        let mut finished = vec![
            pool.complete().await.unwrap(),
            pool.complete().await.unwrap(),
        ];
        finished.sort_by_key(|b| b.begin);

        assert_eq!(finished[0].state, BatchState::Importable);
        assert_eq!(finished[0].results.len(), 64);
        assert_eq!(finished[1].state, BatchState::Importable);
        assert!(finished[1].peer.is_some());
    }

    #[tokio::test]
    async fn assignment_failures_are_retryable() {
        let chain = ChainBuilder::mainnet(320);
        let fetcher = Arc::new(TestFetcher::new(chain.blocks().to_vec()));
        let mut pool = BatchWorkerPool::<NoPeersTypes>::spawn(
            1,
            32,
            Arc::new(NoPeersAssigner),
            fetcher,
            verifier(),
            discard_logger(),
        );

        pool.todo(batch(192, 256)).await.unwrap();
        let finished = pool.complete().await.unwrap();
        assert_eq!(finished.state, BatchState::Retryable);
        assert_eq!(finished.retries, 1);
    }

    #[tokio::test]
    async fn fetch_failures_are_retryable() {
        let chain = ChainBuilder::mainnet(320);
        let fetcher = Arc::new(TestFetcher::new(chain.blocks().to_vec()));
        fetcher.fail_range(192, 1);
        let mut pool = BatchWorkerPool::<TestTypes>::spawn(
            1,
            32,
            Arc::new(StaticAssigner::random_peer()),
            fetcher,
            verifier(),
            discard_logger(),
        );

        pool.todo(batch(192, 256)).await.unwrap();
        let finished = pool.complete().await.unwrap();
        assert_eq!(finished.state, BatchState::Retryable);

        // The scripted failure is consumed; the retry succeeds.
        pool.todo(finished.with_state(BatchState::Sequenced))
            .await
            .unwrap();
        assert_eq!(
            pool.complete().await.unwrap().state,
            BatchState::Importable
        );
    }

    #[tokio::test]
    async fn sentinel_is_released_once_work_drains() {
        let chain = ChainBuilder::mainnet(320);
        let fetcher = Arc::new(TestFetcher::new(chain.blocks().to_vec()));
        let mut pool = BatchWorkerPool::<TestTypes>::spawn(
            2,
            32,
            Arc::new(StaticAssigner::random_peer()),
            fetcher,
            verifier(),
            discard_logger(),
        );

        pool.todo(batch(256, 320)).await.unwrap();
        pool.todo(Batch::new(Slot::new(256), Slot::new(256), BatchState::EndSequence))
            .await
            .unwrap();

        // The in-flight batch is delivered before the sentinel.
        assert!(pool.complete().await.is_ok());
        match pool.complete().await {
            Err(PoolError::EndSequence { final_slot }) => {
                assert_eq!(final_slot, Slot::new(256));
            }
            other => panic!("expected end of sequence, got {other:?}"),
        }
    }
}
