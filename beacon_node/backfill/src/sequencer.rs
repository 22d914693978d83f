use crate::batch::{Batch, BatchState};
use crate::batcher::Batcher;
use crate::block::BackfillBlock;
use crate::metrics;
use std::fmt;
use types::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerError {
    /// The window is full of in-flight or blocked batches; nothing new can be
    /// scheduled until a batch completes.
    MaxBatches,
    /// The minimum backfill slot can only be increased, not decreased.
    CannotDecreaseMinimum,
}

impl fmt::Display for SequencerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SequencerError::MaxBatches => {
                write!(f, "batch requested in excess of max outstanding batches")
            }
            SequencerError::CannotDecreaseMinimum => {
                write!(f, "the minimum backfill slot can only be increased, not decreased")
            }
        }
    }
}

/// A fixed-capacity window of batches in descending slot order.
///
/// The window tiles the slot range below the checkpoint: `seq[i].begin ==
/// seq[i + 1].end`, with `seq[0].end` at the current low slot. Completed
/// batches are compacted out and replaced with fresh batches below the lowest
/// one, so the window slides towards the retention floor as imports progress.
/// Once the batcher reaches the floor it emits `EndSequence` sentinels, which
/// accumulate at the bottom of the window until nothing else remains.
pub struct BatchSequencer<B: BackfillBlock> {
    batcher: Batcher,
    seq: Vec<Batch<B>>,
}

impl<B: BackfillBlock> BatchSequencer<B> {
    pub fn new(capacity: usize, min: Slot, max: Slot, size: Slot) -> Self {
        Self {
            batcher: Batcher::new(min, max, size),
            seq: vec![Batch::nil(); capacity],
        }
    }

    /// Raise the retention floor, shrinking the remaining work.
    ///
    /// Lowering is forbidden: batches may already have been skipped on the
    /// assumption their slots were below the retention window. The floor only
    /// governs batches not yet produced; batches already in the window
    /// complete as sequenced.
    pub fn move_minimum(&mut self, min: Slot) -> Result<(), SequencerError> {
        if min < self.batcher.min {
            return Err(SequencerError::CannotDecreaseMinimum);
        }
        self.batcher.min = min;
        Ok(())
    }

    pub fn minimum(&self) -> Slot {
        self.batcher.min
    }

    pub fn count_with_state(&self, state: BatchState) -> usize {
        self.seq.iter().filter(|b| b.state == state).count()
    }

    /// Integrate a batch returned by a worker or progressed by the importer,
    /// then compact completed batches out of the window.
    ///
    /// Assumes batches complete and `update` is called in descending slot
    /// order. This holds because the caller does not know the expected parent
    /// for a batch until the batch above it has been imported.
    pub fn update(&mut self, b: Batch<B>) {
        if self.seq.is_empty() {
            return;
        }
        let mut done = 0;
        for i in 0..self.seq.len() {
            if b.replaces(&self.seq[i]) {
                self.seq[i] = b.clone();
            }
            if self.seq[i].state == BatchState::ImportComplete {
                done += 1;
                continue;
            }
            // Move the unfinished batches down over the finished ones.
            let unfinished = self.seq[i].clone();
            self.seq[i - done] = unfinished;
        }
        // Refill the vacated tail with the next batches in the sequence,
        // chaining each below the previously-lowest batch.
        let mut last = self.seq[self.seq.len() - 1].clone();
        for i in (self.seq.len() - done)..self.seq.len() {
            self.seq[i] = self.batcher.before_batch(&last);
            last = self.seq[i].clone();
        }
    }

    /// Batches ready to hand to a worker, in descending slot order.
    ///
    /// Unused window slots are filled from the batcher; fresh and retryable
    /// batches transition to `Sequenced`. Once the window has drained down to
    /// the retention floor this returns the `EndSequence` sentinel alone.
    /// `MaxBatches` means every slot is occupied by in-flight or blocked
    /// batches and the caller should wait for a completion.
    pub fn sequence(&mut self) -> Result<Vec<Batch<B>>, SequencerError> {
        let mut out = Vec::new();
        // Batch start slots are in descending order, seq[i].begin == seq[i + 1].end.
        for i in 0..self.seq.len() {
            if self.seq[i].state == BatchState::Nil {
                self.seq[i] = if i == 0 {
                    self.batcher.before(self.batcher.max)
                } else {
                    let previous = self.seq[i - 1].clone();
                    self.batcher.before_batch(&previous)
                };
            }
            match self.seq[i].state {
                BatchState::Init | BatchState::Retryable => {
                    self.seq[i] = self.seq[i].clone().with_state(BatchState::Sequenced);
                    out.push(self.seq[i].clone());
                }
                BatchState::EndSequence => {
                    // Everything below the sentinel is more sentinels; report
                    // it only when there is nothing else to schedule.
                    if out.is_empty() {
                        out.push(self.seq[i].clone());
                    }
                    break;
                }
                _ => continue,
            }
        }
        if out.is_empty() {
            return Err(SequencerError::MaxBatches);
        }
        Ok(out)
    }

    /// The longest prefix of the window that is ready to import.
    ///
    /// A ready batch behind an unfinished one is withheld: imports must
    /// proceed strictly newest-to-oldest so that each batch's newest block
    /// can be checked against the previously imported batch's parent root.
    pub fn importable(&self) -> Vec<Batch<B>> {
        let mut out = Vec::new();
        for b in &self.seq {
            if b.state == BatchState::Importable {
                out.push(b.clone());
            } else {
                // As soon as we hit a batch in a different state, everything
                // leading up to it is the importable prefix.
                break;
            }
        }
        out
    }

    /// Batches not yet imported, including those the window has not reached.
    /// Also publishes the `backfill_remaining_batches` gauge.
    pub fn num_todo(&self) -> usize {
        let mut todo = 0;
        if let Some(lowest) = self.seq.last() {
            if lowest.state != BatchState::EndSequence {
                todo = self.batcher.remaining(lowest.begin);
            }
            for b in &self.seq {
                match b.state {
                    BatchState::EndSequence | BatchState::ImportComplete | BatchState::Nil => {}
                    _ => todo += 1,
                }
            }
        }
        metrics::set_gauge(&metrics::BACKFILL_REMAINING_BATCHES, todo as i64);
        todo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;
    use types::SignedBeaconBlockHeader;

    type TestBatch = Batch<SignedBeaconBlockHeader>;
    type TestSequencer = BatchSequencer<SignedBeaconBlockHeader>;

    fn sequencer(capacity: usize, min: u64, max: u64, size: u64) -> TestSequencer {
        BatchSequencer::new(capacity, Slot::new(min), Slot::new(max), Slot::new(size))
    }

    fn ranges(batches: &[TestBatch]) -> Vec<(u64, u64)> {
        batches
            .iter()
            .map(|b| (b.begin.as_u64(), b.end.as_u64()))
            .collect()
    }

    fn window(seq: &TestSequencer) -> Vec<(u64, u64, BatchState)> {
        seq.seq
            .iter()
            .map(|b| (b.begin.as_u64(), b.end.as_u64(), b.state))
            .collect()
    }

    /// Tiling applies down to the first sentinel; window slots below it hold
    /// only further sentinels or unused slots and are never examined.
    fn tiling_holds(seq: &TestSequencer) -> bool {
        for i in 0..seq.seq.len().saturating_sub(1) {
            let hi = &seq.seq[i];
            let lo = &seq.seq[i + 1];
            if matches!(hi.state, BatchState::Nil | BatchState::EndSequence)
                || lo.state == BatchState::Nil
            {
                break;
            }
            if hi.begin != lo.end {
                return false;
            }
        }
        true
    }

    fn apply_op(seq: &mut TestSequencer, op: u8) {
        match op % 5 {
            0 => {
                let _ = seq.sequence();
            }
            1 => {
                // A worker finishes the highest dispatched batch.
                if let Some(b) = seq
                    .seq
                    .iter()
                    .find(|b| matches!(b.state, BatchState::Sequenced | BatchState::InFlight))
                    .cloned()
                {
                    seq.update(b.with_results(Vec::new()));
                }
            }
            2 => {
                // The driver imports the ready prefix, newest first.
                for b in seq.importable() {
                    seq.update(b.with_state(BatchState::ImportComplete));
                }
            }
            3 => {
                // A worker fails a batch.
                if let Some(b) = seq
                    .seq
                    .iter()
                    .find(|b| matches!(b.state, BatchState::Sequenced | BatchState::InFlight))
                    .cloned()
                {
                    seq.update(b.with_retryable_error("synthetic failure"));
                }
            }
            _ => {
                let raised = seq.minimum() + (op / 5) as u64;
                let _ = seq.move_minimum(raised);
            }
        }
    }

    #[test]
    fn initial_sequence_tiles_the_window() {
        let mut seq = sequencer(5, 0, 320, 64);
        let batches = seq.sequence().unwrap();

        assert_eq!(
            ranges(&batches),
            vec![(256, 320), (192, 256), (128, 192), (64, 128), (0, 64)]
        );
        assert!(batches.iter().all(|b| b.state == BatchState::Sequenced));
        assert!(tiling_holds(&seq));
    }

    #[test]
    fn sequence_truncates_at_the_floor() {
        let mut seq = sequencer(5, 0, 100, 64);
        let batches = seq.sequence().unwrap();

        // The lower batch is truncated to the floor; the window below it is
        // never scheduled.
        assert_eq!(ranges(&batches), vec![(36, 100), (0, 36)]);
    }

    #[test]
    fn sequence_reissues_retryable_batches() {
        let mut seq = sequencer(2, 0, 256, 64);
        let batches = seq.sequence().unwrap();
        seq.update(batches[0].clone().with_retryable_error("timed out"));

        let reissued = seq.sequence().unwrap();
        assert_eq!(ranges(&reissued), vec![(192, 256)]);
        assert_eq!(reissued[0].state, BatchState::Sequenced);
        assert_eq!(reissued[0].retries, 1);
    }

    #[test]
    fn sequence_fails_when_window_is_busy() {
        let mut seq = sequencer(3, 0, 512, 64);
        for b in seq.sequence().unwrap() {
            seq.update(b.with_state(BatchState::InFlight));
        }

        assert_eq!(seq.sequence(), Err(SequencerError::MaxBatches));
    }

    #[test]
    fn update_compacts_completed_batches_and_extends_the_window() {
        let mut seq = sequencer(5, 0, 640, 64);
        let batches = seq.sequence().unwrap();
        assert_eq!(ranges(&batches)[0], (576, 640));

        seq.update(batches[0].clone().with_results(Vec::new()));
        seq.update(batches[0].clone().with_state(BatchState::ImportComplete));

        assert_eq!(seq.count_with_state(BatchState::ImportComplete), 0);
        assert!(tiling_holds(&seq));
        // The vacated slot is refilled below the previously-lowest batch.
        let fresh = seq.sequence().unwrap();
        assert_eq!(ranges(&fresh), vec![(256, 320)]);
    }

    #[test]
    fn update_is_idempotent() {
        let mut seq = sequencer(4, 0, 512, 64);
        let batches = seq.sequence().unwrap();

        let done = batches[0].clone().with_results(Vec::new());
        seq.update(done.clone());
        let once = window(&seq);
        seq.update(done);
        assert_eq!(window(&seq), once);
    }

    #[test]
    fn importable_is_the_ready_prefix() {
        let mut seq = sequencer(4, 0, 512, 64);
        let batches = seq.sequence().unwrap();

        // The second batch is ready but the first is not: nothing importable.
        seq.update(batches[1].clone().with_results(Vec::new()));
        assert!(seq.importable().is_empty());

        // Once the first is ready the prefix covers both.
        seq.update(batches[0].clone().with_results(Vec::new()));
        assert_eq!(ranges(&seq.importable()), vec![(448, 512), (384, 448)]);

        // The prefix stops at a failed batch even when a later batch is ready.
        seq.update(batches[2].clone().with_retryable_error("bad blocks"));
        seq.update(batches[3].clone().with_results(Vec::new()));
        assert_eq!(ranges(&seq.importable()), vec![(448, 512), (384, 448)]);
    }

    #[test]
    fn sentinel_is_returned_once_the_window_drains() {
        let mut seq = sequencer(5, 128, 320, 64);
        let batches = seq.sequence().unwrap();
        assert_eq!(ranges(&batches), vec![(256, 320), (192, 256), (128, 192)]);

        for b in batches {
            seq.update(b.clone().with_results(Vec::new()));
            seq.update(b.with_state(BatchState::ImportComplete));
        }

        let end = seq.sequence().unwrap();
        assert_eq!(end.len(), 1);
        assert_eq!(end[0].state, BatchState::EndSequence);
        assert_eq!(end[0].begin, Slot::new(128));
    }

    #[test]
    fn move_minimum_only_rises() {
        let mut seq = sequencer(4, 100, 512, 64);
        assert_eq!(seq.move_minimum(Slot::new(200)), Ok(()));
        assert_eq!(seq.minimum(), Slot::new(200));

        assert_eq!(
            seq.move_minimum(Slot::new(199)),
            Err(SequencerError::CannotDecreaseMinimum)
        );
        assert_eq!(seq.minimum(), Slot::new(200));
    }

    #[test]
    fn move_minimum_does_not_disturb_scheduled_batches() {
        let mut seq = sequencer(5, 0, 320, 64);
        let batches = seq.sequence().unwrap();
        let before = window(&seq);

        seq.move_minimum(Slot::new(80)).unwrap();
        assert_eq!(window(&seq), before);
        assert_eq!(seq.sequence(), Err(SequencerError::MaxBatches));

        // Batches already below the raised floor still complete as sequenced;
        // the floor only governs batches produced afterwards.
        for b in batches {
            seq.update(b.clone().with_results(Vec::new()));
            seq.update(b.with_state(BatchState::ImportComplete));
        }
        let end = seq.sequence().unwrap();
        assert_eq!(end[0].state, BatchState::EndSequence);
        assert_eq!(end[0].begin, Slot::new(0));
    }

    #[test]
    fn num_todo_counts_window_and_unscheduled_work() {
        let mut seq = sequencer(5, 0, 640, 64);
        assert_eq!(seq.num_todo(), 0);

        seq.sequence().unwrap();
        // Five batches in the window plus five not yet produced.
        assert_eq!(seq.num_todo(), 10);
    }

    quickcheck! {
        fn invariants_hold_under_arbitrary_interleavings(ops: Vec<u8>) -> bool {
            let mut seq = sequencer(4, 0, 512, 64);
            let _ = seq.sequence();
            for op in ops {
                apply_op(&mut seq, op);
                if !tiling_holds(&seq) {
                    return false;
                }
                // No completed batch survives an update.
                if seq.seq.iter().any(|b| b.state == BatchState::ImportComplete) {
                    return false;
                }
                // Importable results form a prefix of the window.
                let importable = seq.importable();
                if !importable.iter().all(|b| b.state == BatchState::Importable) {
                    return false;
                }
                if seq.seq[..importable.len()]
                    .iter()
                    .any(|b| b.state != BatchState::Importable)
                {
                    return false;
                }
                if importable.len() < seq.seq.len()
                    && seq.seq[importable.len()].state == BatchState::Importable
                {
                    return false;
                }
            }
            true
        }

        fn sequence_returns_only_sequenced_or_sentinel(ops: Vec<u8>) -> bool {
            let mut seq = sequencer(4, 0, 512, 64);
            for op in ops {
                apply_op(&mut seq, op);
            }
            match seq.sequence() {
                Ok(batches) => batches
                    .iter()
                    .all(|b| matches!(b.state, BatchState::Sequenced | BatchState::EndSequence)),
                Err(SequencerError::MaxBatches) => true,
                Err(_) => false,
            }
        }

        fn minimum_never_decreases(raises: Vec<u8>) -> bool {
            let mut seq = sequencer(4, 0, 512, 64);
            let mut min = 0u64;
            for raise in raises {
                min += raise as u64;
                if seq.move_minimum(Slot::new(min)).is_err() {
                    return false;
                }
                if min > 0
                    && seq.move_minimum(Slot::new(min - 1))
                        != Err(SequencerError::CannotDecreaseMinimum)
                {
                    return false;
                }
                if seq.minimum() != Slot::new(min) {
                    return false;
                }
            }
            true
        }
    }
}
