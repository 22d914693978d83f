use crate::batch::{Batch, BatchState};
use crate::block::BackfillBlock;
use types::Slot;

/// Pure slot-range arithmetic over `(min, max, size)`: produces the batch
/// preceding a given point and counts the work left above the retention
/// floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batcher {
    pub(crate) min: Slot,
    pub(crate) max: Slot,
    pub(crate) size: Slot,
}

impl Batcher {
    pub fn new(min: Slot, max: Slot, size: Slot) -> Self {
        debug_assert!(size > 0);
        debug_assert!(min <= max);
        Self { min, max, size }
    }

    /// The batch immediately below `b`.
    pub fn before_batch<B: BackfillBlock>(&self, b: &Batch<B>) -> Batch<B> {
        self.before(b.begin)
    }

    /// The batch whose exclusive upper bound is `up_to`.
    ///
    /// Requesting a batch at or below the retention floor yields the
    /// `EndSequence` sentinel, signalling that no further batches will be
    /// produced.
    pub fn before<B: BackfillBlock>(&self, up_to: Slot) -> Batch<B> {
        if up_to <= self.min {
            return Batch::new(up_to, up_to, BatchState::EndSequence);
        }
        let begin = if up_to > self.min + self.size.as_u64() {
            up_to - self.size.as_u64()
        } else {
            self.min
        };

        // batch.end is exclusive, .begin is inclusive, so prev.end == next.begin
        Batch::new(begin, up_to, BatchState::Init)
    }

    /// The number of batches between the retention floor and `up_to`.
    pub fn remaining(&self, up_to: Slot) -> usize {
        if self.min >= up_to {
            return 0;
        }
        let delta = (up_to - self.min).as_u64();
        let size = self.size.as_u64();
        (delta / size) as usize + usize::from(delta % size != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::SignedBeaconBlockHeader;

    type B = SignedBeaconBlockHeader;

    fn batcher(min: u64, max: u64, size: u64) -> Batcher {
        Batcher::new(Slot::new(min), Slot::new(max), Slot::new(size))
    }

    #[test]
    fn before_produces_full_batches() {
        let r = batcher(0, 320, 64);
        let b: Batch<B> = r.before(Slot::new(320));
        assert_eq!(b.begin, Slot::new(256));
        assert_eq!(b.end, Slot::new(320));
        assert_eq!(b.state, BatchState::Init);
    }

    #[test]
    fn before_truncates_at_the_floor() {
        let r = batcher(0, 100, 64);
        let b: Batch<B> = r.before(Slot::new(36));
        assert_eq!(b.begin, Slot::new(0));
        assert_eq!(b.end, Slot::new(36));
        assert_eq!(b.state, BatchState::Init);

        let r = batcher(128, 320, 64);
        let b: Batch<B> = r.before(Slot::new(160));
        assert_eq!(b.begin, Slot::new(128));
        assert_eq!(b.end, Slot::new(160));
    }

    #[test]
    fn before_at_or_below_floor_is_the_sentinel() {
        let r = batcher(128, 320, 64);
        for up_to in [128, 100, 0] {
            let b: Batch<B> = r.before(Slot::new(up_to));
            assert_eq!(b.state, BatchState::EndSequence);
            assert_eq!(b.begin, Slot::new(up_to));
            assert_eq!(b.end, Slot::new(up_to));
        }
    }

    #[test]
    fn before_batch_tiles_the_range() {
        let r = batcher(0, 320, 64);
        let mut b: Batch<B> = r.before(Slot::new(320));
        let mut bounds = vec![(b.begin, b.end)];
        while b.state != BatchState::EndSequence {
            b = r.before_batch(&b);
            bounds.push((b.begin, b.end));
        }

        for pair in bounds.windows(2) {
            // The lower batch's upper bound equals the upper batch's lower bound.
            assert_eq!(pair[0].0, pair[1].1);
        }
        assert_eq!(bounds.len(), 6);
        assert_eq!(bounds[4], (Slot::new(0), Slot::new(64)));
        assert_eq!(bounds[5], (Slot::new(0), Slot::new(0)));
    }

    #[test]
    fn remaining_rounds_up() {
        let r = batcher(0, 320, 64);
        assert_eq!(r.remaining(Slot::new(320)), 5);
        assert_eq!(r.remaining(Slot::new(319)), 5);
        assert_eq!(r.remaining(Slot::new(64)), 1);
        assert_eq!(r.remaining(Slot::new(1)), 1);
        assert_eq!(r.remaining(Slot::new(0)), 0);

        let r = batcher(100, 320, 64);
        assert_eq!(r.remaining(Slot::new(100)), 0);
        assert_eq!(r.remaining(Slot::new(99)), 0);
        assert_eq!(r.remaining(Slot::new(164)), 1);
        assert_eq!(r.remaining(Slot::new(165)), 2);
    }
}
