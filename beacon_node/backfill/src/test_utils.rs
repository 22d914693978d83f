//! Doubles for exercising the backfill engine without a network or database:
//! a deterministic block-chain builder, a scripted fetcher, an in-memory
//! store and a signature scheme that stands in for BLS.

use crate::p2p::{
    BlocksByRangeFetcher, BlocksByRangeRequest, FetchError, NoSuitablePeers, PeerAssigner, PeerId,
};
use crate::status::{BackfillStatus, BlockStore, StoreError};
use crate::verifier::SignatureVerifier;
use crate::BackfillTypes;
use async_trait::async_trait;
use parking_lot::Mutex;
use slog::{o, Logger};
use slot_clock::{ManualSlotClock, SlotClock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use types::{
    BeaconBlockHeader, ChainSpec, Domain, Epoch, ForkSchedule, Hash256, SignatureBytes,
    SignedBeaconBlockHeader, SignedRoot, Slot,
};

/// A logger that swallows everything.
pub fn discard_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

/// Deterministic stand-in for BLS: a signature is valid when its first 32
/// bytes equal the signing root.
pub struct RootSignatureVerifier;

impl SignatureVerifier<SignedBeaconBlockHeader> for RootSignatureVerifier {
    fn verify_proposer(&self, block: &SignedBeaconBlockHeader, domain: Hash256) -> bool {
        let root = SignedRoot::signing_root(&block.message, domain);
        block.signature.as_bytes()[..32] == root.as_bytes()[..]
    }
}

/// Signs a header the way [`RootSignatureVerifier`] expects.
pub fn sign_header(header: BeaconBlockHeader, domain: Hash256) -> SignedBeaconBlockHeader {
    let root = header.signing_root(domain);
    let mut bytes = [0; 96];
    bytes[..32].copy_from_slice(root.as_bytes());
    SignedBeaconBlockHeader {
        message: header,
        signature: SignatureBytes::new(bytes),
    }
}

/// Builds a fully linked, signed chain of headers, optionally with skipped
/// slots.
pub struct ChainBuilder {
    spec: ChainSpec,
    fork_schedule: ForkSchedule,
    genesis_validators_root: Hash256,
    blocks: Vec<SignedBeaconBlockHeader>,
}

impl ChainBuilder {
    pub fn new(spec: ChainSpec, fork_schedule: ForkSchedule, genesis_validators_root: Hash256) -> Self {
        Self {
            spec,
            fork_schedule,
            genesis_validators_root,
            blocks: Vec::new(),
        }
    }

    /// A mainnet-spec chain with a block at every slot in `0..up_to`.
    pub fn mainnet(up_to: u64) -> Self {
        let mut chain = Self::new(
            ChainSpec::mainnet(),
            ForkSchedule::single([0; 4]),
            Hash256::zero(),
        );
        for slot in 0..up_to {
            chain.push_slot(slot);
        }
        chain
    }

    /// Extends the chain with a block at `slot`, chained to the last block.
    pub fn push_slot(&mut self, slot: u64) {
        let parent_root = self
            .blocks
            .last()
            .map(|block| block.message.canonical_root())
            .unwrap_or_else(Hash256::zero);
        let header = BeaconBlockHeader {
            slot: Slot::new(slot),
            proposer_index: slot % 64,
            parent_root,
            state_root: Hash256::from_low_u64_be(slot),
            body_root: Hash256::from_low_u64_be(slot.wrapping_mul(31).wrapping_add(1)),
        };
        let epoch = Slot::new(slot).epoch(self.spec.slots_per_epoch);
        let domain = self.spec.get_domain(
            epoch,
            Domain::BeaconProposer,
            &self.fork_schedule,
            self.genesis_validators_root,
        );
        self.blocks.push(sign_header(header, domain));
    }

    pub fn blocks(&self) -> &[SignedBeaconBlockHeader] {
        &self.blocks
    }

    /// The blocks with slots in `[begin, end)`, ascending.
    pub fn blocks_in(&self, begin: Slot, end: Slot) -> Vec<SignedBeaconBlockHeader> {
        self.blocks
            .iter()
            .filter(|block| block.message.slot >= begin && block.message.slot < end)
            .cloned()
            .collect()
    }

    pub fn block_at(&self, slot: u64) -> Option<&SignedBeaconBlockHeader> {
        self.blocks
            .iter()
            .find(|block| block.message.slot == Slot::new(slot))
    }

    /// The status of a node checkpointed at `origin_slot`, before any
    /// backfill has happened.
    pub fn status_at(&self, origin_slot: u64) -> BackfillStatus {
        let origin = self
            .block_at(origin_slot)
            .expect("origin block must be in the chain");
        BackfillStatus {
            low_slot: origin.message.slot,
            low_parent_root: origin.message.parent_root,
            origin_slot: origin.message.slot,
            origin_root: origin.message.canonical_root(),
        }
    }
}

/// Always assigns the same peer and records reported batch failures.
pub struct StaticAssigner {
    peer: PeerId,
    failures: Mutex<Vec<PeerId>>,
}

impl StaticAssigner {
    pub fn random_peer() -> Self {
        Self {
            peer: PeerId::random(),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Peers reported through `report_batch_failure`, in order.
    pub fn reported_failures(&self) -> Vec<PeerId> {
        self.failures.lock().clone()
    }
}

impl PeerAssigner for StaticAssigner {
    fn assign(&self, _epoch: Epoch) -> Result<PeerId, NoSuitablePeers> {
        Ok(self.peer)
    }

    fn report_batch_failure(&self, peer_id: &PeerId) {
        self.failures.lock().push(*peer_id);
    }
}

/// A `ManualSlotClock` behind an `Arc`, so a test can advance the clock that
/// a running service holds.
#[derive(Clone)]
pub struct SharedManualClock(pub Arc<ManualSlotClock>);

impl SharedManualClock {
    pub fn at_slot(slot: u64) -> Self {
        let clock = Self::new(
            Slot::new(0),
            Duration::from_secs(0),
            Duration::from_secs(12),
        );
        clock.set_slot(slot);
        clock
    }

    pub fn set_slot(&self, slot: u64) {
        self.0.set_slot(slot);
    }
}

impl SlotClock for SharedManualClock {
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self {
        Self(Arc::new(ManualSlotClock::new(
            genesis_slot,
            genesis_duration,
            slot_duration,
        )))
    }

    fn now(&self) -> Option<Slot> {
        self.0.now()
    }

    fn slot_of(&self, now: Duration) -> Option<Slot> {
        self.0.slot_of(now)
    }

    fn slot_duration(&self) -> Duration {
        self.0.slot_duration()
    }

    fn genesis_slot(&self) -> Slot {
        self.0.genesis_slot()
    }
}

/// Serves ranges out of a pre-built chain. Failures, substituted responses
/// and clock adjustments can be scripted per range start slot.
pub struct TestFetcher {
    blocks: Vec<SignedBeaconBlockHeader>,
    /// Remaining scripted failures, keyed by range start slot.
    failures: Mutex<HashMap<u64, usize>>,
    /// Remaining scripted chain corruptions, keyed by range start slot.
    corruptions: Mutex<HashMap<u64, usize>>,
    /// One-shot substituted responses, keyed by range start slot.
    overrides: Mutex<HashMap<u64, Vec<SignedBeaconBlockHeader>>>,
    /// One-shot clock adjustment performed when the keyed range is served.
    clock_bump: Mutex<Option<(u64, SharedManualClock, u64)>>,
}

impl TestFetcher {
    pub fn new(blocks: Vec<SignedBeaconBlockHeader>) -> Self {
        Self {
            blocks,
            failures: Mutex::new(HashMap::new()),
            corruptions: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
            clock_bump: Mutex::new(None),
        }
    }

    /// Fail the next `times` fetches of the range starting at `start_slot`.
    pub fn fail_range(&self, start_slot: u64, times: usize) {
        self.failures.lock().insert(start_slot, times);
    }

    /// Serve the next `times` fetches of the range starting at `start_slot`
    /// with a broken parent chain.
    pub fn corrupt_range(&self, start_slot: u64, times: usize) {
        self.corruptions.lock().insert(start_slot, times);
    }

    /// Serve the next fetch of the range starting at `start_slot` with the
    /// given blocks instead of the canonical chain.
    pub fn override_range(&self, start_slot: u64, blocks: Vec<SignedBeaconBlockHeader>) {
        self.overrides.lock().insert(start_slot, blocks);
    }

    /// Move `clock` to `to_slot` when the range starting at `start_slot` is
    /// first served.
    pub fn bump_clock_on(&self, start_slot: u64, clock: SharedManualClock, to_slot: u64) {
        *self.clock_bump.lock() = Some((start_slot, clock, to_slot));
    }

    fn take_scripted(map: &Mutex<HashMap<u64, usize>>, start_slot: u64) -> bool {
        let mut map = map.lock();
        match map.get_mut(&start_slot) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl BlocksByRangeFetcher<SignedBeaconBlockHeader> for TestFetcher {
    async fn blocks_by_range(
        &self,
        _peer_id: &PeerId,
        request: BlocksByRangeRequest,
    ) -> Result<Vec<SignedBeaconBlockHeader>, FetchError> {
        let start = request.start_slot.as_u64();

        let bump = {
            let mut bump = self.clock_bump.lock();
            match bump.take() {
                Some((slot, clock, to)) if slot == start => Some((clock, to)),
                other => {
                    *bump = other;
                    None
                }
            }
        };
        if let Some((clock, to_slot)) = bump {
            clock.set_slot(to_slot);
        }

        if Self::take_scripted(&self.failures, start) {
            return Err(FetchError("scripted failure".into()));
        }

        if let Some(blocks) = self.overrides.lock().remove(&start) {
            return Ok(blocks);
        }

        let end = Slot::new(start + request.count);
        let mut blocks: Vec<_> = self
            .blocks
            .iter()
            .filter(|block| block.message.slot >= request.start_slot && block.message.slot < end)
            .cloned()
            .collect();

        if Self::take_scripted(&self.corruptions, start) {
            if blocks.len() > 1 {
                blocks[1].message.parent_root = Hash256::repeat_byte(0xba);
            }
        }

        Ok(blocks)
    }
}

/// An in-memory [`BlockStore`] recording imports in call order.
#[derive(Default)]
pub struct MemoryStore {
    blocks: Mutex<Vec<SignedBeaconBlockHeader>>,
    status: Mutex<Option<BackfillStatus>>,
    /// `(lowest, highest)` block slots of each import call, oldest call first.
    spans: Mutex<Vec<(Slot, Slot)>>,
    fail_imports: Mutex<usize>,
}

impl MemoryStore {
    /// Fail the next `times` import calls.
    pub fn fail_next_import(&self, times: usize) {
        *self.fail_imports.lock() = times;
    }

    /// All imported blocks, in import order.
    pub fn blocks(&self) -> Vec<SignedBeaconBlockHeader> {
        self.blocks.lock().clone()
    }

    /// The `(lowest, highest)` slot of each import call, oldest call first.
    pub fn spans(&self) -> Vec<(Slot, Slot)> {
        self.spans.lock().clone()
    }

    /// Seeds the persisted status, as checkpoint initialisation would.
    pub fn init_status(&self, status: BackfillStatus) {
        *self.status.lock() = Some(status);
    }
}

impl BlockStore<SignedBeaconBlockHeader> for MemoryStore {
    fn import(
        &self,
        blocks: &[SignedBeaconBlockHeader],
        status: &BackfillStatus,
    ) -> Result<(), StoreError> {
        {
            let mut fail = self.fail_imports.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(StoreError::Database("scripted import failure".into()));
            }
        }
        if let (Some(first), Some(last)) = (blocks.first(), blocks.last()) {
            self.spans
                .lock()
                .push((first.message.slot, last.message.slot));
        }
        self.blocks.lock().extend_from_slice(blocks);
        *self.status.lock() = Some(*status);
        Ok(())
    }

    fn load_status(&self) -> Result<Option<BackfillStatus>, StoreError> {
        Ok(*self.status.lock())
    }

    fn parent_root_of_lowest_imported(&self) -> Result<Option<Hash256>, StoreError> {
        Ok(self
            .blocks
            .lock()
            .iter()
            .min_by_key(|block| block.message.slot)
            .map(|block| block.message.parent_root))
    }
}

/// Wires the doubles into a [`BackfillTypes`] implementation.
pub struct TestBackfillTypes;

impl BackfillTypes for TestBackfillTypes {
    type Block = SignedBeaconBlockHeader;
    type Store = MemoryStore;
    type SlotClock = SharedManualClock;
    type Assigner = StaticAssigner;
    type Fetcher = TestFetcher;
    type SignatureVerifier = RootSignatureVerifier;
}
