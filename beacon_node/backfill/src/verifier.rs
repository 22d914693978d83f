use crate::block::BackfillBlock;
use std::fmt;
use std::marker::PhantomData;
use types::{ChainSpec, Domain, ForkSchedule, Hash256, Slot};

/// Why a downloaded batch was rejected, identifying the first failing block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    /// A block's slot lies outside the batch's range.
    SlotOutOfRange { slot: Slot, begin: Slot, end: Slot },
    /// Slots are not strictly ascending.
    NonAscendingSlots { slot: Slot, prev: Slot },
    /// A block's parent root does not match the root of the block before it.
    BrokenChain { slot: Slot },
    /// The proposer signature did not verify.
    InvalidSignature { slot: Slot },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VerifyError::SlotOutOfRange { slot, begin, end } => {
                write!(f, "block at slot {slot} outside batch range [{begin}, {end})")
            }
            VerifyError::NonAscendingSlots { slot, prev } => {
                write!(f, "block at slot {slot} does not ascend past {prev}")
            }
            VerifyError::BrokenChain { slot } => {
                write!(f, "block at slot {slot} does not descend from the previous block")
            }
            VerifyError::InvalidSignature { slot } => {
                write!(f, "invalid proposer signature on block at slot {slot}")
            }
        }
    }
}

/// The BLS boundary: checks a proposer signature over a signing root.
///
/// Implementations hold the validator public keys extracted from the origin
/// state; the engine never touches key material itself.
pub trait SignatureVerifier<B: BackfillBlock>: Send + Sync + 'static {
    fn verify_proposer(&self, block: &B, domain: Hash256) -> bool;
}

/// Checks the internal consistency of a downloaded batch: slot bounds,
/// strictly ascending order, parent-root chaining against real tree-hash
/// roots, and proposer signatures under the fork domain of each block's
/// epoch.
///
/// Linkage *across* batches is the importer's concern, not the verifier's.
pub struct BackfillVerifier<B: BackfillBlock, S: SignatureVerifier<B>> {
    fork_schedule: ForkSchedule,
    genesis_validators_root: Hash256,
    spec: ChainSpec,
    signatures: S,
    _phantom: PhantomData<B>,
}

impl<B: BackfillBlock, S: SignatureVerifier<B>> BackfillVerifier<B, S> {
    /// Builds a verifier from data extracted from the origin state.
    pub fn new(
        fork_schedule: ForkSchedule,
        genesis_validators_root: Hash256,
        spec: ChainSpec,
        signatures: S,
    ) -> Self {
        Self {
            fork_schedule,
            genesis_validators_root,
            spec,
            signatures,
            _phantom: PhantomData,
        }
    }

    /// Validates `blocks` as the contents of the batch `[begin, end)`,
    /// returning them unchanged (ascending by slot) on success.
    ///
    /// Responses may be sparse: skipped slots are simply absent, and an empty
    /// response is valid.
    pub fn verify(&self, begin: Slot, end: Slot, blocks: Vec<B>) -> Result<Vec<B>, VerifyError> {
        let mut prev: Option<(Slot, Hash256)> = None;
        for block in &blocks {
            let slot = block.slot();
            if slot < begin || slot >= end {
                return Err(VerifyError::SlotOutOfRange { slot, begin, end });
            }
            if let Some((prev_slot, prev_root)) = prev {
                if slot <= prev_slot {
                    return Err(VerifyError::NonAscendingSlots {
                        slot,
                        prev: prev_slot,
                    });
                }
                if block.parent_root() != prev_root {
                    return Err(VerifyError::BrokenChain { slot });
                }
            }

            let epoch = slot.epoch(self.spec.slots_per_epoch);
            let domain = self.spec.get_domain(
                epoch,
                Domain::BeaconProposer,
                &self.fork_schedule,
                self.genesis_validators_root,
            );
            if !self.signatures.verify_proposer(block, domain) {
                return Err(VerifyError::InvalidSignature { slot });
            }
            prev = Some((slot, block.canonical_root()));
        }
        Ok(blocks)
    }
}
