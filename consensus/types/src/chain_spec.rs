use crate::{Epoch, ForkData, ForkSchedule, Hash256, Slot};
use serde::{Deserialize, Serialize};
use tree_hash::TreeHash;

/// Signature domains checked by the backfill verifier.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Domain {
    BeaconProposer,
}

/// The subset of beacon-chain constants the backfill engine depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub genesis_slot: Slot,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    /// The window of epochs, counted back from the current epoch, within
    /// which nodes must be able to serve blocks-by-range requests.
    pub min_epochs_for_block_requests: u64,
    pub domain_beacon_proposer: u32,
}

impl ChainSpec {
    /// Get the domain number, unmodified by the fork.
    pub fn get_domain_constant(&self, domain: Domain) -> u32 {
        match domain {
            Domain::BeaconProposer => self.domain_beacon_proposer,
        }
    }

    /// Get the domain that represents the fork meta and signature domain for
    /// the fork active at `epoch`.
    pub fn get_domain(
        &self,
        epoch: Epoch,
        domain: Domain,
        fork_schedule: &ForkSchedule,
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        let fork_version = fork_schedule.fork_version_at(epoch);
        self.compute_domain(domain, fork_version, genesis_validators_root)
    }

    /// Return the 32-byte fork data root for the `current_version` and
    /// `genesis_validators_root`.
    ///
    /// This is used primarily in signature domains to avoid collisions across
    /// forks/chains.
    pub fn compute_fork_data_root(
        current_version: [u8; 4],
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        ForkData {
            current_version,
            genesis_validators_root,
        }
        .tree_hash_root()
    }

    /// Compute a domain by applying the given `fork_version`.
    pub fn compute_domain(
        &self,
        domain: Domain,
        fork_version: [u8; 4],
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        let domain_constant = self.get_domain_constant(domain);

        let mut bytes = [0; 32];
        bytes[0..4].copy_from_slice(&domain_constant.to_le_bytes());
        bytes[4..].copy_from_slice(
            &Self::compute_fork_data_root(fork_version, genesis_validators_root).as_bytes()[..28],
        );

        Hash256::from(bytes)
    }

    /// Returns a `ChainSpec` compatible with the Ethereum Foundation mainnet
    /// specification.
    pub fn mainnet() -> Self {
        Self {
            genesis_slot: Slot::new(0),
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            min_epochs_for_block_requests: 33_024,
            domain_beacon_proposer: 0,
        }
    }

    /// Returns a `ChainSpec` compatible with the minimal preset, useful for
    /// testing.
    pub fn minimal() -> Self {
        Self {
            slots_per_epoch: 8,
            seconds_per_slot: 6,
            min_epochs_for_block_requests: 272,
            ..Self::mainnet()
        }
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}
