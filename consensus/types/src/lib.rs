//! Types used by the historical block backfill engine.
//!
//! These are the minimal consensus types the engine needs to reason about
//! historical blocks: slots and epochs, block headers and their tree-hash
//! roots, opaque proposer signatures, and the fork-version/domain machinery
//! used when checking those signatures.

mod beacon_block_header;
mod chain_spec;
mod fork_data;
mod fork_schedule;
mod signature_bytes;
mod signed_beacon_block_header;
mod signing_root;
mod slot_epoch;

pub use beacon_block_header::BeaconBlockHeader;
pub use chain_spec::{ChainSpec, Domain};
pub use fork_data::ForkData;
pub use fork_schedule::ForkSchedule;
pub use signature_bytes::{SignatureBytes, SIGNATURE_BYTES_LEN};
pub use signed_beacon_block_header::SignedBeaconBlockHeader;
pub use signing_root::{SignedRoot, SigningRoot};
pub use slot_epoch::{Epoch, Slot};

use ethereum_types::H256;

pub type Hash256 = H256;
