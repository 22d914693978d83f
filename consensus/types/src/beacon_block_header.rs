use crate::{Hash256, SignedRoot, Slot};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// A header of a `BeaconBlock`.
///
/// The tree-hash root of a header equals the root of the full block it
/// summarises, so headers are sufficient for chaining blocks by parent root.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body_root: Hash256,
}

impl SignedRoot for BeaconBlockHeader {}

impl BeaconBlockHeader {
    /// Returns the `tree_hash_root` of the header.
    pub fn canonical_root(&self) -> Hash256 {
        self.tree_hash_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: Slot::new(42),
            proposer_index: 7,
            parent_root: Hash256::repeat_byte(1),
            state_root: Hash256::repeat_byte(2),
            body_root: Hash256::repeat_byte(3),
        }
    }

    #[test]
    fn canonical_root_commits_to_all_fields() {
        let base = header().canonical_root();

        let mut other = header();
        other.slot = Slot::new(43);
        assert_ne!(other.canonical_root(), base);

        let mut other = header();
        other.parent_root = Hash256::repeat_byte(9);
        assert_ne!(other.canonical_root(), base);
    }

    #[test]
    fn signing_root_depends_on_domain() {
        let h = header();
        let d1 = Hash256::repeat_byte(4);
        let d2 = Hash256::repeat_byte(5);
        assert_ne!(h.signing_root(d1), h.signing_root(d2));
        assert_ne!(h.signing_root(d1), h.canonical_root());
    }
}
