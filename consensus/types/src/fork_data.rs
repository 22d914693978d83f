use crate::Hash256;
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

/// Fork metadata hashed into signature domains to prevent replay across
/// forks and chains.
#[derive(Debug, Clone, PartialEq, Default, Encode, Decode, TreeHash)]
pub struct ForkData {
    pub current_version: [u8; 4],
    pub genesis_validators_root: Hash256,
}
