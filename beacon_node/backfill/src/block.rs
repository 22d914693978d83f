use types::{Hash256, SignatureBytes, SignedBeaconBlockHeader, SignedRoot, Slot};

/// The view of a signed block the backfill engine needs.
///
/// The engine never inspects block bodies; it chains roots, checks slots and
/// hands whole blocks to the store. A node embedding the engine implements
/// this for its full block type. [`SignedBeaconBlockHeader`] implements it
/// with real tree-hash semantics and is the type the test suite runs on.
pub trait BackfillBlock: Clone + std::fmt::Debug + PartialEq + Send + Sync + 'static {
    fn slot(&self) -> Slot;

    fn proposer_index(&self) -> u64;

    fn parent_root(&self) -> Hash256;

    /// The tree-hash root of the block, as referenced by its child's
    /// `parent_root`.
    fn canonical_root(&self) -> Hash256;

    /// The root the proposer signed, under the given domain.
    fn signing_root(&self, domain: Hash256) -> Hash256;

    fn signature(&self) -> &SignatureBytes;
}

impl BackfillBlock for SignedBeaconBlockHeader {
    fn slot(&self) -> Slot {
        self.message.slot
    }

    fn proposer_index(&self) -> u64 {
        self.message.proposer_index
    }

    fn parent_root(&self) -> Hash256 {
        self.message.parent_root
    }

    fn canonical_root(&self) -> Hash256 {
        self.message.canonical_root()
    }

    fn signing_root(&self, domain: Hash256) -> Hash256 {
        SignedRoot::signing_root(&self.message, domain)
    }

    fn signature(&self) -> &SignatureBytes {
        &self.signature
    }
}
