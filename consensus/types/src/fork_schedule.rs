use crate::Epoch;

/// The fork-version schedule extracted from a trusted state, mapping
/// activation epochs to fork versions.
#[derive(Debug, Clone, PartialEq)]
pub struct ForkSchedule {
    /// `(activation_epoch, version)` pairs, sorted ascending by epoch.
    forks: Vec<(Epoch, [u8; 4])>,
}

impl ForkSchedule {
    /// Builds a schedule from `(activation_epoch, version)` pairs.
    ///
    /// The entry with the lowest activation epoch also covers every earlier
    /// epoch, so a genesis entry at epoch zero is conventional but not
    /// required.
    pub fn new(mut forks: Vec<(Epoch, [u8; 4])>) -> Self {
        forks.sort_by_key(|(epoch, _)| *epoch);
        Self { forks }
    }

    /// A schedule with a single version active from genesis.
    pub fn single(version: [u8; 4]) -> Self {
        Self::new(vec![(Epoch::new(0), version)])
    }

    /// Return the fork version active at the given ``epoch``.
    pub fn fork_version_at(&self, epoch: Epoch) -> [u8; 4] {
        let mut version = self.forks.first().map(|(_, v)| *v).unwrap_or([0; 4]);
        for (activation, v) in &self.forks {
            if *activation <= epoch {
                version = *v;
            } else {
                break;
            }
        }
        version
    }
}
