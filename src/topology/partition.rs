//! Partition classification of mesh entities on a distributed mesh.

use serde::{Deserialize, Serialize};

/// Where an entity sits relative to this process's partition.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionType {
    /// Owned and not shared with any other process.
    #[default]
    Interior,
    /// On the boundary between this partition and a neighbour; shared.
    Border,
    /// In the overlap region owned by a neighbour.
    Overlap,
    /// On the outer boundary of the overlap region.
    Front,
    /// A copy of a neighbour's entity kept for stencil completeness.
    Ghost,
}

impl PartitionType {
    /// Interior and border entities may claim ownership in the vote.
    #[inline]
    pub fn is_interior_or_border(self) -> bool {
        matches!(self, PartitionType::Interior | PartitionType::Border)
    }
}
