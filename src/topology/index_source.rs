//! Interfaces the DOF layer consumes from the mesh.
//!
//! [`EntityIndexSource`] is the per-codimension dense index oracle. It is
//! owned by the mesh and outlives every mapper and container built on it.
//! [`PartitionedGridView`] adds entity iteration and partition metadata for
//! ownership decisions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::topology::geometry::GeometryType;
use crate::topology::partition::PartitionType;

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a mesh (or grid part); one half of a container registry key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeshId(u64);

impl MeshId {
    /// Allocate an identity not used by any other mesh in this process.
    pub fn fresh() -> Self {
        MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MeshId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

/// A mesh entity as seen by the DOF layer.
pub trait MeshEntity {
    /// Codimension of the entity in its mesh (0 = element).
    fn codim(&self) -> usize;
    /// Reference geometry of the entity.
    fn geometry_type(&self) -> GeometryType;
}

/// Dense, per-codimension index oracle with compaction bookkeeping.
///
/// Between a compression and the end of the adaptation cycle the source
/// reports `(old, new)` index pairs ("holes") for every relocated entity.
pub trait EntityIndexSource {
    /// Entity handle type.
    type Entity: MeshEntity;

    /// Identity of the mesh this index source belongs to.
    fn mesh_id(&self) -> MeshId;

    /// Dimension of the mesh; valid codimensions are `0..=dimension`.
    fn dimension(&self) -> usize;

    /// Number of indices in use for `codim`.
    fn size(&self, codim: usize) -> usize;

    /// Index of sub-entity `local` of codimension `codim` of `entity`.
    ///
    /// `codim` is absolute (mesh codimension) and must be at least
    /// `entity.codim()`.
    fn sub_index(&self, entity: &Self::Entity, local: usize, codim: usize) -> usize;

    /// Index of `entity` itself.
    fn index(&self, entity: &Self::Entity) -> usize {
        self.sub_index(entity, 0, entity.codim())
    }

    /// Number of relocated indices reported by the last compression.
    fn number_of_holes(&self, codim: usize) -> usize;

    /// Index before compression of hole `hole`.
    fn old_index(&self, hole: usize, codim: usize) -> usize;

    /// Index after compression of hole `hole`.
    fn new_index(&self, hole: usize, codim: usize) -> usize;

    /// Whether deleted entities left holes that have not been compressed yet.
    fn needs_compress(&self) -> bool;

    /// Monotonic adaptation generation.
    fn sequence(&self) -> u64;
}

/// An index source that can enumerate its entities and classify them by
/// partition.
pub trait PartitionedGridView: EntityIndexSource {
    /// All entities of codimension `codim`, in index order.
    fn entities(&self, codim: usize) -> impl Iterator<Item = Self::Entity> + '_;

    /// Partition classification of `entity` on this process.
    fn partition_type(&self, entity: &Self::Entity) -> PartitionType;
}
