//! Mesh-side collaborators of the DOF layer: reference geometries,
//! partition classification, the index-source interfaces, an adaptive index
//! set and the interval mesh built on it.

pub mod adaptive;
pub mod geometry;
pub mod index_source;
pub mod interval;
pub mod partition;

pub use adaptive::{AdaptPhase, AdaptiveIndexSet, CompactionPolicy};
pub use geometry::GeometryType;
pub use index_source::{EntityIndexSource, MeshEntity, MeshId, PartitionedGridView};
pub use interval::{IntervalEntity, IntervalMesh};
pub use partition::PartitionType;
