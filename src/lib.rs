#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-dofs
//!
//! mesh-dofs assigns dense per-process indices to the degrees of freedom of
//! finite-element spaces on adaptive, partitioned meshes, keeps DOF data in
//! step with mesh adaptation, and decides which process owns each shared DOF
//! so global reductions count it once.
//!
//! ## Features
//! - `EntityDofMapper`: (entity, local ordinal) → global scalar index, with
//!   per-codimension block offsets and compaction remaps
//! - `SlotStorageContainer` and a reference-counted `ContainerRegistry`
//!   shared by all functions of a (mesh, mapper) pair
//! - `SlaveDofRegistry`: local (discontinuous) or voted (continuous) ownership
//! - `ParallelReduction`: dot products and norms over owned DOFs only
//! - Pluggable transports: serial, threads-only, and MPI (`mpi-support`)
//!
//! ## Adaptation cycle
//!
//! ```text
//!   mesh.refine/coarsen → mesh.compress → space.update(mesh, registry)
//!     → mesh.finish_compaction → slave list rebuilt on next use
//! ```
//!
//! The mapper must be updated while the index source still reports its
//! holes, i.e. between `compress` and `finish_compaction`.

pub mod algs;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod dof_error;
pub mod io;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use dof_error::{DofError, ErrorKind};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiChannel;
    pub use crate::algs::communicator::{
        Collective, CommDataHandle, CommunicationChannel, Interface, SerialChannel, ThreadChannel,
        ThreadWorld,
    };
    pub use crate::algs::reduction::ParallelReduction;
    pub use crate::algs::slave_dofs::SlaveDofRegistry;
    pub use crate::config::{Continuity, SpaceConfig};
    pub use crate::data::block_layout::DofLayout;
    pub use crate::data::function::DiscreteFunction;
    pub use crate::data::mapper::{DofRemap, EntityDofMapper, GlobalDofIndex};
    pub use crate::data::registry::ContainerRegistry;
    pub use crate::data::space::DiscreteSpace;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::dof_error::DofError;
    pub use crate::topology::{
        CompactionPolicy, EntityIndexSource, GeometryType, IntervalEntity, IntervalMesh,
        MeshEntity, PartitionType, PartitionedGridView,
    };
}
