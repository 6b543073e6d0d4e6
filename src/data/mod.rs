//! Data module: DOF layout, mapping and storage
#![warn(missing_docs)]

pub mod block_layout;
pub mod function;
pub mod mapper;
pub mod registry;
pub mod space;
pub mod storage;

pub use block_layout::{BlockLayout, DofLayout, LocalBlock};
pub use function::DiscreteFunction;
pub use mapper::{DofMove, DofRemap, EntityDofMapper, GlobalDofIndex, MapperId};
pub use registry::{ContainerHandle, ContainerKey, ContainerRegistry};
pub use space::DiscreteSpace;
pub use storage::{ContainerId, SlotId, SlotStorageContainer, Storage, VecStorage};

