//! `DiscreteFunction`: a named DOF vector living in a shared container slot.

use crate::data::mapper::{EntityDofMapper, MapperId};
use crate::data::registry::{ContainerHandle, ContainerRegistry};
use crate::data::storage::SlotId;
use crate::dof_error::DofError;

/// A logical function: one slot of the container for its (mesh, mapper) pair.
///
/// The values are owned by the registry; every accessor takes the registry
/// the function was attached to. A function must be [`release`]d to give
/// its slot and attachment back.
///
/// [`release`]: DiscreteFunction::release
#[derive(Debug, PartialEq, Eq)]
pub struct DiscreteFunction {
    name: String,
    handle: ContainerHandle,
    slot: SlotId,
}

impl DiscreteFunction {
    /// Attach to the container of `mapper` and allocate a slot that follows
    /// compaction.
    pub fn attach<V: Clone + Default>(
        name: impl Into<String>,
        registry: &mut ContainerRegistry<V>,
        mapper: &EntityDofMapper,
    ) -> Result<Self, DofError> {
        Self::attach_with(name, registry, mapper, true)
    }

    /// Like [`attach`](Self::attach), choosing whether the slot is rearranged
    /// on adaptation or only resized.
    pub fn attach_with<V: Clone + Default>(
        name: impl Into<String>,
        registry: &mut ContainerRegistry<V>,
        mapper: &EntityDofMapper,
        enable_compression: bool,
    ) -> Result<Self, DofError> {
        let name = name.into();
        let handle = registry.attach(mapper.mesh_id(), mapper);
        let slot = registry.container_mut(&handle)?.alloc_slot(enable_compression);
        log::debug!("function `{name}` attached as {handle}, slot {slot}");
        Ok(Self { name, handle, slot })
    }

    /// Name used when persisting.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry attachment.
    #[inline]
    pub fn handle(&self) -> ContainerHandle {
        self.handle
    }

    /// Slot holding the values.
    #[inline]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Mapper indexing this function's values.
    #[inline]
    pub fn mapper_id(&self) -> MapperId {
        self.handle.key().mapper
    }

    /// The DOF values.
    pub fn dofs<'r, V: Clone + Default>(
        &self,
        registry: &'r ContainerRegistry<V>,
    ) -> Result<&'r [V], DofError> {
        registry.container(&self.handle)?.slot_slice(self.slot)
    }

    /// The DOF values, mutably.
    pub fn dofs_mut<'r, V: Clone + Default>(
        &self,
        registry: &'r mut ContainerRegistry<V>,
    ) -> Result<&'r mut [V], DofError> {
        registry.container_mut(&self.handle)?.slot_slice_mut(self.slot)
    }

    /// Free the slot and drop the attachment.
    pub fn release<V: Clone + Default>(
        self,
        registry: &mut ContainerRegistry<V>,
    ) -> Result<(), DofError> {
        registry.container_mut(&self.handle)?.free_slot(self.slot)?;
        registry.detach(self.handle)?;
        log::debug!("function `{}` released", self.name);
        Ok(())
    }
}
