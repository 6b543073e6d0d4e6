//! Slot-based storage for per-DOF data that follows mesh adaptation.
//!
//! A [`SlotStorageContainer`] holds any number of equally sized regions
//! ("slots"), one value per scalar DOF of a mapper, in a single contiguous
//! buffer. When the mapper is updated, the container replays the resulting
//! [`DofRemap`] on every slot that opted into compression; the others are
//! only resized with their prefix preserved.
//!
//! Buffers go through the [`Storage`] trait so the backing memory can be
//! swapped without touching the container logic.

use core::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::data::mapper::{DofRemap, EntityDofMapper, MapperId};
use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofError;

/// Contiguous, indexable storage for `V` with slice access.
pub trait Storage<V>: Debug {
    /// Construct a buffer of `len`, filled with `fill`.
    fn with_len(len: usize, fill: V) -> Self
    where
        V: Clone;

    /// Current length in elements.
    fn len(&self) -> usize;

    /// Whether the buffer holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize to `new_len`, filling new cells with `fill`.
    fn resize(&mut self, new_len: usize, fill: V)
    where
        V: Clone;

    /// Entire read-only buffer.
    fn as_slice(&self) -> &[V];

    /// Entire mutable buffer.
    fn as_mut_slice(&mut self) -> &mut [V];
}

/// `Vec`-backed storage (default).
#[derive(Clone)]
pub struct VecStorage<V>(pub(crate) Vec<V>);

impl<V> Debug for VecStorage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecStorage")
            .field("len", &self.0.len())
            .finish()
    }
}

impl<V> Storage<V> for VecStorage<V> {
    fn with_len(len: usize, fill: V) -> Self
    where
        V: Clone,
    {
        Self(vec![fill; len])
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn resize(&mut self, new_len: usize, fill: V)
    where
        V: Clone,
    {
        self.0.resize(new_len, fill);
    }

    fn as_slice(&self) -> &[V] {
        &self.0
    }

    fn as_mut_slice(&mut self) -> &mut [V] {
        &mut self.0
    }
}

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one container instance.
///
/// A container recreated under the same registry key gets a fresh id, so
/// slots and handles of the old instance are detected as stale.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl ContainerId {
    pub(crate) fn fresh() -> Self {
        ContainerId(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

/// Generation-checked reference to one slot of a container.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotId {
    container: ContainerId,
    index: usize,
    generation: u32,
}

impl SlotId {
    /// Container the slot belongs to.
    #[inline]
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// Position of the slot's region in the container buffer.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.container, self.index, self.generation)
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct SlotEntry {
    generation: u32,
    live: bool,
    compress: bool,
}

/// Equally sized DOF regions in one buffer, kept in step with a mapper.
pub struct SlotStorageContainer<V, S: Storage<V> = VecStorage<V>> {
    id: ContainerId,
    mapper: MapperId,
    sequence: u64,
    region_len: usize,
    slots: Vec<SlotEntry>,
    free: Vec<usize>,
    data: S,
    _marker: PhantomData<V>,
}

impl<V, S: Storage<V>> Debug for SlotStorageContainer<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotStorageContainer")
            .field("id", &self.id)
            .field("mapper", &self.mapper)
            .field("sequence", &self.sequence)
            .field("region_len", &self.region_len)
            .field("live_slots", &self.slots.iter().filter(|s| s.live).count())
            .finish()
    }
}

impl<V: Clone + Default, S: Storage<V>> SlotStorageContainer<V, S> {
    /// Empty container sized for `mapper`'s current DOF count.
    pub fn new(mapper: &EntityDofMapper) -> Self {
        Self {
            id: ContainerId::fresh(),
            mapper: mapper.id(),
            sequence: mapper.sequence(),
            region_len: mapper.size(),
            slots: Vec::new(),
            free: Vec::new(),
            data: S::with_len(0, V::default()),
            _marker: PhantomData,
        }
    }

    /// Identity of this container.
    #[inline]
    pub fn id(&self) -> ContainerId {
        self.id
    }

    /// Mapper whose DOFs index every region.
    #[inline]
    pub fn mapper_id(&self) -> MapperId {
        self.mapper
    }

    /// Mapper generation the regions are laid out for.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Values per slot.
    #[inline]
    pub fn region_len(&self) -> usize {
        self.region_len
    }

    /// Number of allocated slots.
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    /// Reserve a region of `region_len` default values.
    ///
    /// Slots with `enable_compression == false` are not rearranged by
    /// [`apply_remap`](Self::apply_remap), only resized.
    pub fn alloc_slot(&mut self, enable_compression: bool) -> SlotId {
        let index = match self.free.pop() {
            Some(index) => {
                let start = index * self.region_len;
                self.data.as_mut_slice()[start..start + self.region_len].fill(V::default());
                index
            }
            None => {
                self.slots.push(SlotEntry::default());
                self.data
                    .resize(self.slots.len() * self.region_len, V::default());
                self.slots.len() - 1
            }
        };
        let entry = &mut self.slots[index];
        entry.live = true;
        entry.compress = enable_compression;
        let id = SlotId {
            container: self.id,
            index,
            generation: entry.generation,
        };
        log::trace!("allocated slot {id} ({} dofs)", self.region_len);
        id
    }

    fn check(&self, slot: SlotId) -> Result<usize, DofError> {
        match self.slots.get(slot.index) {
            Some(e) if slot.container == self.id && e.live && e.generation == slot.generation => {
                Ok(slot.index)
            }
            _ => Err(DofError::UnknownSlot(slot.to_string())),
        }
    }

    /// Release `slot`; its region is reused by a later allocation.
    pub fn free_slot(&mut self, slot: SlotId) -> Result<(), DofError> {
        let index = self.check(slot)?;
        let entry = &mut self.slots[index];
        entry.live = false;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index);
        log::trace!("freed slot {slot}");
        Ok(())
    }

    /// Whether `slot` follows compaction moves.
    pub fn is_compression_enabled(&self, slot: SlotId) -> Result<bool, DofError> {
        let index = self.check(slot)?;
        Ok(self.slots[index].compress)
    }

    /// The region of `slot`.
    pub fn slot_slice(&self, slot: SlotId) -> Result<&[V], DofError> {
        let start = self.check(slot)? * self.region_len;
        Ok(&self.data.as_slice()[start..start + self.region_len])
    }

    /// The region of `slot`, mutably.
    pub fn slot_slice_mut(&mut self, slot: SlotId) -> Result<&mut [V], DofError> {
        let start = self.check(slot)? * self.region_len;
        let len = self.region_len;
        Ok(&mut self.data.as_mut_slice()[start..start + len])
    }

    /// Value of DOF `dof` in `slot`.
    ///
    /// # Panics
    /// Panics if `dof >= region_len()`.
    pub fn dof(&self, slot: SlotId, dof: usize) -> Result<&V, DofError> {
        debug_assert!(dof < self.region_len, "dof {dof} out of range ({})", self.region_len);
        Ok(&self.slot_slice(slot)?[dof])
    }

    /// Mutable value of DOF `dof` in `slot`.
    ///
    /// # Panics
    /// Panics if `dof >= region_len()`.
    pub fn dof_mut(&mut self, slot: SlotId, dof: usize) -> Result<&mut V, DofError> {
        debug_assert!(dof < self.region_len, "dof {dof} out of range ({})", self.region_len);
        Ok(&mut self.slot_slice_mut(slot)?[dof])
    }

    /// Change every region to `new_len` values, keeping each slot's prefix.
    pub fn resize(&mut self, new_len: usize) {
        if new_len == self.region_len {
            return;
        }
        let old_len = self.region_len;
        let keep = old_len.min(new_len);
        let mut next = S::with_len(self.slots.len() * new_len, V::default());
        for (index, entry) in self.slots.iter().enumerate() {
            if !entry.live || keep == 0 {
                continue;
            }
            let src = &self.data.as_slice()[index * old_len..index * old_len + keep];
            next.as_mut_slice()[index * new_len..index * new_len + keep].clone_from_slice(src);
        }
        self.data = next;
        self.region_len = new_len;
        log::debug!("{} resized regions {old_len} -> {new_len}", self.id);
    }

    /// Carry every region across a mapper update.
    ///
    /// Slots with compression enabled replay the remap's moves into a fresh
    /// region; the others keep their prefix. All regions end up at the
    /// remap's new size.
    ///
    /// # Errors
    /// - `MapperMismatch` if the remap came from another mapper,
    /// - `RemapOutOfOrder` if the container already reached the remap's
    ///   sequence, e.g. the same remap is applied twice,
    /// - `StaleRemap` if the container is not at the remap's old size.
    pub fn apply_remap(&mut self, remap: &DofRemap) -> Result<(), DofError> {
        if remap.mapper() != self.mapper {
            return Err(DofError::MapperMismatch {
                expected: self.mapper.to_string(),
                found: remap.mapper().to_string(),
            });
        }
        if remap.sequence() <= self.sequence {
            return Err(DofError::RemapOutOfOrder {
                container: self.sequence,
                remap: remap.sequence(),
            });
        }
        if remap.old_size() != self.region_len {
            return Err(DofError::StaleRemap {
                expected: remap.old_size(),
                found: self.region_len,
            });
        }
        let old_len = self.region_len;
        let new_len = remap.new_size();
        let keep = old_len.min(new_len);
        let mut next = S::with_len(self.slots.len() * new_len, V::default());
        for (index, entry) in self.slots.iter().enumerate() {
            if !entry.live {
                continue;
            }
            let src = &self.data.as_slice()[index * old_len..(index + 1) * old_len];
            let dst = &mut next.as_mut_slice()[index * new_len..(index + 1) * new_len];
            if entry.compress {
                remap.apply(src, dst)?;
            } else {
                dst[..keep].clone_from_slice(&src[..keep]);
            }
        }
        self.data = next;
        self.region_len = new_len;
        self.sequence = remap.sequence();
        log::debug!(
            "{} applied remap to sequence {}: {old_len} -> {new_len} dofs over {} slots",
            self.id,
            self.sequence,
            self.live_slots()
        );
        crate::debug_invariants!(self.validate_invariants(), "SlotStorageContainer::apply_remap");
        Ok(())
    }
}

impl<V, S: Storage<V>> DebugInvariants for SlotStorageContainer<V, S> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "SlotStorageContainer");
    }

    fn validate_invariants(&self) -> Result<(), DofError> {
        let expected = self.slots.len() * self.region_len;
        if self.data.len() != expected {
            return Err(DofError::VectorSizeMismatch {
                expected,
                found: self.data.len(),
            });
        }
        for &index in &self.free {
            if self.slots.get(index).is_none_or(|e| e.live) {
                return Err(DofError::UnknownSlot(format!("{}/{index} on free list", self.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::block_layout::DofLayout;
    use crate::topology::adaptive::CompactionPolicy;
    use crate::topology::geometry::GeometryType;
    use crate::topology::interval::IntervalMesh;

    fn setup(n: usize) -> (IntervalMesh, EntityDofMapper) {
        let mesh = IntervalMesh::new(n, CompactionPolicy::OrderPreserving);
        let layout = DofLayout::lagrange(1, 1, &[GeometryType::Line]).unwrap();
        let mapper = EntityDofMapper::new(&mesh, layout, 1).unwrap();
        (mesh, mapper)
    }

    #[test]
    fn slots_are_isolated() {
        let (_mesh, mapper) = setup(3);
        let mut c: SlotStorageContainer<f64> = SlotStorageContainer::new(&mapper);
        let a = c.alloc_slot(true);
        let b = c.alloc_slot(true);
        *c.dof_mut(a, 2).unwrap() = 4.5;
        assert_eq!(*c.dof(a, 2).unwrap(), 4.5);
        assert_eq!(*c.dof(b, 2).unwrap(), 0.0);
        assert_eq!(c.slot_slice(b).unwrap().len(), 4);
        assert!(c.validate_invariants().is_ok());
    }

    #[test]
    fn freed_slot_is_stale_and_reused() {
        let (_mesh, mapper) = setup(2);
        let mut c: SlotStorageContainer<i32> = SlotStorageContainer::new(&mapper);
        let a = c.alloc_slot(true);
        c.slot_slice_mut(a).unwrap().fill(9);
        c.free_slot(a).unwrap();
        assert!(matches!(c.dof(a, 0), Err(DofError::UnknownSlot(_))));
        assert!(matches!(c.free_slot(a), Err(DofError::UnknownSlot(_))));
        let b = c.alloc_slot(false);
        assert_eq!(b.index(), a.index());
        assert_eq!(c.slot_slice(b).unwrap(), &[0, 0, 0]);
        assert_eq!(c.is_compression_enabled(b), Ok(false));
    }

    #[test]
    fn slot_of_other_container_is_rejected() {
        let (_mesh, mapper) = setup(2);
        let mut c1: SlotStorageContainer<i32> = SlotStorageContainer::new(&mapper);
        let c2: SlotStorageContainer<i32> = SlotStorageContainer::new(&mapper);
        let a = c1.alloc_slot(true);
        assert!(c2.slot_slice(a).is_err());
    }

    #[test]
    fn resize_keeps_prefix() {
        let (_mesh, mapper) = setup(3);
        let mut c: SlotStorageContainer<i32> = SlotStorageContainer::new(&mapper);
        let a = c.alloc_slot(true);
        c.slot_slice_mut(a).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        c.resize(2);
        assert_eq!(c.slot_slice(a).unwrap(), &[1, 2]);
        c.resize(5);
        assert_eq!(c.slot_slice(a).unwrap(), &[1, 2, 0, 0, 0]);
    }

    #[test]
    fn remap_moves_compressing_slots_only() {
        let (mut mesh, mut mapper) = setup(4);
        let mut c: SlotStorageContainer<i32> = SlotStorageContainer::new(&mapper);
        let moving = c.alloc_slot(true);
        let fixed = c.alloc_slot(false);
        c.slot_slice_mut(moving).unwrap().copy_from_slice(&[0, 1, 2, 3, 4]);
        c.slot_slice_mut(fixed).unwrap().copy_from_slice(&[0, 1, 2, 3, 4]);
        mesh.coarsen(1, 2).unwrap();
        mesh.compress().unwrap();
        let remap = mapper.update(&mesh).unwrap();
        c.apply_remap(&remap).unwrap();
        assert_eq!(c.slot_slice(moving).unwrap(), &[0, 1, 3, 4]);
        assert_eq!(c.slot_slice(fixed).unwrap(), &[0, 1, 2, 3]);
        assert_eq!(c.sequence(), mapper.sequence());
        assert!(matches!(
            c.apply_remap(&remap),
            Err(DofError::RemapOutOfOrder { container: 2, remap: 2 })
        ));
        assert_eq!(c.slot_slice(moving).unwrap(), &[0, 1, 3, 4]);
    }

    #[test]
    fn skipped_remap_is_stale() {
        let (mut mesh, mut mapper) = setup(4);
        let mut c: SlotStorageContainer<i32> = SlotStorageContainer::new(&mapper);
        c.alloc_slot(true);
        mesh.refine(0).unwrap();
        mesh.compress().unwrap();
        mapper.update(&mesh).unwrap();
        mesh.finish_compaction();
        mesh.refine(3).unwrap();
        mesh.compress().unwrap();
        let second = mapper.update(&mesh).unwrap();
        mesh.finish_compaction();
        assert_eq!(
            c.apply_remap(&second),
            Err(DofError::StaleRemap { expected: 6, found: 5 })
        );
        assert_eq!(c.sequence(), 1);
    }
}
