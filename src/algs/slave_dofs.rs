//! Which DOFs of this process are owned by another process.
//!
//! The [`SlaveDofRegistry`] keeps a sorted list of slave DOF indices,
//! terminated by a sentinel equal to the mapper's total size so that a
//! consumer can sweep `[0, size)` with a single cursor. The list is rebuilt
//! lazily whenever the mapper's generation moves past the cached one.
//!
//! Two ownership rules exist:
//! - discontinuous spaces decide locally: every DOF on an entity that is not
//!   `Interior` is a slave;
//! - continuous spaces vote: every rank offers its rank for each shared
//!   entity it holds as interior or border, and the lowest offered rank owns
//!   the entity. The vote is a pure min-reduction, so arrival order does not
//!   matter.

use itertools::Itertools;

use crate::algs::communicator::{CommDataHandle, CommunicationChannel, MessageBuffer};
use crate::config::Continuity;
use crate::data::mapper::{EntityDofMapper, GlobalDofIndex, MapperId};
use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofError;
use crate::topology::index_source::PartitionedGridView;
use crate::topology::partition::PartitionType;

/// Lifecycle of a [`SlaveDofRegistry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegistryState {
    /// Never built.
    Uninitialized,
    /// A rebuild is in progress (or failed part way).
    Building,
    /// The list matches `cached_sequence`.
    Built,
}

/// Sorted slave DOF list of one discrete space.
#[derive(Clone, Debug)]
pub struct SlaveDofRegistry {
    state: RegistryState,
    mapper: Option<MapperId>,
    cached_sequence: Option<u64>,
    slaves: Vec<GlobalDofIndex>,
}

impl Default for SlaveDofRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SlaveDofRegistry {
    pub fn new() -> Self {
        Self {
            state: RegistryState::Uninitialized,
            mapper: None,
            cached_sequence: None,
            slaves: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> RegistryState {
        self.state
    }

    /// Generation of the last successful build.
    #[inline]
    pub fn cached_sequence(&self) -> Option<u64> {
        self.cached_sequence
    }

    /// Whether the list was built for `mapper` at its current generation.
    pub fn is_current(&self, mapper: &EntityDofMapper) -> bool {
        self.state == RegistryState::Built
            && self.mapper == Some(mapper.id())
            && self.cached_sequence == Some(mapper.sequence())
    }

    /// Recompute the slave list unless it is current for `mapper`.
    ///
    /// Continuous spaces run one blocking collective exchange on `channel`;
    /// every rank of the group must call this in the same phase. Returns
    /// whether a rebuild happened.
    pub fn rebuild<G, C>(
        &mut self,
        grid: &G,
        mapper: &EntityDofMapper,
        continuity: Continuity,
        channel: &C,
    ) -> Result<bool, DofError>
    where
        G: PartitionedGridView,
        C: CommunicationChannel<G::Entity>,
    {
        if self.is_current(mapper) {
            return Ok(false);
        }
        debug_assert!(mapper.is_current(grid), "{} lags its index source", mapper.id());
        self.state = RegistryState::Building;
        self.slaves.clear();
        let mut found = Vec::new();
        match continuity {
            Continuity::Discontinuous => local_slaves(grid, mapper, &mut found),
            Continuity::Continuous => {
                let mut vote = OwnershipVote {
                    grid,
                    mapper,
                    rank: channel.rank(),
                    slaves: &mut found,
                };
                channel.exchange(&mut vote)?;
            }
        }
        found.push(mapper.size());
        self.slaves = found.into_iter().sorted_unstable().dedup().collect();
        self.mapper = Some(mapper.id());
        self.cached_sequence = Some(mapper.sequence());
        self.state = RegistryState::Built;
        log::debug!(
            "rank {}: {} slave dofs of {} at sequence {} ({continuity:?})",
            channel.rank(),
            self.slaves.len() - 1,
            mapper.size(),
            mapper.sequence()
        );
        crate::debug_invariants!(self.validate_invariants(), "SlaveDofRegistry::rebuild");
        Ok(true)
    }

    fn built(&self) -> &[GlobalDofIndex] {
        assert_eq!(
            self.state,
            RegistryState::Built,
            "slave registry read before it was built"
        );
        &self.slaves
    }

    /// Slave indices in ascending order, followed by the sentinel.
    ///
    /// # Panics
    /// Panics unless the registry is `Built`.
    pub fn slaves(&self) -> &[GlobalDofIndex] {
        self.built()
    }

    /// Length of the list, sentinel included.
    ///
    /// # Panics
    /// Panics unless the registry is `Built`.
    pub fn size(&self) -> usize {
        self.built().len()
    }

    /// Number of slave DOFs, sentinel excluded.
    ///
    /// # Panics
    /// Panics unless the registry is `Built`.
    pub fn num_slaves(&self) -> usize {
        self.built().len() - 1
    }

    /// Whether `dof` is owned by another process.
    ///
    /// # Panics
    /// Panics unless the registry is `Built`.
    pub fn is_slave(&self, dof: GlobalDofIndex) -> bool {
        let list = self.built();
        list[..list.len() - 1].binary_search(&dof).is_ok()
    }

    /// Locally owned DOF indices in ascending order.
    ///
    /// # Panics
    /// Panics unless the registry is `Built`.
    pub fn owned(&self) -> impl Iterator<Item = GlobalDofIndex> + '_ {
        let list = self.built();
        let total = list[list.len() - 1];
        let mut cursor = 0;
        (0..total).filter(move |&i| {
            if list[cursor] == i {
                cursor += 1;
                false
            } else {
                true
            }
        })
    }
}

fn local_slaves<G: PartitionedGridView>(
    grid: &G,
    mapper: &EntityDofMapper,
    out: &mut Vec<GlobalDofIndex>,
) {
    for codim in (0..=grid.dimension()).filter(|&c| mapper.max_dofs(c) > 0) {
        for entity in grid.entities(codim) {
            if grid.partition_type(&entity) != PartitionType::Interior {
                out.extend(mapper.entity_dofs(grid, &entity));
            }
        }
    }
}

/// Min-rank ownership vote over shared entities.
struct OwnershipVote<'a, G> {
    grid: &'a G,
    mapper: &'a EntityDofMapper,
    rank: usize,
    slaves: &'a mut Vec<GlobalDofIndex>,
}

impl<G: PartitionedGridView> CommDataHandle<G::Entity> for OwnershipVote<'_, G> {
    fn contains(&self, dim: usize, codim: usize) -> bool {
        codim <= dim && self.mapper.max_dofs(codim) > 0
    }

    fn size(&self, entity: &G::Entity) -> usize {
        usize::from(self.grid.partition_type(entity).is_interior_or_border())
    }

    fn gather(&self, buffer: &mut MessageBuffer, entity: &G::Entity) {
        if self.grid.partition_type(entity).is_interior_or_border() {
            buffer.write_rank(self.rank);
        }
    }

    fn scatter(
        &mut self,
        buffer: &mut MessageBuffer,
        entity: &G::Entity,
        count: usize,
    ) -> Result<(), DofError> {
        let mut owner = if self.grid.partition_type(entity).is_interior_or_border() {
            self.rank
        } else {
            usize::MAX
        };
        for _ in 0..count {
            owner = owner.min(buffer.read_rank()?);
        }
        if owner != self.rank {
            self.slaves.extend(self.mapper.entity_dofs(self.grid, entity));
        }
        Ok(())
    }
}

impl DebugInvariants for SlaveDofRegistry {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "SlaveDofRegistry");
    }

    fn validate_invariants(&self) -> Result<(), DofError> {
        if self.state != RegistryState::Built {
            return Ok(());
        }
        let Some(&sentinel) = self.slaves.last() else {
            return Err(DofError::InvalidLayout("slave list has no sentinel".into()));
        };
        if let Some((a, b)) = self.slaves.iter().tuple_windows().find(|(a, b)| a >= b) {
            return Err(DofError::InvalidLayout(format!(
                "slave list not strictly ascending at {a}, {b}"
            )));
        }
        if self.slaves.len() > 1 && self.slaves[self.slaves.len() - 2] >= sentinel {
            return Err(DofError::InvalidLayout(format!(
                "slave beyond sentinel {sentinel}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::SerialChannel;
    use crate::data::block_layout::DofLayout;
    use crate::topology::adaptive::CompactionPolicy;
    use crate::topology::geometry::GeometryType;
    use crate::topology::interval::IntervalMesh;

    #[test]
    fn serial_continuous_has_only_sentinel() {
        let mesh = IntervalMesh::new(4, CompactionPolicy::default());
        let layout = DofLayout::lagrange(1, 1, &[GeometryType::Line]).unwrap();
        let mapper = EntityDofMapper::new(&mesh, layout, 1).unwrap();
        let mut reg = SlaveDofRegistry::new();
        assert_eq!(reg.state(), RegistryState::Uninitialized);
        assert!(reg.rebuild(&mesh, &mapper, Continuity::Continuous, &SerialChannel).unwrap());
        assert_eq!(reg.slaves(), &[5]);
        assert_eq!(reg.num_slaves(), 0);
        assert_eq!(reg.owned().count(), 5);
        assert!(!reg.rebuild(&mesh, &mapper, Continuity::Continuous, &SerialChannel).unwrap());
    }

    #[test]
    fn ghost_elements_are_slaves_in_dg() {
        let mesh = IntervalMesh::partitioned(6, 0, 2, true, CompactionPolicy::default()).unwrap();
        let layout = DofLayout::discontinuous(1, &[(GeometryType::Line, 2)]).unwrap();
        let mapper = EntityDofMapper::new(&mesh, layout, 1).unwrap();
        let mut reg = SlaveDofRegistry::new();
        reg.rebuild(&mesh, &mapper, Continuity::Discontinuous, &SerialChannel)
            .unwrap();
        // elements 0,1,2 interior; element 3 is the ghost at index 3
        assert_eq!(reg.slaves(), &[6, 7, 8]);
        assert!(reg.is_slave(7));
        assert!(!reg.is_slave(5));
        assert_eq!(reg.owned().collect::<Vec<_>>(), (0..6).collect::<Vec<_>>());
    }

    #[test]
    #[should_panic(expected = "before it was built")]
    fn reading_unbuilt_registry_panics() {
        SlaveDofRegistry::new().is_slave(0);
    }
}
