//! `DiscreteSpace`: a mapper, its slave registry and configuration, bundled.

use crate::algs::communicator::CommunicationChannel;
use crate::algs::reduction::ParallelReduction;
use crate::algs::slave_dofs::SlaveDofRegistry;
use crate::config::SpaceConfig;
use crate::data::block_layout::DofLayout;
use crate::data::function::DiscreteFunction;
use crate::data::mapper::{DofRemap, EntityDofMapper};
use crate::data::registry::ContainerRegistry;
use crate::dof_error::DofError;
use crate::topology::index_source::{EntityIndexSource, PartitionedGridView};

/// A discrete function space over one mesh.
#[derive(Clone, Debug)]
pub struct DiscreteSpace {
    config: SpaceConfig,
    mapper: EntityDofMapper,
    slaves: SlaveDofRegistry,
}

impl DiscreteSpace {
    /// Build the space's mapper for `source`.
    pub fn new<S>(source: &S, layout: DofLayout, config: SpaceConfig) -> Result<Self, DofError>
    where
        S: EntityIndexSource + ?Sized,
    {
        config.validate()?;
        let mapper = EntityDofMapper::new(source, layout, config.block_size)?;
        log::debug!("space `{}` uses {}", config.name, mapper.id());
        Ok(Self {
            config,
            mapper,
            slaves: SlaveDofRegistry::new(),
        })
    }

    /// Space configuration.
    #[inline]
    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    /// The space's DOF mapper.
    #[inline]
    pub fn mapper(&self) -> &EntityDofMapper {
        &self.mapper
    }

    /// Scalar DOF count.
    #[inline]
    pub fn size(&self) -> usize {
        self.mapper.size()
    }

    /// New function of this space with zeroed values.
    pub fn function(
        &self,
        name: impl Into<String>,
        registry: &mut ContainerRegistry,
    ) -> Result<DiscreteFunction, DofError> {
        DiscreteFunction::attach(name, registry, &self.mapper)
    }

    /// Follow one adaptation cycle of `source`: update the mapper and carry
    /// every function of this space across the compaction.
    ///
    /// Call after the source compressed and before it finishes compaction.
    /// The slave list is rebuilt on next use.
    pub fn update<S, V>(
        &mut self,
        source: &S,
        registry: &mut ContainerRegistry<V>,
    ) -> Result<DofRemap, DofError>
    where
        S: EntityIndexSource + ?Sized,
        V: Clone + Default,
    {
        let remap = self.mapper.update(source)?;
        let containers = registry.apply_remap(self.mapper.id(), &remap)?;
        log::debug!(
            "space `{}` updated to sequence {} ({containers} containers)",
            self.config.name,
            remap.sequence()
        );
        Ok(remap)
    }

    /// The slave list for the current generation, rebuilt if stale.
    /// Collective for continuous spaces.
    pub fn slave_dofs<G, C>(&mut self, grid: &G, channel: &C) -> Result<&SlaveDofRegistry, DofError>
    where
        G: PartitionedGridView,
        C: CommunicationChannel<G::Entity>,
    {
        self.slaves
            .rebuild(grid, &self.mapper, self.config.continuity, channel)?;
        Ok(&self.slaves)
    }

    fn check_function(&self, f: &DiscreteFunction) -> Result<(), DofError> {
        if f.mapper_id() != self.mapper.id() {
            return Err(DofError::MapperMismatch {
                expected: self.mapper.id().to_string(),
                found: f.mapper_id().to_string(),
            });
        }
        Ok(())
    }

    /// Global `x · y` of two functions of this space. Blocking collective.
    pub fn dot<G, C>(
        &mut self,
        grid: &G,
        channel: &C,
        registry: &ContainerRegistry,
        x: &DiscreteFunction,
        y: &DiscreteFunction,
    ) -> Result<f64, DofError>
    where
        G: PartitionedGridView,
        C: CommunicationChannel<G::Entity>,
    {
        self.check_function(x)?;
        self.check_function(y)?;
        let slaves = self.slave_dofs(grid, channel)?;
        ParallelReduction::new(slaves, channel).dot(x.dofs(registry)?, y.dofs(registry)?)
    }

    /// Global Euclidean norm of a function of this space. Blocking collective.
    pub fn norm<G, C>(
        &mut self,
        grid: &G,
        channel: &C,
        registry: &ContainerRegistry,
        x: &DiscreteFunction,
    ) -> Result<f64, DofError>
    where
        G: PartitionedGridView,
        C: CommunicationChannel<G::Entity>,
    {
        self.check_function(x)?;
        let slaves = self.slave_dofs(grid, channel)?;
        ParallelReduction::new(slaves, channel).norm(x.dofs(registry)?)
    }
}
