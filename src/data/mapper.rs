//! `EntityDofMapper`: (entity, local ordinal) → global scalar DOF index.
//!
//! The mapper partitions the block index space by codimension (see
//! [`BlockLayout`]) and resolves an entity's blocks through the index
//! source. With block size `bs`, the scalar index of component `comp` of the
//! `k`-th block on a sub-entity with index `i` in codimension `c` is
//!
//! ```text
//!   bs * (offset[c] + i * max_dofs[c] + k) + comp
//! ```
//!
//! Offsets are recomputed once per adaptation generation by
//! [`EntityDofMapper::update`], which keeps the previous offsets so the
//! relocations reported by the index source can be re-expressed in the old
//! and new global index spaces. The result of an update is a [`DofRemap`]:
//! an ordered list of moves that storage replays to carry values across the
//! compaction.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::data::block_layout::{BlockLayout, DofLayout, LocalBlock};
use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofError;
use crate::topology::index_source::{EntityIndexSource, MeshEntity, MeshId};

/// Dense per-process index of one scalar DOF.
pub type GlobalDofIndex = usize;

static NEXT_MAPPER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a mapper; the other half of a container registry key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapperId(u64);

impl MapperId {
    fn fresh() -> Self {
        MapperId(NEXT_MAPPER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MapperId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mapper#{}", self.0)
    }
}

/// One step of a compaction replay, in scalar DOF indices.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DofMove {
    /// Copy `len` values from old index `from` to new index `to`.
    Copy { from: usize, to: usize, len: usize },
    /// Reset `len` values at new index `to` (entity created this cycle).
    Zero { to: usize, len: usize },
}

/// Moves that carry DOF values from one generation's layout to the next.
///
/// Produced by [`EntityDofMapper::update`]; the "old" side of every move
/// refers to the layout before the update, the "new" side to the layout
/// after it. Moves read only from the old array and write only to the new
/// one, and are replayed in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DofRemap {
    mapper: MapperId,
    sequence: u64,
    old_size: usize,
    new_size: usize,
    moves: Vec<DofMove>,
}

impl DofRemap {
    /// Mapper that produced this remap.
    #[inline]
    pub fn mapper(&self) -> MapperId {
        self.mapper
    }

    /// Generation the remap leads to.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Scalar DOF count before the update.
    #[inline]
    pub fn old_size(&self) -> usize {
        self.old_size
    }

    /// Scalar DOF count after the update.
    #[inline]
    pub fn new_size(&self) -> usize {
        self.new_size
    }

    /// Ordered moves.
    #[inline]
    pub fn moves(&self) -> &[DofMove] {
        &self.moves
    }

    fn push(&mut self, mv: DofMove) {
        log::trace!("{}: remap move {mv:?}", self.mapper);
        if let Some(last) = self.moves.last_mut() {
            match (last, mv) {
                (
                    DofMove::Copy { from, to, len },
                    DofMove::Copy {
                        from: f2,
                        to: t2,
                        len: l2,
                    },
                ) if *from + *len == f2 && *to + *len == t2 => {
                    *len += l2;
                    return;
                }
                (DofMove::Zero { to, len }, DofMove::Zero { to: t2, len: l2 })
                    if *to + *len == t2 =>
                {
                    *len += l2;
                    return;
                }
                _ => {}
            }
        }
        self.moves.push(mv);
    }

    /// Replay the moves from `old` into `new`.
    ///
    /// `new` is expected to hold default values; indices not written by any
    /// move keep them.
    ///
    /// # Errors
    /// Returns `Err(StaleRemap)` if the slice lengths do not match the
    /// remap's old and new sizes.
    pub fn apply<V: Clone + Default>(&self, old: &[V], new: &mut [V]) -> Result<(), DofError> {
        if old.len() != self.old_size {
            return Err(DofError::StaleRemap {
                expected: self.old_size,
                found: old.len(),
            });
        }
        if new.len() != self.new_size {
            return Err(DofError::StaleRemap {
                expected: self.new_size,
                found: new.len(),
            });
        }
        for mv in &self.moves {
            match *mv {
                DofMove::Copy { from, to, len } => {
                    new[to..to + len].clone_from_slice(&old[from..from + len]);
                }
                DofMove::Zero { to, len } => {
                    new[to..to + len].fill(V::default());
                }
            }
        }
        Ok(())
    }
}

/// Maps mesh entities and local DOF ordinals to dense global scalar indices.
#[derive(Clone, Debug)]
pub struct EntityDofMapper {
    id: MapperId,
    mesh: MeshId,
    layout: DofLayout,
    block_size: usize,
    current: BlockLayout,
    previous: BlockLayout,
    sequence: u64,
}

impl EntityDofMapper {
    /// Build a mapper for `source` with `block_size` scalars per DOF block.
    ///
    /// # Errors
    /// - `InvalidBlockSize` if `block_size == 0`,
    /// - `InvalidLayout` if the layout's dimension differs from the mesh's,
    /// - `IndexSetNotCompressed` if the index source still has holes.
    pub fn new<S>(source: &S, layout: DofLayout, block_size: usize) -> Result<Self, DofError>
    where
        S: EntityIndexSource + ?Sized,
    {
        if block_size == 0 {
            return Err(DofError::InvalidBlockSize);
        }
        if layout.dimension() != source.dimension() {
            return Err(DofError::InvalidLayout(format!(
                "layout of dimension {} for a mesh of dimension {}",
                layout.dimension(),
                source.dimension()
            )));
        }
        if source.needs_compress() {
            return Err(DofError::IndexSetNotCompressed);
        }
        let current = BlockLayout::compute(&layout.max_dofs(), &sizes_of(source));
        let mapper = Self {
            id: MapperId::fresh(),
            mesh: source.mesh_id(),
            layout,
            block_size,
            previous: current.clone(),
            current,
            sequence: source.sequence(),
        };
        log::debug!(
            "{} built on {}: {} blocks x {} at sequence {}",
            mapper.id,
            mapper.mesh,
            mapper.num_blocks(),
            block_size,
            mapper.sequence
        );
        Ok(mapper)
    }

    /// Identity of this mapper.
    #[inline]
    pub fn id(&self) -> MapperId {
        self.id
    }

    /// Mesh this mapper was built for.
    #[inline]
    pub fn mesh_id(&self) -> MeshId {
        self.mesh
    }

    /// Scalars per DOF block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Index-source generation the offsets were computed for.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The per-geometry DOF layout.
    #[inline]
    pub fn layout(&self) -> &DofLayout {
        &self.layout
    }

    /// Current block offsets.
    #[inline]
    pub fn block_layout(&self) -> &BlockLayout {
        &self.current
    }

    /// Blocks per entity of `codim`.
    #[inline]
    pub fn max_dofs(&self, codim: usize) -> usize {
        self.current.max_dofs(codim)
    }

    /// Current block offset of `codim`.
    #[inline]
    pub fn offset(&self, codim: usize) -> usize {
        self.current.offset(codim)
    }

    /// Block offset of `codim` before the most recent update.
    #[inline]
    pub fn old_offset(&self, codim: usize) -> usize {
        self.previous.offset(codim)
    }

    /// Total number of DOF blocks.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.current.num_blocks()
    }

    /// Total number of scalar DOFs (`num_blocks * block_size`).
    #[inline]
    pub fn size(&self) -> usize {
        self.current.num_blocks() * self.block_size
    }

    /// Whether the mapper has been updated to `source`'s current generation.
    #[inline]
    pub fn is_current<S: EntityIndexSource + ?Sized>(&self, source: &S) -> bool {
        self.sequence == source.sequence()
    }

    fn for_each_block<E: MeshEntity>(&self, entity: &E, mut f: impl FnMut(LocalBlock)) {
        let c0 = entity.codim();
        let geometry = entity.geometry_type();
        if c0 == 0 {
            for &b in self.layout.local_blocks(geometry).unwrap_or(&[]) {
                f(b);
            }
            return;
        }
        for rel in 0..=geometry.dimension() {
            let codim = c0 + rel;
            let count = self.current.max_dofs(codim);
            if count == 0 {
                continue;
            }
            for sub_entity in 0..geometry.sub_entity_count(rel) {
                f(LocalBlock {
                    codim,
                    sub_entity,
                    count,
                });
            }
        }
    }

    /// Number of scalar DOFs on the closure of `entity`.
    pub fn num_dofs<E: MeshEntity>(&self, entity: &E) -> usize {
        let mut blocks = 0;
        self.for_each_block(entity, |b| blocks += b.count);
        blocks * self.block_size
    }

    #[inline]
    fn scalar(&self, layout: &BlockLayout, codim: usize, index: usize, k: usize, comp: usize) -> usize {
        self.block_size * (layout.offset(codim) + index * layout.max_dofs(codim) + k) + comp
    }

    fn debug_check_source<S: EntityIndexSource + ?Sized>(&self, source: &S) {
        debug_assert_eq!(source.mesh_id(), self.mesh, "{} used with a foreign mesh", self.id);
        debug_assert_eq!(
            source.sequence(),
            self.sequence,
            "{} not updated to the index source's generation",
            self.id
        );
    }

    /// Global scalar index of local DOF `local` of `entity`.
    ///
    /// # Panics
    /// Panics if `local >= num_dofs(entity)`.
    pub fn map_to_global<S>(&self, source: &S, entity: &S::Entity, local: usize) -> GlobalDofIndex
    where
        S: EntityIndexSource + ?Sized,
    {
        self.debug_check_source(source);
        let n = self.num_dofs(entity);
        assert!(local < n, "local dof {local} out of range for an entity with {n} dofs");
        let block = local / self.block_size;
        let comp = local % self.block_size;
        let mut first = 0usize;
        let mut found = None;
        self.for_each_block(entity, |b| {
            if found.is_none() {
                if block < first + b.count {
                    found = Some((b, block - first));
                }
                first += b.count;
            }
        });
        let (b, k) = found.unwrap_or_else(|| unreachable!("block {block} below num_dofs"));
        let index = source.sub_index(entity, b.sub_entity, b.codim);
        self.scalar(&self.current, b.codim, index, k, comp)
    }

    /// Call `f(local, global)` for every DOF of `entity`, in local order.
    pub fn map_each<S, F>(&self, source: &S, entity: &S::Entity, mut f: F)
    where
        S: EntityIndexSource + ?Sized,
        F: FnMut(usize, GlobalDofIndex),
    {
        self.debug_check_source(source);
        let mut local = 0usize;
        self.for_each_block(entity, |b| {
            let index = source.sub_index(entity, b.sub_entity, b.codim);
            for k in 0..b.count {
                for comp in 0..self.block_size {
                    f(local, self.scalar(&self.current, b.codim, index, k, comp));
                    local += 1;
                }
            }
        });
    }

    /// Global indices of all DOFs of `entity`, in local order.
    pub fn global_indices<S>(&self, source: &S, entity: &S::Entity) -> Vec<GlobalDofIndex>
    where
        S: EntityIndexSource + ?Sized,
    {
        let mut out = Vec::with_capacity(self.num_dofs(entity));
        self.map_each(source, entity, |_, g| out.push(g));
        out
    }

    /// The DOFs attached to `entity` itself (not its sub-entities).
    pub fn entity_dofs<S>(&self, source: &S, entity: &S::Entity) -> std::ops::Range<GlobalDofIndex>
    where
        S: EntityIndexSource + ?Sized,
    {
        self.debug_check_source(source);
        let codim = entity.codim();
        let per_entity = self.current.max_dofs(codim) * self.block_size;
        let start = self.scalar(&self.current, codim, source.index(entity), 0, 0);
        start..start + per_entity
    }

    /// Scalar holes of `codim`: each relocated entity contributes
    /// `max_dofs[codim] * block_size` holes; codimensions without DOFs none.
    pub fn number_of_holes<S>(&self, source: &S, codim: usize) -> usize
    where
        S: EntityIndexSource + ?Sized,
    {
        let m = self.current.max_dofs(codim);
        if m == 0 {
            0
        } else {
            source.number_of_holes(codim) * m * self.block_size
        }
    }

    fn split_hole(&self, hole: usize, codim: usize) -> (usize, usize, usize) {
        let per_entity = self.current.max_dofs(codim) * self.block_size;
        let entity_hole = hole / per_entity;
        let rem = hole % per_entity;
        (entity_hole, rem / self.block_size, rem % self.block_size)
    }

    /// Old global index of scalar hole `hole` of `codim`.
    pub fn old_index_of<S>(&self, source: &S, hole: usize, codim: usize) -> GlobalDofIndex
    where
        S: EntityIndexSource + ?Sized,
    {
        let (entity_hole, k, comp) = self.split_hole(hole, codim);
        let old = source.old_index(entity_hole, codim);
        self.scalar(&self.previous, codim, old, k, comp)
    }

    /// New global index of scalar hole `hole` of `codim`.
    pub fn new_index_of<S>(&self, source: &S, hole: usize, codim: usize) -> GlobalDofIndex
    where
        S: EntityIndexSource + ?Sized,
    {
        let (entity_hole, k, comp) = self.split_hole(hole, codim);
        let new = source.new_index(entity_hole, codim);
        self.scalar(&self.current, codim, new, k, comp)
    }

    /// Recompute offsets for `source`'s new generation.
    ///
    /// Must be called exactly once per generation, after the index source
    /// compressed and before it discards its hole information.
    ///
    /// # Errors
    /// - `UpdateOutOfTurn` if the source has not advanced since the last update,
    /// - `IndexSetNotCompressed` if the source still has holes.
    pub fn update<S>(&mut self, source: &S) -> Result<DofRemap, DofError>
    where
        S: EntityIndexSource + ?Sized,
    {
        if source.needs_compress() {
            return Err(DofError::IndexSetNotCompressed);
        }
        let sequence = source.sequence();
        if sequence == self.sequence {
            return Err(DofError::UpdateOutOfTurn { sequence });
        }
        debug_assert_eq!(source.mesh_id(), self.mesh, "{} used with a foreign mesh", self.id);
        let next = BlockLayout::compute(&self.layout.max_dofs(), &sizes_of(source));
        self.previous = std::mem::replace(&mut self.current, next);
        self.sequence = sequence;
        let remap = self.build_remap(source);
        log::debug!(
            "{} updated to sequence {}: {} -> {} dofs, {} moves",
            self.id,
            sequence,
            remap.old_size,
            remap.new_size,
            remap.moves.len()
        );
        crate::debug_invariants!(self.validate_invariants(), "EntityDofMapper::update");
        Ok(remap)
    }

    fn build_remap<S>(&self, source: &S) -> DofRemap
    where
        S: EntityIndexSource + ?Sized,
    {
        let bs = self.block_size;
        let mut remap = DofRemap {
            mapper: self.id,
            sequence: self.sequence,
            old_size: self.previous.num_blocks() * bs,
            new_size: self.size(),
            moves: Vec::new(),
        };
        for codim in 0..self.current.codims() {
            let m = self.current.max_dofs(codim);
            if m == 0 {
                continue;
            }
            // Unrelocated survivors keep their index; only the offset moves.
            let keep = self.previous.size(codim).min(self.current.size(codim));
            if keep > 0 {
                remap.push(DofMove::Copy {
                    from: bs * self.previous.offset(codim),
                    to: bs * self.current.offset(codim),
                    len: bs * keep * m,
                });
            }
            let per_entity = m * bs;
            for hole in 0..self.number_of_holes(source, codim) {
                let to = self.new_index_of(source, hole, codim);
                let old_entity = source.old_index(hole / per_entity, codim);
                if old_entity < self.previous.size(codim) {
                    let from = self.old_index_of(source, hole, codim);
                    remap.push(DofMove::Copy { from, to, len: 1 });
                } else {
                    remap.push(DofMove::Zero { to, len: 1 });
                }
            }
        }
        remap
    }
}

fn sizes_of<S: EntityIndexSource + ?Sized>(source: &S) -> Vec<usize> {
    (0..=source.dimension()).map(|c| source.size(c)).collect()
}

impl DebugInvariants for EntityDofMapper {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "EntityDofMapper");
    }

    fn validate_invariants(&self) -> Result<(), DofError> {
        let layout = &self.current;
        if layout.codims() == 0 || layout.offset(0) != 0 {
            return Err(DofError::InvalidLayout("offset[0] must be 0".into()));
        }
        for c in 0..layout.codims() {
            let expected = layout.offset(c) + layout.size(c) * layout.max_dofs(c);
            if layout.range(c).end != expected {
                return Err(DofError::InvalidLayout(format!(
                    "offset[{}] = {} but offset[{c}] + size * max_dofs = {expected}",
                    c + 1,
                    layout.range(c).end
                )));
            }
        }
        Ok(())
    }
}
