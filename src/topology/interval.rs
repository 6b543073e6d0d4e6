//! `IntervalMesh`: an adaptable, optionally partitioned 1-D mesh.
//!
//! Elements (codim 0, `Line`) and vertices (codim 1, `Vertex`) carry
//! persistent ids; their dense indices come from an [`AdaptiveIndexSet`].
//! A partitioned mesh over `n_ranks` gives every rank a contiguous chunk of
//! elements. Chunk-boundary vertices are `Border` on both sides; with a ghost
//! layer each rank additionally holds one `Ghost` element (and its outer
//! vertex) from each neighbour.
//!
//! Ids of the initial line are global: element `i` spans vertices `i` and
//! `i + 1`. Ids created by refinement are local to the rank.
//!
//! Refinement and coarsening keep partition types (children inherit their
//! parent's) but never touch the [`Interface`]: it is fixed when the mesh is
//! built. Adapting an entity that appears in a link leaves that link naming
//! an entity the mesh no longer has, so such meshes must not be exchanged
//! over until they are partitioned again.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;

use crate::algs::communicator::Interface;
use crate::dof_error::DofError;
use crate::topology::adaptive::{AdaptPhase, AdaptiveIndexSet, CompactionPolicy};
use crate::topology::geometry::GeometryType;
use crate::topology::index_source::{EntityIndexSource, MeshEntity, MeshId, PartitionedGridView};
use crate::topology::partition::PartitionType;

const ELEMENT: usize = 0;
const VERTEX: usize = 1;

/// Handle to an element or vertex of an [`IntervalMesh`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalEntity {
    codim: usize,
    id: u64,
}

impl IntervalEntity {
    /// Element with persistent id `id`.
    pub const fn element(id: u64) -> Self {
        Self { codim: ELEMENT, id }
    }

    /// Vertex with persistent id `id`.
    pub const fn vertex(id: u64) -> Self {
        Self { codim: VERTEX, id }
    }

    /// Persistent id.
    #[inline]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl MeshEntity for IntervalEntity {
    fn codim(&self) -> usize {
        self.codim
    }

    fn geometry_type(&self) -> GeometryType {
        if self.codim == ELEMENT {
            GeometryType::Line
        } else {
            GeometryType::Vertex
        }
    }
}

/// Element range `[start, end)` owned by `rank` when `n` elements are split
/// over `n_ranks` contiguous chunks.
fn chunk(n: usize, rank: usize, n_ranks: usize) -> (u64, u64) {
    let base = n / n_ranks;
    let rem = n % n_ranks;
    let start = rank * base + rank.min(rem);
    let len = base + usize::from(rank < rem);
    (start as u64, (start + len) as u64)
}

/// Entities present on `rank`, with their partition types.
fn local_entities(
    n: usize,
    rank: usize,
    n_ranks: usize,
    ghost_layer: bool,
) -> BTreeMap<IntervalEntity, PartitionType> {
    let (start, end) = chunk(n, rank, n_ranks);
    let mut out = BTreeMap::new();
    for e in start..end {
        out.insert(IntervalEntity::element(e), PartitionType::Interior);
    }
    for v in start..=end {
        let shared = (v == start && rank > 0) || (v == end && rank + 1 < n_ranks);
        let pt = if shared {
            PartitionType::Border
        } else {
            PartitionType::Interior
        };
        out.insert(IntervalEntity::vertex(v), pt);
    }
    if ghost_layer {
        if rank > 0 && start > 0 {
            out.insert(IntervalEntity::element(start - 1), PartitionType::Ghost);
            out.insert(IntervalEntity::vertex(start - 1), PartitionType::Ghost);
        }
        if rank + 1 < n_ranks && (end as usize) < n {
            out.insert(IntervalEntity::element(end), PartitionType::Ghost);
            out.insert(IntervalEntity::vertex(end + 1), PartitionType::Ghost);
        }
    }
    out
}

/// Adaptable 1-D mesh implementing [`PartitionedGridView`].
#[derive(Clone, Debug)]
pub struct IntervalMesh {
    id: MeshId,
    rank: usize,
    n_ranks: usize,
    elements: HashMap<u64, [u64; 2]>,
    indices: AdaptiveIndexSet<u64>,
    partition: HashMap<IntervalEntity, PartitionType>,
    interface: Interface<IntervalEntity>,
    next_element: u64,
    next_vertex: u64,
}

impl IntervalMesh {
    /// Serial mesh of `n_elements` elements.
    pub fn new(n_elements: usize, policy: CompactionPolicy) -> Self {
        Self::build(n_elements, 0, 1, false, policy)
    }

    /// The chunk of a line of `n_elements` elements owned by `rank` of `n_ranks`.
    ///
    /// # Errors
    /// Returns `Err(InvalidLayout)` if `rank >= n_ranks` or some rank would
    /// receive no elements.
    pub fn partitioned(
        n_elements: usize,
        rank: usize,
        n_ranks: usize,
        ghost_layer: bool,
        policy: CompactionPolicy,
    ) -> Result<Self, DofError> {
        if rank >= n_ranks || n_elements < n_ranks {
            return Err(DofError::InvalidLayout(format!(
                "cannot place rank {rank} of {n_ranks} on a line of {n_elements} elements"
            )));
        }
        Ok(Self::build(n_elements, rank, n_ranks, ghost_layer, policy))
    }

    fn build(
        n: usize,
        rank: usize,
        n_ranks: usize,
        ghost_layer: bool,
        policy: CompactionPolicy,
    ) -> Self {
        let mine = local_entities(n, rank, n_ranks, ghost_layer);
        let mut indices = AdaptiveIndexSet::new(1, policy);
        let mut elements = HashMap::new();
        let mut partition = HashMap::new();
        // BTreeMap order: all elements by id, then all vertices by id.
        for (&entity, &pt) in &mine {
            if entity.codim == ELEMENT {
                elements.insert(entity.id, [entity.id, entity.id + 1]);
            }
            // Keys are fresh and the set is Stable, so insertion cannot fail.
            let _ = indices.insert(entity.codim, entity.id);
            if pt != PartitionType::Interior {
                partition.insert(entity, pt);
            }
        }
        let _ = indices.compress();
        indices.finish_compaction();

        let mut interface = Interface::new(1);
        for peer in (0..n_ranks).filter(|&p| p != rank) {
            let theirs = local_entities(n, peer, n_ranks, ghost_layer);
            let shared: Vec<IntervalEntity> = mine
                .keys()
                .filter(|e| theirs.contains_key(e))
                .copied()
                .collect();
            if !shared.is_empty() {
                interface.insert_link(peer, shared);
            }
        }

        Self {
            id: MeshId::fresh(),
            rank,
            n_ranks,
            elements,
            indices,
            partition,
            interface,
            next_element: n as u64,
            next_vertex: n as u64 + 1,
        }
    }

    /// Rank this partition belongs to.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks the line is split over.
    #[inline]
    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// Shared entities per neighbouring rank, for building a channel.
    ///
    /// Computed once at construction and not updated by adaptation.
    pub fn interface(&self) -> &Interface<IntervalEntity> {
        &self.interface
    }

    /// Adaptation phase of the underlying index set.
    pub fn phase(&self) -> AdaptPhase {
        self.indices.phase()
    }

    /// Live elements in index order.
    pub fn elements(&self) -> impl Iterator<Item = IntervalEntity> + '_ {
        self.indices.keys(ELEMENT).map(IntervalEntity::element)
    }

    /// Live vertices in index order.
    pub fn vertices(&self) -> impl Iterator<Item = IntervalEntity> + '_ {
        self.indices.keys(VERTEX).map(IntervalEntity::vertex)
    }

    /// The two vertices of element `element`.
    pub fn element_vertices(&self, element: u64) -> Option<[IntervalEntity; 2]> {
        self.elements
            .get(&element)
            .map(|&[a, b]| [IntervalEntity::vertex(a), IntervalEntity::vertex(b)])
    }

    /// Split `element` at a new midpoint vertex. Returns the two children.
    ///
    /// The parent's index becomes a hole until [`compress`](Self::compress).
    pub fn refine(&mut self, element: u64) -> Result<[IntervalEntity; 2], DofError> {
        let &[a, b] = self.elements.get(&element).ok_or(DofError::UnknownEntity {
            codim: ELEMENT,
            key: element.to_string(),
        })?;
        self.indices.remove(ELEMENT, element)?;
        self.elements.remove(&element);
        let parent = self
            .partition
            .remove(&IntervalEntity::element(element))
            .unwrap_or_default();
        let mid = self.next_vertex;
        let (left, right) = (self.next_element, self.next_element + 1);
        self.next_vertex += 1;
        self.next_element += 2;
        self.indices.insert(VERTEX, mid)?;
        self.indices.insert(ELEMENT, left)?;
        self.indices.insert(ELEMENT, right)?;
        self.elements.insert(left, [a, mid]);
        self.elements.insert(right, [mid, b]);
        if parent != PartitionType::Interior {
            for child in [
                IntervalEntity::vertex(mid),
                IntervalEntity::element(left),
                IntervalEntity::element(right),
            ] {
                self.partition.insert(child, parent);
            }
        }
        log::trace!("refined element {element} into {left}, {right} at vertex {mid}");
        Ok([IntervalEntity::element(left), IntervalEntity::element(right)])
    }

    /// Merge two adjacent elements, dropping the vertex between them.
    ///
    /// The merged element keeps the pair's partition type; a pair straddling
    /// a partition boundary is rejected.
    pub fn coarsen(&mut self, left: u64, right: u64) -> Result<IntervalEntity, DofError> {
        let unknown = |id: u64| DofError::UnknownEntity {
            codim: ELEMENT,
            key: id.to_string(),
        };
        let &[a, m] = self.elements.get(&left).ok_or_else(|| unknown(left))?;
        let &[m2, b] = self.elements.get(&right).ok_or_else(|| unknown(right))?;
        if m != m2 {
            return Err(DofError::InvalidLayout(format!(
                "elements {left} and {right} are not adjacent"
            )));
        }
        let (left_e, right_e) = (IntervalEntity::element(left), IntervalEntity::element(right));
        let pt = self.partition_type(&left_e);
        if pt != self.partition_type(&right_e) {
            return Err(DofError::InvalidLayout(format!(
                "elements {left} and {right} lie in different partitions"
            )));
        }
        self.indices.remove(ELEMENT, left)?;
        self.indices.remove(ELEMENT, right)?;
        self.indices.remove(VERTEX, m)?;
        self.elements.remove(&left);
        self.elements.remove(&right);
        self.partition.remove(&IntervalEntity::vertex(m));
        self.partition.remove(&left_e);
        self.partition.remove(&right_e);
        let merged = self.next_element;
        self.next_element += 1;
        self.indices.insert(ELEMENT, merged)?;
        self.elements.insert(merged, [a, b]);
        if pt != PartitionType::Interior {
            self.partition.insert(IntervalEntity::element(merged), pt);
        }
        Ok(IntervalEntity::element(merged))
    }

    /// Close index holes; see [`AdaptiveIndexSet::compress`].
    pub fn compress(&mut self) -> Result<bool, DofError> {
        self.indices.compress()
    }

    /// Discard hole information; see [`AdaptiveIndexSet::finish_compaction`].
    pub fn finish_compaction(&mut self) {
        self.indices.finish_compaction();
    }

    /// Ids of all live entities of `codim`, sorted.
    pub fn ids(&self, codim: usize) -> BTreeSet<u64> {
        self.indices.keys(codim).collect()
    }
}

impl EntityIndexSource for IntervalMesh {
    type Entity = IntervalEntity;

    fn mesh_id(&self) -> MeshId {
        self.id
    }

    fn dimension(&self) -> usize {
        1
    }

    fn size(&self, codim: usize) -> usize {
        self.indices.size(codim)
    }

    fn sub_index(&self, entity: &IntervalEntity, local: usize, codim: usize) -> usize {
        let key = match (entity.codim, codim) {
            (c, d) if c == d => entity.id,
            (ELEMENT, VERTEX) => self
                .elements
                .get(&entity.id)
                .and_then(|vs| vs.get(local))
                .copied()
                .unwrap_or_else(|| panic!("vertex {local} of element {} not in mesh", entity.id)),
            (c, d) => panic!("no codim-{d} sub-entities below a codim-{c} entity"),
        };
        self.indices
            .index(codim, &key)
            .unwrap_or_else(|| panic!("entity {key} of codim {codim} not in mesh"))
    }

    fn number_of_holes(&self, codim: usize) -> usize {
        self.indices.number_of_holes(codim)
    }

    fn old_index(&self, hole: usize, codim: usize) -> usize {
        self.indices.hole(hole, codim).0
    }

    fn new_index(&self, hole: usize, codim: usize) -> usize {
        self.indices.hole(hole, codim).1
    }

    fn needs_compress(&self) -> bool {
        self.indices.needs_compress()
    }

    fn sequence(&self) -> u64 {
        self.indices.sequence()
    }
}

impl PartitionedGridView for IntervalMesh {
    fn entities(&self, codim: usize) -> impl Iterator<Item = IntervalEntity> + '_ {
        self.indices
            .keys(codim)
            .map(move |id| IntervalEntity { codim, id })
    }

    /// Entities without a recorded type, including removed ones, are `Interior`.
    fn partition_type(&self, entity: &IntervalEntity) -> PartitionType {
        self.partition.get(entity).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_the_line() {
        assert_eq!(chunk(10, 0, 2), (0, 5));
        assert_eq!(chunk(10, 1, 2), (5, 10));
        assert_eq!(chunk(10, 2, 3), (7, 10));
        assert_eq!(chunk(10, 0, 3), (0, 4));
    }

    #[test]
    fn two_rank_split_shares_one_vertex() {
        let m0 = IntervalMesh::partitioned(10, 0, 2, false, CompactionPolicy::default()).unwrap();
        let m1 = IntervalMesh::partitioned(10, 1, 2, false, CompactionPolicy::default()).unwrap();
        assert_eq!(m0.size(0), 5);
        assert_eq!(m0.size(1), 6);
        assert_eq!(m0.interface().link(1), &[IntervalEntity::vertex(5)]);
        assert_eq!(m1.interface().link(0), &[IntervalEntity::vertex(5)]);
        assert_eq!(m0.partition_type(&IntervalEntity::vertex(5)), PartitionType::Border);
        assert_eq!(m1.partition_type(&IntervalEntity::vertex(10)), PartitionType::Interior);
        // rank 1 numbers its own vertices from zero
        assert_eq!(m1.index(&IntervalEntity::vertex(5)), 0);
    }

    #[test]
    fn ghost_layer_extends_interface() {
        let m0 = IntervalMesh::partitioned(6, 0, 2, true, CompactionPolicy::default()).unwrap();
        assert_eq!(m0.partition_type(&IntervalEntity::element(3)), PartitionType::Ghost);
        assert_eq!(m0.partition_type(&IntervalEntity::vertex(4)), PartitionType::Ghost);
        let link = m0.interface().link(1);
        assert!(link.contains(&IntervalEntity::element(2)));
        assert!(link.contains(&IntervalEntity::element(3)));
        assert!(link.contains(&IntervalEntity::vertex(3)));
    }

    #[test]
    fn refine_then_compress_is_dense() {
        let mut mesh = IntervalMesh::new(3, CompactionPolicy::OrderPreserving);
        let seq = mesh.sequence();
        let [l, r] = mesh.refine(1).unwrap();
        assert!(mesh.needs_compress());
        assert!(mesh.compress().unwrap());
        assert_eq!(mesh.sequence(), seq + 1);
        assert_eq!(mesh.size(0), 4);
        assert_eq!(mesh.size(1), 5);
        assert_eq!(mesh.sub_index(&l, 1, 1), mesh.sub_index(&r, 0, 1));
        mesh.finish_compaction();
        let merged = mesh.coarsen(l.id(), r.id()).unwrap();
        mesh.compress().unwrap();
        assert_eq!(mesh.size(0), 3);
        assert_eq!(mesh.size(1), 4);
        assert_eq!(mesh.element_vertices(merged.id()).unwrap()[1], IntervalEntity::vertex(2));
    }

    #[test]
    fn refined_ghost_stays_ghost() {
        let mut m0 = IntervalMesh::partitioned(6, 0, 2, true, CompactionPolicy::default()).unwrap();
        let [l, r] = m0.refine(3).unwrap();
        let mid = m0.element_vertices(l.id()).unwrap()[1];
        for e in [l, r, mid] {
            assert_eq!(m0.partition_type(&e), PartitionType::Ghost, "{e:?}");
        }
        assert!(!m0.partition.contains_key(&IntervalEntity::element(3)));
        // interior neighbours stay interior
        let [il, _] = m0.refine(0).unwrap();
        assert_eq!(m0.partition_type(&il), PartitionType::Interior);

        m0.compress().unwrap();
        m0.finish_compaction();
        // the ghost pair and its interior neighbour cannot merge
        let err = m0.coarsen(2, l.id()).unwrap_err();
        assert!(matches!(err, DofError::InvalidLayout(_)));
        let merged = m0.coarsen(l.id(), r.id()).unwrap();
        assert_eq!(m0.partition_type(&merged), PartitionType::Ghost);
        assert!(!m0.partition.contains_key(&mid));
        // the interface still describes the initial partition
        assert!(m0.interface().link(1).contains(&IntervalEntity::element(3)));
    }

    #[test]
    fn rank_outside_group_is_rejected() {
        assert!(IntervalMesh::partitioned(4, 2, 2, false, CompactionPolicy::default()).is_err());
        assert!(IntervalMesh::partitioned(1, 0, 2, false, CompactionPolicy::default()).is_err());
    }
}
