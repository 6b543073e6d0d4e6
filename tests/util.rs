#![allow(dead_code)]
use std::sync::Arc;

use mesh_dofs::{
    data::block_layout::DofLayout,
    topology::{
        adaptive::{AdaptiveIndexSet, CompactionPolicy},
        geometry::GeometryType,
        index_source::{EntityIndexSource, MeshEntity, MeshId},
    },
    algs::communicator::ThreadWorld,
};

/// Continuous P1 on lines.
pub fn p1() -> DofLayout {
    DofLayout::lagrange(1, 1, &[GeometryType::Line]).unwrap()
}

/// Continuous P2 on lines.
pub fn p2() -> DofLayout {
    DofLayout::lagrange(1, 2, &[GeometryType::Line]).unwrap()
}

/// `n` DOFs per line element, nothing on vertices.
pub fn dg(n: usize) -> DofLayout {
    DofLayout::discontinuous(1, &[(GeometryType::Line, n)]).unwrap()
}

/// Run `f(rank, world)` on `n` threads sharing one `ThreadWorld`; results in rank order.
pub fn spawn_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize, &Arc<ThreadWorld>) -> T + Sync,
{
    let world = ThreadWorld::new(n);
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..n)
            .map(|rank| {
                let world = &world;
                let f = &f;
                s.spawn(move || f(rank, world))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Assert `xs` is strictly ascending.
pub fn assert_strictly_ascending(xs: &[usize]) {
    for w in xs.windows(2) {
        assert!(w[0] < w[1], "not strictly ascending: {xs:?}");
    }
}

/// A bare point entity of a 0-dimensional mesh.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Point(pub u32);

impl MeshEntity for Point {
    fn codim(&self) -> usize {
        0
    }
    fn geometry_type(&self) -> GeometryType {
        GeometryType::Vertex
    }
}

/// A single codim-0 index set of points, adaptable point by point.
pub struct PointCloud {
    id: MeshId,
    pub indices: AdaptiveIndexSet<u32>,
}

impl PointCloud {
    /// Points `0..n`, already compacted.
    pub fn new(n: u32, policy: CompactionPolicy) -> Self {
        let mut indices = AdaptiveIndexSet::new(0, policy);
        for k in 0..n {
            indices.insert(0, k).unwrap();
        }
        indices.compress().unwrap();
        indices.finish_compaction();
        Self {
            id: MeshId::fresh(),
            indices,
        }
    }

    /// One DOF per point.
    pub fn layout() -> DofLayout {
        DofLayout::discontinuous(0, &[(GeometryType::Vertex, 1)]).unwrap()
    }
}

impl EntityIndexSource for PointCloud {
    type Entity = Point;

    fn mesh_id(&self) -> MeshId {
        self.id
    }
    fn dimension(&self) -> usize {
        0
    }
    fn size(&self, codim: usize) -> usize {
        self.indices.size(codim)
    }
    fn sub_index(&self, entity: &Point, _local: usize, codim: usize) -> usize {
        self.indices.index(codim, &entity.0).unwrap()
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
