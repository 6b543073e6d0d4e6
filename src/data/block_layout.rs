//! Per-codimension DOF counts and the block offsets derived from them.
//!
//! [`DofLayout`] says how many DOF blocks sit on each sub-entity of every
//! element geometry. [`BlockLayout`] turns the per-codimension maxima and the
//! index-set sizes into contiguous ranges of the global block index space:
//!
//! ```text
//!   offset[0] = 0
//!   offset[c + 1] = offset[c] + size(c) * max_dofs[c]
//! ```

use std::collections::BTreeMap;
use std::ops::Range;

use crate::dof_error::DofError;
use crate::topology::geometry::GeometryType;

/// A run of DOF blocks attached to one sub-entity of an element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LocalBlock {
    /// Absolute codimension of the sub-entity.
    pub codim: usize,
    /// Local number of the sub-entity within the element.
    pub sub_entity: usize,
    /// Number of DOF blocks on the sub-entity.
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct GeometryDofs {
    per_codim: Vec<usize>,
    blocks: Vec<LocalBlock>,
    num_blocks: usize,
}

impl GeometryDofs {
    fn new(geometry: GeometryType, per_codim: Vec<usize>) -> Self {
        let mut blocks = Vec::new();
        for (codim, &count) in per_codim.iter().enumerate() {
            if count == 0 {
                continue;
            }
            for sub_entity in 0..geometry.sub_entity_count(codim) {
                blocks.push(LocalBlock {
                    codim,
                    sub_entity,
                    count,
                });
            }
        }
        let num_blocks = blocks.iter().map(|b| b.count).sum();
        Self {
            per_codim,
            blocks,
            num_blocks,
        }
    }
}

/// DOF blocks per sub-entity codimension, for every element geometry of a mesh.
///
/// Within an element, blocks are ordered by codimension, then sub-entity
/// number, then per-sub-entity DOF.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DofLayout {
    dimension: usize,
    per_geometry: BTreeMap<GeometryType, GeometryDofs>,
}

impl DofLayout {
    /// Empty layout for a mesh of dimension `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            per_geometry: BTreeMap::new(),
        }
    }

    /// Add an element geometry with `dofs_per_codim[c]` blocks on every
    /// sub-entity of codimension `c`.
    ///
    /// # Errors
    /// Returns `Err(InvalidLayout)` if the geometry's dimension differs from
    /// the mesh dimension or `dofs_per_codim` does not have `dimension + 1`
    /// entries.
    pub fn with_geometry(
        mut self,
        geometry: GeometryType,
        dofs_per_codim: &[usize],
    ) -> Result<Self, DofError> {
        if geometry.dimension() != self.dimension {
            return Err(DofError::InvalidLayout(format!(
                "{geometry:?} is not an element of a {}-dimensional mesh",
                self.dimension
            )));
        }
        if dofs_per_codim.len() != self.dimension + 1 {
            return Err(DofError::InvalidLayout(format!(
                "expected {} per-codim counts, got {}",
                self.dimension + 1,
                dofs_per_codim.len()
            )));
        }
        self.per_geometry
            .insert(geometry, GeometryDofs::new(geometry, dofs_per_codim.to_vec()));
        Ok(self)
    }

    /// Continuous Lagrange layout of order 1 or 2.
    ///
    /// Order 2 places one block on every edge of simplices, and one block on
    /// every sub-entity of cubes.
    pub fn lagrange(
        dimension: usize,
        order: usize,
        geometries: &[GeometryType],
    ) -> Result<Self, DofError> {
        if !(1..=2).contains(&order) {
            return Err(DofError::InvalidLayout(format!(
                "lagrange order {order} is not supported"
            )));
        }
        let mut layout = Self::new(dimension);
        for &g in geometries {
            let counts: Vec<usize> = (0..=dimension)
                .map(|codim| {
                    let sub_dim = dimension - codim;
                    match order {
                        1 => usize::from(sub_dim == 0),
                        2 if g.is_simplex() => usize::from(sub_dim <= 1),
                        _ => 1,
                    }
                })
                .collect();
            layout = layout.with_geometry(g, &counts)?;
        }
        Ok(layout)
    }

    /// Discontinuous layout: all blocks on the element itself.
    pub fn discontinuous(
        dimension: usize,
        element_dofs: &[(GeometryType, usize)],
    ) -> Result<Self, DofError> {
        let mut layout = Self::new(dimension);
        for &(g, n) in element_dofs {
            let mut counts = vec![0; dimension + 1];
            counts[0] = n;
            layout = layout.with_geometry(g, &counts)?;
        }
        Ok(layout)
    }

    /// Mesh dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Element geometries covered by this layout.
    pub fn geometries(&self) -> impl Iterator<Item = GeometryType> + '_ {
        self.per_geometry.keys().copied()
    }

    /// Blocks on one sub-entity of codimension `codim` of a `geometry` element.
    pub fn dofs_per_sub_entity(&self, geometry: GeometryType, codim: usize) -> usize {
        self.per_geometry
            .get(&geometry)
            .and_then(|g| g.per_codim.get(codim))
            .copied()
            .unwrap_or(0)
    }

    /// Upper bound of blocks per entity, for each codimension.
    pub fn max_dofs(&self) -> Vec<usize> {
        let mut out = vec![0; self.dimension + 1];
        for g in self.per_geometry.values() {
            for (m, &n) in out.iter_mut().zip(&g.per_codim) {
                *m = (*m).max(n);
            }
        }
        out
    }

    /// Total blocks on the closure of a `geometry` element.
    pub fn num_blocks(&self, geometry: GeometryType) -> Option<usize> {
        self.per_geometry.get(&geometry).map(|g| g.num_blocks)
    }

    /// Local block runs of a `geometry` element, in local order.
    pub fn local_blocks(&self, geometry: GeometryType) -> Option<&[LocalBlock]> {
        self.per_geometry.get(&geometry).map(|g| &g.blocks[..])
    }
}

/// Offsets of each codimension's block range in the global block index space.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockLayout {
    max_dofs: Vec<usize>,
    sizes: Vec<usize>,
    /// `codims + 1` entries; the last is the total number of blocks.
    offsets: Vec<usize>,
}

impl BlockLayout {
    /// Lay out `sizes[c] * max_dofs[c]` blocks per codimension, back to back.
    ///
    /// # Panics
    /// Panics if the two slices differ in length.
    pub fn compute(max_dofs: &[usize], sizes: &[usize]) -> Self {
        assert_eq!(max_dofs.len(), sizes.len(), "one size per codimension");
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        let mut running = 0usize;
        offsets.push(running);
        for (&m, &s) in max_dofs.iter().zip(sizes) {
            running += m * s;
            offsets.push(running);
        }
        Self {
            max_dofs: max_dofs.to_vec(),
            sizes: sizes.to_vec(),
            offsets,
        }
    }

    /// Number of codimensions.
    #[inline]
    pub fn codims(&self) -> usize {
        self.sizes.len()
    }

    /// First block of codimension `codim`.
    #[inline]
    pub fn offset(&self, codim: usize) -> usize {
        self.offsets[codim]
    }

    /// Index-set size of `codim` this layout was computed from.
    #[inline]
    pub fn size(&self, codim: usize) -> usize {
        self.sizes[codim]
    }

    /// Blocks per entity of `codim`.
    #[inline]
    pub fn max_dofs(&self, codim: usize) -> usize {
        self.max_dofs[codim]
    }

    /// Block range of codimension `codim`.
    #[inline]
    pub fn range(&self, codim: usize) -> Range<usize> {
        self.offsets[codim]..self.offsets[codim + 1]
    }

    /// Total number of blocks.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_accumulate_per_codim() {
        let layout = BlockLayout::compute(&[1, 0, 2], &[4, 9, 5]);
        assert_eq!(layout.offset(0), 0);
        assert_eq!(layout.offset(1), 4);
        assert_eq!(layout.offset(2), 4);
        assert_eq!(layout.range(2), 4..14);
        assert_eq!(layout.num_blocks(), 14);
    }

    #[test]
    fn p2_triangle_has_six_blocks() {
        let layout = DofLayout::lagrange(2, 2, &[GeometryType::Triangle]).unwrap();
        assert_eq!(layout.num_blocks(GeometryType::Triangle), Some(6));
        assert_eq!(layout.max_dofs(), vec![0, 1, 1]);
        let q2 = DofLayout::lagrange(2, 2, &[GeometryType::Quadrilateral]).unwrap();
        assert_eq!(q2.num_blocks(GeometryType::Quadrilateral), Some(9));
    }

    #[test]
    fn mixed_layout_takes_maximum() {
        let layout = DofLayout::new(2)
            .with_geometry(GeometryType::Triangle, &[0, 1, 1])
            .unwrap()
            .with_geometry(GeometryType::Quadrilateral, &[1, 1, 1])
            .unwrap();
        assert_eq!(layout.max_dofs(), vec![1, 1, 1]);
        assert_eq!(layout.dofs_per_sub_entity(GeometryType::Triangle, 0), 0);
    }

    #[test]
    fn geometry_dimension_must_match() {
        let err = DofLayout::new(1).with_geometry(GeometryType::Triangle, &[1, 0, 0]);
        assert!(matches!(err, Err(DofError::InvalidLayout(_))));
        assert!(DofLayout::lagrange(1, 3, &[GeometryType::Line]).is_err());
    }

    #[test]
    fn local_blocks_are_codim_major() {
        let layout = DofLayout::lagrange(1, 2, &[GeometryType::Line]).unwrap();
        let blocks = layout.local_blocks(GeometryType::Line).unwrap();
        assert_eq!(blocks[0], LocalBlock { codim: 0, sub_entity: 0, count: 1 });
        assert_eq!(blocks[1], LocalBlock { codim: 1, sub_entity: 0, count: 1 });
        assert_eq!(blocks[2], LocalBlock { codim: 1, sub_entity: 1, count: 1 });
    }
}
