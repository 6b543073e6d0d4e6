//! Reference geometries of mesh entities.
//!
//! Only the combinatorics matter here: the dimension of each reference
//! geometry and how many sub-entities of each codimension it has. Coordinates
//! and Jacobians live elsewhere.

use serde::{Deserialize, Serialize};

/// Reference geometry of a mesh entity.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum GeometryType {
    Vertex,
    Line,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

impl GeometryType {
    /// Topological dimension of the reference geometry.
    #[inline]
    pub const fn dimension(self) -> usize {
        match self {
            GeometryType::Vertex => 0,
            GeometryType::Line => 1,
            GeometryType::Triangle | GeometryType::Quadrilateral => 2,
            GeometryType::Tetrahedron | GeometryType::Hexahedron => 3,
        }
    }

    /// Number of sub-entities of codimension `codim` (relative to `self`).
    ///
    /// Returns 0 when `codim` exceeds the dimension.
    pub const fn sub_entity_count(self, codim: usize) -> usize {
        let counts: &[usize] = match self {
            GeometryType::Vertex => &[1],
            GeometryType::Line => &[1, 2],
            GeometryType::Triangle => &[1, 3, 3],
            GeometryType::Quadrilateral => &[1, 4, 4],
            GeometryType::Tetrahedron => &[1, 4, 6, 4],
            GeometryType::Hexahedron => &[1, 6, 12, 8],
        };
        if codim < counts.len() { counts[codim] } else { 0 }
    }

    /// Whether the geometry is a simplex.
    pub const fn is_simplex(self) -> bool {
        matches!(
            self,
            GeometryType::Vertex
                | GeometryType::Line
                | GeometryType::Triangle
                | GeometryType::Tetrahedron
        )
    }
}
