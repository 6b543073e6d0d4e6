//! Globally consistent reductions over per-process DOF vectors.
//!
//! Every process sums only the DOFs it owns, skipping the slaves with one
//! cursor over the sorted slave list, and the partial sums are combined by a
//! collective sum. Inputs must be consistent across processes; this is not
//! checked.

use num_traits::{Float, NumCast};

use crate::algs::communicator::Collective;
use crate::algs::slave_dofs::SlaveDofRegistry;
use crate::dof_error::DofError;

/// Dot products and norms that count each shared DOF exactly once.
pub struct ParallelReduction<'a, C: ?Sized> {
    slaves: &'a SlaveDofRegistry,
    channel: &'a C,
}

impl<'a, C: Collective + ?Sized> ParallelReduction<'a, C> {
    /// # Panics
    /// Later calls panic if `slaves` is not built.
    pub fn new(slaves: &'a SlaveDofRegistry, channel: &'a C) -> Self {
        Self { slaves, channel }
    }

    fn check_len(expected: usize, found: usize) -> Result<(), DofError> {
        if expected != found {
            return Err(DofError::VectorSizeMismatch { expected, found });
        }
        Ok(())
    }

    /// This process's share of `x · y`: the sum over owned DOFs only.
    pub fn local_dot<T: Float>(&self, x: &[T], y: &[T]) -> Result<T, DofError> {
        let list = self.slaves.slaves();
        let total = list[list.len() - 1];
        Self::check_len(total, x.len())?;
        Self::check_len(total, y.len())?;
        let mut next = 0usize;
        let mut acc = T::zero();
        for (i, (&a, &b)) in x.iter().zip(y).enumerate() {
            // the sentinel stops the cursor at `total`
            if list[next] == i {
                next += 1;
                continue;
            }
            acc = acc + a * b;
        }
        Ok(acc)
    }

    /// `x · y` over all processes. Blocking collective.
    ///
    /// # Errors
    /// Returns `Err(VectorSizeMismatch)` if either vector's length differs
    /// from the DOF count the slave list was built for. The check is local;
    /// a rank that fails it does not join the collective sum.
    pub fn dot<T: Float>(&self, x: &[T], y: &[T]) -> Result<T, DofError> {
        let local = self.local_dot(x, y)?;
        let total = self.channel.sum(local.to_f64().unwrap_or(f64::NAN));
        Ok(<T as NumCast>::from(total).unwrap_or_else(T::nan))
    }

    /// Euclidean norm `sqrt(x · x)` over all processes. Blocking collective.
    pub fn norm<T: Float>(&self, x: &[T]) -> Result<T, DofError> {
        Ok(self.dot(x, x)?.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::SerialChannel;
    use crate::config::Continuity;
    use crate::data::block_layout::DofLayout;
    use crate::data::mapper::EntityDofMapper;
    use crate::topology::adaptive::CompactionPolicy;
    use crate::topology::geometry::GeometryType;
    use crate::topology::interval::IntervalMesh;

    fn dg_ghosted() -> SlaveDofRegistry {
        let mesh = IntervalMesh::partitioned(4, 0, 2, true, CompactionPolicy::default()).unwrap();
        let layout = DofLayout::discontinuous(1, &[(GeometryType::Line, 1)]).unwrap();
        let mapper = EntityDofMapper::new(&mesh, layout, 1).unwrap();
        let mut reg = SlaveDofRegistry::new();
        reg.rebuild(&mesh, &mapper, Continuity::Discontinuous, &SerialChannel)
            .unwrap();
        reg
    }

    #[test]
    fn slaves_are_skipped() {
        let reg = dg_ghosted();
        assert_eq!(reg.slaves(), &[2, 3]);
        let red = ParallelReduction::new(&reg, &SerialChannel);
        let x = [1.0, 2.0, 100.0];
        assert_eq!(red.dot(&x, &x).unwrap(), 5.0);
        let xf = [3.0f32, 4.0, 9.0];
        assert_eq!(red.norm(&xf).unwrap(), 5.0);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let reg = dg_ghosted();
        let red = ParallelReduction::new(&reg, &SerialChannel);
        assert_eq!(
            red.dot(&[1.0, 2.0], &[1.0, 2.0, 3.0]),
            Err(DofError::VectorSizeMismatch {
                expected: 3,
                found: 2
            })
        );
    }
}
