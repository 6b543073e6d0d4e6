//! Consistency checks for the structures that move through an adaptation cycle.
//!
//! The index set, the mapper, slot storage and the slave registry each check
//! their own bookkeeping at the end of the operation that changes it
//! (`compress`, `update`, `apply_remap`, `rebuild`). Checks run in debug
//! builds or with the `strict-invariants` / `check-invariants` features and
//! compile away otherwise. `validate_invariants` is always available so
//! tests and callers can ask for the first broken invariant as a [`DofError`].

use crate::dof_error::DofError;

/// A structure whose internal bookkeeping can be checked.
pub trait DebugInvariants {
    /// Panic on the first broken invariant when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// The first broken invariant, e.g. a hole list that is not sorted or a
    /// storage region that does not match the mapper's size.
    fn validate_invariants(&self) -> Result<(), DofError>;
}

/// Run a `Result<(), DofError>` check and panic with `ctx` on error, only
/// when invariant checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
