//! DofError: Unified error type for mesh-dofs public APIs
//!
//! Recoverable conditions (invalid state transitions, persisted-layout
//! mismatches) surface as `DofError`. Violated invariants such as an
//! out-of-range local ordinal are assertions, not errors.

use thiserror::Error;

/// Coarse classification of a [`DofError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An API was called in a state that does not permit it.
    InvalidState,
    /// Persisted data did not match what the reader expected.
    Io,
}

/// Unified error type for DOF mapping, storage and ownership operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DofError {
    /// `update()` called although the index source did not advance.
    #[error("mapper update out of turn: index source is still at sequence {sequence}")]
    UpdateOutOfTurn { sequence: u64 },
    /// The index source still has uncompressed holes.
    #[error("index source has pending holes; compress it before updating the mapper")]
    IndexSetNotCompressed,
    /// A remap was applied to storage whose size does not match the remap's old size.
    #[error("remap expects storage of {expected} dofs, container holds {found}")]
    StaleRemap { expected: usize, found: usize },
    /// A remap was applied to storage already at (or past) the remap's generation.
    #[error("remap to sequence {remap} is not newer than container sequence {container}")]
    RemapOutOfOrder { container: u64, remap: u64 },
    /// The handle does not refer to a live container attachment.
    #[error("container handle {0} is not attached")]
    UnknownHandle(String),
    /// The slot id is unknown, already freed or belongs to another container.
    #[error("slot {0} is not allocated in this container")]
    UnknownSlot(String),
    /// A DOF vector did not have the expected length.
    #[error("dof vector size mismatch: expected {expected}, found {found}")]
    VectorSizeMismatch { expected: usize, found: usize },
    /// Persisting a DOF vector while the index space still has holes.
    #[error("cannot persist a dof vector while the index space is not compacted")]
    NotCompacted,
    /// Objects built for different mappers or meshes were combined.
    #[error("mapper mismatch: expected {expected}, found {found}")]
    MapperMismatch { expected: String, found: String },
    /// A block size of zero was requested.
    #[error("block size must be at least 1")]
    InvalidBlockSize,
    /// The DOF layout is inconsistent with the mesh dimension.
    #[error("invalid dof layout: {0}")]
    InvalidLayout(String),
    /// Index-set mutation attempted in the wrong adaptation phase.
    #[error("index set is in phase {phase}; cannot {operation}")]
    AdaptationPhase {
        phase: &'static str,
        operation: &'static str,
    },
    /// The entity is not registered with the index set.
    #[error("entity {key} of codim {codim} is not in the index set")]
    UnknownEntity { codim: usize, key: String },
    /// The entity is already registered with the index set.
    #[error("entity {key} of codim {codim} is already in the index set")]
    DuplicateEntity { codim: usize, key: String },
    /// Codimension outside `[0, dimension]`.
    #[error("codimension {codim} out of range for a mesh of dimension {dimension}")]
    CodimOutOfRange { codim: usize, dimension: usize },
    /// Collective communication with a neighbour failed to decode.
    #[error("communication error with rank {neighbor}: {reason}")]
    CommError { neighbor: usize, reason: String },
    /// A message buffer ran out of bytes while decoding.
    #[error("message buffer underrun: needed {needed} bytes, {remaining} remaining")]
    BufferUnderrun { needed: usize, remaining: usize },
    /// Persisted version tag differs from the reader's.
    #[error("dof vector version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    /// Persisted space tag differs from the reader's space.
    #[error("dof vector space mismatch: expected space {expected}, found space {found}")]
    SpaceMismatch { expected: u32, found: u32 },
    /// Persisted DOF count differs from the reader's space size.
    #[error("dof vector `{name}` size mismatch: expected {expected} dofs, found {found}")]
    SizeMismatch {
        name: String,
        expected: u64,
        found: u64,
    },
    /// Malformed persisted header or underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(String),
}

impl DofError {
    /// Classify this error per the recoverable-error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DofError::VersionMismatch { .. }
            | DofError::SpaceMismatch { .. }
            | DofError::SizeMismatch { .. }
            | DofError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::InvalidState,
        }
    }
}

impl From<std::io::Error> for DofError {
    fn from(err: std::io::Error) -> Self {
        DofError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_variants_classify_as_io() {
        let err = DofError::SpaceMismatch {
            expected: 3,
            found: 7,
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        let msg = err.to_string();
        assert!(msg.contains('3') && msg.contains('7'), "{msg}");
    }

    #[test]
    fn state_variants_classify_as_invalid_state() {
        assert_eq!(
            DofError::UpdateOutOfTurn { sequence: 2 }.kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(DofError::NotCompacted.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn comm_error_names_rank_and_reason() {
        let err = DofError::CommError {
            neighbor: 2,
            reason: "truncated buffer".into(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(
            err.to_string(),
            "communication error with rank 2: truncated buffer"
        );
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn std_io_error_converts() {
        let err: DofError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
