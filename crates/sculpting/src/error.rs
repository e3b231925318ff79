//! Error types for sculpt operations.

use crate::session::BackingKind;

/// Errors that can occur during sculpt operations.
///
/// Precondition failures are detected before any mutation. `Invariant`
/// marks internal state that should be unreachable; the operation returns
/// without writing anything.
#[derive(Debug, thiserror::Error)]
pub enum SculptError {
    #[error("Mesh has no color attribute")]
    MissingColorAttribute,
    #[error("Operation requires {expected:?} geometry, mesh is {actual:?}")]
    UnsupportedBacking {
        expected: BackingKind,
        actual: BackingKind,
    },
    #[error("Dynamic topology is already enabled")]
    DyntopoAlreadyEnabled,
    #[error("Dynamic topology is not enabled")]
    DyntopoNotEnabled,
    #[error("Detail flood fill needs a constant detail size")]
    ConstantDetailRequired,
    #[error("Vertex {0} is out of range")]
    VertexOutOfRange(u32),
    #[error("Invalid mesh topology: {0}")]
    InvalidTopology(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Internal invariant violated: {0}")]
    Invariant(&'static str),
}

impl SculptError {
    /// Whether this error is a user-facing precondition failure that should
    /// be surfaced through the report channel.
    pub fn is_precondition(&self) -> bool {
        !matches!(self, SculptError::Cancelled | SculptError::Invariant(_))
    }
}

pub type SculptResult<T> = Result<T, SculptError>;
