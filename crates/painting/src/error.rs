//! Error types for paint operations.

use sculpting::SculptError;

#[derive(Debug, thiserror::Error)]
pub enum PaintError {
    #[error("Active group is locked")]
    ActiveGroupLocked,
    #[error("No active vertex group")]
    NoActiveGroup,
    #[error("Vertex group {0} does not exist")]
    GroupNotFound(usize),
    #[error("Vertex group has {actual} weights, mesh has {expected} vertices")]
    GroupSizeMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Sculpt(#[from] SculptError),
}

pub type PaintResult<T> = Result<T, PaintError>;
