use thiserror::Error;

/// Numerical failures raised by the core while propagating tangent bundles.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DynamicsError {
    #[error("{context} has shape {found:?}, expected {expected:?}.")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Encountered singular R matrix during {0}.")]
    SingularTriangular(&'static str),
    #[error("Encountered non-finite value during {0}.")]
    NonFinite(&'static str),
    #[error("Encountered degenerate column {column} during normalization.")]
    DegenerateColumn { column: usize },
}
