use thiserror::Error;

/// Error types for the newuoa-rs library.
///
/// Only problems that are detected before the first objective evaluation are
/// reported as errors. Everything that happens during a run (budget
/// exhaustion, non-finite values, a failed subproblem) ends the run with an
/// [`ExitStatus`](crate::newuoa::ExitStatus) instead.
#[derive(Error, Debug)]
pub enum NewuoaError {
    /// Error indicating a mismatch in vector dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error for invalid option values.
    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    /// The number of interpolation points is outside `[n+2, (n+1)(n+2)/2]`.
    #[error("Invalid number of interpolation points: npt = {npt}, expected {min} <= npt <= {max}")]
    InvalidNpt {
        /// Requested number of points
        npt: usize,
        /// Smallest admissible value, `n + 2`
        min: usize,
        /// Largest admissible value, `(n + 1)(n + 2) / 2`
        max: usize,
    },

    /// The working storage of a run would exceed the memory ceiling.
    #[error("Memory allocation fails: {0}")]
    MemoryAllocation(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for newuoa-rs operations.
pub type Result<T> = std::result::Result<T, NewuoaError>;
