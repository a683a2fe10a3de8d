//! # newuoa-rs
//!
//! `newuoa-rs` is a Rust implementation of Powell's NEWUOA algorithm for
//! minimizing a function of several variables when only function values are
//! available.
//!
//! The library provides:
//! - A model-based trust-region solver with least-Frobenius-norm model updates
//! - Validated, serializable configuration with dimension-dependent defaults
//! - A bounded history of evaluations and a progress callback that can stop a run
//!
//! ## Basic Usage
//!
//! ```
//! use ndarray::{array, Array1};
//! use newuoa_rs::{ExitStatus, Newuoa};
//!
//! let mut objective = |x: &Array1<f64>| (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2);
//! let result = Newuoa::new()
//!     .with_rhobeg(0.5)
//!     .with_rhoend(1e-8)
//!     .minimize(&mut objective, &array![0.0, 0.0])
//!     .unwrap();
//!
//! assert_eq!(result.status, ExitStatus::SmallTrRadius);
//! assert!((result.x[0] - 1.0).abs() < 1e-6);
//! assert!((result.x[1] + 2.0).abs() < 1e-6);
//! ```

// Public modules
pub mod error;
pub mod newuoa;
pub mod problem;

// Re-exports for convenience
pub use error::{NewuoaError, Result};
pub use newuoa::{
    CallbackAction, ExitStatus, Newuoa, NewuoaConfig, NewuoaResult, Progress, Verbosity,
};
pub use problem::Objective;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
