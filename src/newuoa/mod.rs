//! NEWUOA algorithm implementation.
//!
//! This module provides Powell's NEWUOA method for unconstrained minimization
//! without derivatives. Each iteration minimizes a quadratic model of the
//! objective within a trust region; the model interpolates the objective at
//! `npt` points and its curvature is updated by the least change in
//! Frobenius norm whenever a point is replaced.

// Include module declarations and re-exports
pub mod algorithm;
pub mod config;
pub mod geometry;
pub mod history;
pub mod interpolation;
pub mod model;
pub mod status;
pub mod step;
pub mod trust_region;

// Re-export key types
pub use algorithm::{CallbackAction, Newuoa, NewuoaResult, Progress};
pub use config::{NewuoaConfig, ResolvedConfig, Verbosity};
pub use geometry::{GeometryStep, Replacement};
pub use history::{History, HistoryEntry};
pub use interpolation::{InterpolationSet, LagrangeValues};
pub use model::QuadraticModel;
pub use status::ExitStatus;
pub use step::TrustRegionStep;
pub use trust_region::{Decision, RadiusController};
