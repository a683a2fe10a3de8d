//! Objective definition trait.
//!
//! This module defines the `Objective` trait, which represents the scalar
//! function to be minimized. Only function values are ever requested; no
//! derivative information is assumed to exist.

use ndarray::Array1;

/// A trait representing a scalar objective function of several variables.
///
/// Implementations may return `NaN` or `+inf` to signal that a point is
/// invalid. The solver detects such values and stops with
/// [`ExitStatus::NanInfF`](crate::newuoa::ExitStatus::NanInfF) instead of
/// propagating them through its arithmetic.
///
/// Any `FnMut(&Array1<f64>) -> f64` closure is an `Objective`.
pub trait Objective {
    /// Evaluate the objective at the given point.
    ///
    /// # Arguments
    ///
    /// * `x` - The point at which to evaluate the objective
    ///
    /// # Returns
    ///
    /// * The objective value, possibly non-finite
    fn eval(&mut self, x: &Array1<f64>) -> f64;
}

impl<F> Objective for F
where
    F: FnMut(&Array1<f64>) -> f64,
{
    fn eval(&mut self, x: &Array1<f64>) -> f64 {
        self(x)
    }
}

/// Returns true if an objective value must end the run.
///
/// `-inf` is not included; it meets any target.
pub(crate) fn is_nan_or_posinf(f: f64) -> bool {
    f.is_nan() || f == f64::INFINITY
}
