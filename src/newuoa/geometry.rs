//! Geometry steps and the choice of the point to replace.
//!
//! A geometry step moves one interpolation point, chosen because it lies far
//! from `xopt`, to a place where its Lagrange function is large in modulus.
//! That keeps the denominator of the updating formula away from zero, which
//! is what keeps the interpolation set well poised.

use ndarray::{Array1, ArrayView1};

use super::interpolation::{distance_squared, InterpolationSet, LagrangeValues};
use super::step::circle_search;

/// Relative size below which an updating denominator is not trusted: the
/// point is kept and a geometry step is taken instead.
pub const MIN_DENOMINATOR: f64 = f64::EPSILON;

/// Relative gain required to continue a subspace search.
const IMPROVEMENT_FACTOR: f64 = 1.1;

/// Which point, if any, a trust-region trial point replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    /// Replace the point with this index.
    Point(usize),

    /// No point qualifies; the trial point is discarded.
    Keep,

    /// The best candidate has an updating denominator too small to trust.
    IllConditioned(usize),
}

/// A step that improves the geometry of the interpolation set.
#[derive(Debug, Clone)]
pub struct GeometryStep {
    /// The step from `xopt`
    pub step: Array1<f64>,

    /// Diagonal element of `Z S Z^T` for the point being replaced
    pub alpha: f64,
}

/// Second derivative matrix of Lagrange function `knew` applied to `v`.
fn lagrange_hess_mul(set: &InterpolationSet, hcol: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
    let weights = set.xpt().dot(v) * hcol;
    set.xpt().t().dot(&weights)
}

/// Gradient of Lagrange function `knew` at displacement `x` from the base point.
fn lagrange_gradient(
    set: &InterpolationSet,
    knew: usize,
    hcol: &Array1<f64>,
    x: &Array1<f64>,
) -> Array1<f64> {
    let bk: ArrayView1<f64> = set.bmat.row(knew);
    &bk + &lagrange_hess_mul(set, hcol, x)
}

/// Approximately maximizes `|l_knew(xopt + d)|` subject to `|d| = delta`.
///
/// The search starts along the line from `xopt` to point `knew` and then
/// rotates `d` in two-dimensional subspaces spanned by `d` and the gradient
/// of the Lagrange function, for at most `n` iterations.
///
/// # Arguments
///
/// * `set` - The interpolation set
/// * `knew` - Index of the point that will be replaced
/// * `delta` - Length of the step
pub fn lagrange_step(set: &InterpolationSet, knew: usize, delta: f64) -> GeometryStep {
    let n = set.n();
    let delsq = delta * delta;
    let hcol = set.omega_column(knew);
    let alpha = hcol[knew];
    let hess = |v: &Array1<f64>| lagrange_hess_mul(set, &hcol, v);

    let mut d = &set.xpt().row(knew) - set.xopt();
    let dd = d.dot(&d);
    if !(dd > 0.0) {
        return GeometryStep { step: d, alpha };
    }
    let gc = lagrange_gradient(set, knew, &hcol, set.xopt());
    let mut gd = hess(&d);

    // Scale d to the trust-region boundary, on the side where l_knew changes most.
    let gg = gc.dot(&gc);
    let sp = d.dot(&gc);
    let dhd = d.dot(&gd);
    let mut scale = delta / dd.sqrt();
    if sp * dhd < 0.0 {
        scale = -scale;
    }
    let mut mix = 0.0;
    if sp * sp > 0.99 * dd * gg {
        mix = 1.0;
    }
    let tau = scale * (sp.abs() + 0.5 * scale * dhd.abs());
    if gg * delsq < 0.01 * tau * tau {
        mix = 1.0;
    }
    d *= scale;
    gd *= scale;
    let mut s = &gc + &(&gd * mix);

    for _ in 0..n {
        let dd = d.dot(&d);
        let sp = d.dot(&s);
        let ss = s.dot(&s);
        let temp = dd * ss - sp * sp;
        if temp <= 1.0e-8 * dd * ss {
            break;
        }
        s = (&s * dd - &d * sp) / temp.sqrt();
        let w = hess(&s);

        let cf1 = 0.5 * s.dot(&w);
        let cf2 = d.dot(&gc);
        let cf3 = s.dot(&gc);
        let cf4 = 0.5 * d.dot(&gd) - cf1;
        let cf5 = s.dot(&gd);
        let tau_at = |angle: f64| {
            let (sth, cth) = angle.sin_cos();
            cf1 + (cf2 + cf4 * cth) * cth + (cf3 + cf5 * cth) * sth
        };
        let taubeg = tau_at(0.0);
        let angle = circle_search(|a| -tau_at(a).abs());
        let tau = tau_at(angle);

        let (sth, cth) = angle.sin_cos();
        d = &d * cth + &s * sth;
        gd = &gd * cth + &w * sth;
        s = &gc + &gd;
        if tau.abs() <= IMPROVEMENT_FACTOR * taubeg.abs() {
            break;
        }
    }

    GeometryStep { step: d, alpha }
}

/// Rotates `d` on its sphere to enlarge the modulus of the updating
/// denominator for point `knew`.
///
/// Used when [`lagrange_step`] yields a denominator with too much
/// cancellation between `alpha * beta` and `l_knew^2`. Each iteration
/// searches the circles through `d` towards `xpt_knew - xopt` and towards
/// the gradient of the Lagrange function, and keeps the best point found if
/// it beats the current one by at least ten percent.
pub fn maximize_denominator(set: &InterpolationSet, knew: usize, d: Array1<f64>) -> Array1<f64> {
    let n = set.n();
    let hcol = set.omega_column(knew);
    let denominator = |trial: &Array1<f64>| set.denominator(&set.lagrange_values(trial), knew).abs();

    let mut d = d;
    let mut best = denominator(&d);
    let dd = d.dot(&d);
    if !(dd > 0.0) {
        return d;
    }

    for _ in 0..n {
        let toward_point = &set.xpt().row(knew) - set.xopt();
        let xnew = set.xopt() + &d;
        let gradient = lagrange_gradient(set, knew, &hcol, &xnew);

        let mut candidate: Option<(Array1<f64>, f64)> = None;
        for u in [toward_point, gradient] {
            let sp = d.dot(&u);
            let uu = u.dot(&u);
            let temp = dd * uu - sp * sp;
            if !(temp > 1.0e-8 * dd * uu) {
                continue;
            }
            let s = (&u * dd - &d * sp) / temp.sqrt();
            let on_circle = |angle: f64| {
                let (sth, cth) = angle.sin_cos();
                &d * cth + &s * sth
            };
            let angle = circle_search(|a| -denominator(&on_circle(a)));
            let trial = on_circle(angle);
            let value = denominator(&trial);
            if candidate.as_ref().map_or(true, |(_, v)| value > *v) {
                candidate = Some((trial, value));
            }
        }

        match candidate {
            Some((trial, value)) if value > IMPROVEMENT_FACTOR * best => {
                d = trial;
                best = value;
            }
            _ => break,
        }
    }
    d
}

/// Chooses the interpolation point to be replaced by a trust-region trial point.
///
/// Every point is weighted by the modulus of its updating denominator,
/// multiplied by `(distsq / rhosq)^3` when it lies farther than
/// `rhosq = max(delta / 10, rho)^2` from `center`. When the trial point did
/// not improve on `fopt`, the best point is kept and only weights above one
/// qualify. The first of equal weights wins.
///
/// # Arguments
///
/// * `set` - The interpolation set
/// * `values` - Lagrange values and `beta` at the trial step
/// * `improved` - Whether the trial value is below `fopt`
/// * `center` - The best point after the step, as a displacement from `xbase`
/// * `delta` - The trust-region radius after the step
/// * `rho` - The current lower bound on the radius
///
/// # Returns
///
/// * The point to replace, [`Replacement::Keep`] if none qualifies, or
///   [`Replacement::IllConditioned`] if the updating denominator of the
///   chosen point is within [`MIN_DENOMINATOR`] of zero relative to its terms
pub fn choose_replacement(
    set: &InterpolationSet,
    values: &LagrangeValues,
    improved: bool,
    center: &Array1<f64>,
    delta: f64,
    rho: f64,
) -> Replacement {
    let rhosq = (0.1 * delta).max(rho).powi(2);
    let hdiag = set.omega_diagonal();
    let (excluded, mut detrat) = if improved {
        (None, 0.0)
    } else {
        (Some(set.kopt()), 1.0)
    };

    let mut knew = None;
    for k in 0..set.npt() {
        if excluded == Some(k) {
            continue;
        }
        let mut weight = (values.beta * hdiag[k] + values.vlag[k].powi(2)).abs();
        let distsq = distance_squared(set.xpt().row(k), center);
        if distsq > rhosq {
            weight *= (distsq / rhosq).powi(3);
        }
        if weight > detrat {
            detrat = weight;
            knew = Some(k);
        }
    }

    let Some(k) = knew else {
        return Replacement::Keep;
    };
    if trusted_denominator(values.beta * hdiag[k], values.vlag[k].powi(2)) {
        Replacement::Point(k)
    } else {
        Replacement::IllConditioned(k)
    }
}

/// Returns true if the denominator `alpha * beta + tau^2` is not lost to
/// cancellation between its two terms.
///
/// The threshold scales with the larger term, and with one when both are small.
pub(crate) fn trusted_denominator(alpha_beta: f64, tau_sq: f64) -> bool {
    let scale = alpha_beta.abs().max(tau_sq).max(1.0);
    (alpha_beta + tau_sq).abs() > MIN_DENOMINATOR * scale
}
