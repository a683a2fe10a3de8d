//! Trust-region subproblem solver.
//!
//! Approximately minimizes the quadratic model within the ball of radius
//! `delta` around `xopt`. Truncated conjugate gradients run from the origin
//! until the boundary is met, the curvature turns non-positive, or the
//! reduction stalls. If the boundary is met, the step is then rotated on the
//! sphere within two-dimensional subspaces to lower the model further.

use ndarray::Array1;
use std::f64::consts::TAU;

use super::interpolation::InterpolationSet;
use super::model::QuadraticModel;

/// Relative reduction below which the conjugate gradient and boundary
/// iterations stop.
const REDUCTION_TOLERANCE: f64 = 0.01;

/// Number of trial angles in a circle search, not counting the start.
pub(crate) const CIRCLE_SAMPLES: usize = 49;

/// Result of the trust-region subproblem.
#[derive(Debug, Clone)]
pub struct TrustRegionStep {
    /// The step from `xopt`, with `|step| <= delta`
    pub step: Array1<f64>,

    /// Least curvature `d^T H d / d^T d` seen along the conjugate directions,
    /// or zero if the step reached the trust-region boundary.
    pub crvmin: f64,
}

/// Computes an approximate minimizer of the model within the trust region.
///
/// # Arguments
///
/// * `set` - The interpolation set, providing `xopt` and the points of the implicit Hessian
/// * `model` - The quadratic model
/// * `delta` - The trust-region radius
///
/// # Returns
///
/// * The step and the curvature estimate used by the short-step rule
pub fn solve_trust_region(
    set: &InterpolationSet,
    model: &QuadraticModel,
    delta: f64,
) -> TrustRegionStep {
    let n = set.n();
    let xpt = set.xpt();
    let hess = |v: &Array1<f64>| model.hess_mul(xpt, v);
    let delsq = delta * delta;
    let itermax = n;

    let g = model.gradient_at(xpt, set.xopt());
    let mut step = Array1::zeros(n);
    let mut hs: Array1<f64> = Array1::zeros(n);
    let mut crvmin = 0.0;

    let mut d = -&g;
    let mut dd = d.dot(&d);
    if !(dd > 0.0 && dd.is_finite()) {
        return TrustRegionStep { step, crvmin };
    }
    let mut ds = 0.0;
    let mut ss = 0.0;
    let mut gg = dd;
    let ggbeg = gg;
    let mut qred = 0.0;
    let mut iterc = 0;

    // Truncated conjugate gradients.
    loop {
        iterc += 1;
        let temp = delsq - ss;
        let bstep = temp / (ds + (ds * ds + dd * temp).sqrt());
        let hd = hess(&d);
        let dhd = d.dot(&hd);

        let mut alpha = bstep;
        if dhd > 0.0 {
            let curv = dhd / dd;
            crvmin = if iterc == 1 { curv } else { crvmin.min(curv) };
            alpha = alpha.min(gg / dhd);
        }
        let qadd = alpha * (gg - 0.5 * alpha * dhd);
        qred += qadd;

        let ggsav = gg;
        step.scaled_add(alpha, &d);
        hs.scaled_add(alpha, &hd);
        let resid = &g + &hs;
        gg = resid.dot(&resid);

        if !gg.is_finite() {
            return TrustRegionStep { step, crvmin };
        }
        if alpha < bstep {
            if qadd <= REDUCTION_TOLERANCE * qred || iterc >= itermax {
                return TrustRegionStep { step, crvmin };
            }
            d = &d * (gg / ggsav) - &resid;
            dd = d.dot(&d);
            ds = d.dot(&step);
            ss = step.dot(&step);
            if ds <= 0.0 {
                return TrustRegionStep { step, crvmin };
            }
            if ss < delsq {
                continue;
            }
        }
        break;
    }

    // The boundary was reached: rotate the step on the sphere.
    crvmin = 0.0;
    loop {
        if gg <= 1.0e-4 * ggbeg {
            break;
        }
        let sg = step.dot(&g);
        let shs = step.dot(&hs);
        let sgk = sg + shs;
        if sgk / (gg * delsq).sqrt() <= -0.99 {
            break;
        }

        iterc += 1;
        let temp = (delsq * gg - sgk * sgk).sqrt();
        if !(temp > 0.0) {
            break;
        }
        let resid = &g + &hs;
        let d = &resid * (delsq / temp) - &step * (sgk / temp);
        let hd = hess(&d);
        let dg = d.dot(&g);
        let dhd = hd.dot(&d);
        let dhs = hd.dot(&step);

        let cf = 0.5 * (shs - dhd);
        let qbeg = sg + cf;
        let q = |angle: f64| {
            let (sth, cth) = angle.sin_cos();
            (sg + cf * cth) * cth + (dg + dhs * cth) * sth
        };
        let angle = circle_search(q);
        let (sth, cth) = angle.sin_cos();
        let reduc = qbeg - q(angle);

        step = &step * cth + &d * sth;
        hs = &hs * cth + &hd * sth;
        let resid = &g + &hs;
        gg = resid.dot(&resid);
        qred += reduc;

        let ratio = reduc / qred;
        if !(iterc < itermax && ratio > REDUCTION_TOLERANCE) {
            break;
        }
    }

    TrustRegionStep { step, crvmin }
}

/// Angle in `[0, 2pi)` approximately minimizing `f` on the unit circle.
///
/// `f` is sampled at `CIRCLE_SAMPLES + 1` equally spaced angles starting at
/// zero. The best sample is refined by the vertex of the parabola through it
/// and its two neighbours. The first of equal samples wins.
pub(crate) fn circle_search<F>(f: F) -> f64
where
    F: Fn(f64) -> f64,
{
    let iu = CIRCLE_SAMPLES;
    let spacing = TAU / (iu + 1) as f64;
    let fbeg = f(0.0);
    let mut fmin = fbeg;
    let mut fprev = fbeg;
    let mut fnew = fbeg;
    let mut isave = 0;
    let mut before = 0.0;
    let mut after = 0.0;

    for i in 1..=iu {
        fnew = f(i as f64 * spacing);
        if fnew < fmin {
            fmin = fnew;
            isave = i;
            before = fprev;
        } else if i == isave + 1 {
            after = fnew;
        }
        fprev = fnew;
    }
    if isave == 0 {
        before = fnew;
    }
    if isave == iu {
        after = fbeg;
    }

    let mut shift = 0.0;
    if before != after {
        let a = before - fmin;
        let b = after - fmin;
        let vertex = 0.5 * (a - b) / (a + b);
        if vertex.is_finite() {
            shift = vertex;
        }
    }
    spacing * (isave as f64 + shift)
}
