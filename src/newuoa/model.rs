//! Quadratic model of the objective.
//!
//! The model is held relative to the base point of the interpolation set:
//!
//! ```text
//!     Q(xbase + x) = c + gq^T x + x^T H x / 2,
//!     H = hq + sum_k pq[k] xpt_k xpt_k^T
//! ```
//!
//! The constant `c` is never stored; all uses of the model are differences of
//! model values. Splitting `H` into an explicit part `hq` and implicit
//! coefficients `pq` is what makes the least-Frobenius-norm update cheap: a
//! replacement only touches `pq`, `gq` and one rank-one term of `hq`.

use ndarray::{s, Array1, Array2};

use super::interpolation::InterpolationSet;

/// Gradient and curvature of the quadratic model.
#[derive(Debug, Clone)]
pub struct QuadraticModel {
    /// Gradient at the base point
    pub(crate) gq: Array1<f64>,

    /// Explicit part of the second derivative matrix
    pub(crate) hq: Array2<f64>,

    /// Coefficients of the implicit part of the second derivative matrix
    pub(crate) pq: Array1<f64>,
}

impl QuadraticModel {
    /// Creates the zero model for `n` variables and `npt` points.
    pub fn new(n: usize, npt: usize) -> Self {
        Self {
            gq: Array1::zeros(n),
            hq: Array2::zeros((n, n)),
            pq: Array1::zeros(npt),
        }
    }

    /// Gradient at the base point.
    pub fn gq(&self) -> &Array1<f64> {
        &self.gq
    }

    /// Explicit part of the Hessian.
    pub fn hq(&self) -> &Array2<f64> {
        &self.hq
    }

    /// Implicit Hessian coefficients.
    pub fn pq(&self) -> &Array1<f64> {
        &self.pq
    }

    /// Builds the part of the initial model determined by initial point `k`.
    ///
    /// Forward differences give the gradient until the opposite point of a
    /// coordinate arrives, then central differences give the gradient and the
    /// diagonal curvature. Points combining two coordinates fix one
    /// off-diagonal entry each.
    pub fn add_initial_point(&mut self, set: &InterpolationSet, k: usize, rhobeg: f64) {
        let n = set.n();
        let fval = set.fval();
        let fbeg = fval[0];
        let f = fval[k];
        if k == 0 {
            return;
        }
        if k <= n {
            self.gq[k - 1] = (f - fbeg) / rhobeg;
        } else if k <= 2 * n {
            let j = k - n - 1;
            let temp = (fbeg - f) / rhobeg;
            self.hq[[j, j]] = (self.gq[j] - temp) / rhobeg;
            self.gq[j] = 0.5 * (self.gq[j] + temp);
        } else {
            let xk = set.xpt().row(k);
            let nonzero: Vec<usize> = (0..n).filter(|&i| xk[i] != 0.0).collect();
            let (i, j) = (nonzero[0], nonzero[1]);
            let ip = if xk[i] < 0.0 { i + n + 1 } else { i + 1 };
            let jp = if xk[j] < 0.0 { j + n + 1 } else { j + 1 };
            let hij = (fbeg - fval[ip] - fval[jp] + f) / (xk[i] * xk[j]);
            self.hq[[i, j]] = hij;
            self.hq[[j, i]] = hij;
        }
    }

    /// Product of the model Hessian with `v`.
    pub fn hess_mul(&self, xpt: &Array2<f64>, v: &Array1<f64>) -> Array1<f64> {
        let weights = xpt.dot(v) * &self.pq;
        self.hq.dot(v) + xpt.t().dot(&weights)
    }

    /// Model gradient at displacement `x` from the base point.
    pub fn gradient_at(&self, xpt: &Array2<f64>, x: &Array1<f64>) -> Array1<f64> {
        &self.gq + &self.hess_mul(xpt, x)
    }

    /// Model value at displacement `x` from the base point, up to the constant term.
    pub fn value(&self, xpt: &Array2<f64>, x: &Array1<f64>) -> f64 {
        self.gq.dot(x) + 0.5 * x.dot(&self.hess_mul(xpt, x))
    }

    /// Model change `Q(xopt + d) - Q(xopt)`.
    pub fn change(&self, xpt: &Array2<f64>, xopt: &Array1<f64>, d: &Array1<f64>) -> f64 {
        let hd = self.hess_mul(xpt, d);
        let hx = self.hess_mul(xpt, xopt);
        self.gq.dot(d) + d.dot(&hx) + 0.5 * d.dot(&hd)
    }

    /// Absorbs the replacement of point `knew`, where `diff` is the
    /// interpolation error of the current model at the new point.
    ///
    /// Must be called after [`InterpolationSet::update`] and before the point
    /// is moved with [`InterpolationSet::replace_point`]: the implicit term of
    /// the outgoing point is folded into `hq` using its old position, while
    /// the correction uses the updated Lagrange functions.
    pub fn absorb_replacement(&mut self, set: &InterpolationSet, knew: usize, diff: f64) {
        let n = set.n();
        let xk = set.xpt().row(knew);
        let pk = self.pq[knew];
        for i in 0..n {
            for j in 0..n {
                self.hq[[i, j]] += pk * xk[i] * xk[j];
            }
        }
        self.pq[knew] = 0.0;
        self.pq.scaled_add(diff, &set.omega_column(knew));
        self.gq.scaled_add(diff, &set.bmat.row(knew));
    }

    /// Least-Frobenius-norm interpolant of the current values.
    ///
    /// The Hessian of the interpolant is purely implicit, with `hq = 0`.
    /// Values are taken relative to `fopt`, which only changes the constant
    /// term.
    pub fn least_frobenius(set: &InterpolationSet) -> Self {
        let npt = set.npt();
        let fopt = set.fopt();
        let rhs = set.fval().mapv(|f| f - fopt);
        let gq = set.bmat.slice(s![..npt, ..]).t().dot(&rhs);
        let mut pq = Array1::zeros(npt);
        for j in 0..set.zmat.ncols() {
            let zcol = set.zmat.column(j);
            let mut coeff = zcol.dot(&rhs);
            if j < set.nneg {
                coeff = -coeff;
            }
            pq.scaled_add(coeff, &zcol);
        }
        Self {
            gq,
            hq: Array2::zeros((set.n(), set.n())),
            pq,
        }
    }

    /// Returns true if every model parameter is finite.
    pub fn is_finite(&self) -> bool {
        self.gq.iter().all(|v| v.is_finite())
            && self.hq.iter().all(|v| v.is_finite())
            && self.pq.iter().all(|v| v.is_finite())
    }
}
