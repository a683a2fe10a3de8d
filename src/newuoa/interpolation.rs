//! Interpolation set and its conditioning structure.
//!
//! The set holds `npt` points stored as displacements from a base point
//! `xbase`, together with their objective values. Alongside the points it
//! keeps a factored inverse of the interpolation (KKT) matrix,
//!
//! ```text
//!     H = [ Z S Z^T   B_y^T ]      S = diag(-1, ..., -1, +1, ..., +1)
//!         [ B_y       B_x   ]            (nneg negative entries)
//! ```
//!
//! where `bmat = [B_y^T; B_x]` has `npt + n` rows and `zmat = Z` has
//! `npt - n - 1` columns. Column `k` of `H` holds the coefficients of the
//! `k`-th Lagrange function, which lets a single point replacement be
//! absorbed in `O(npt^2)` operations.

use ndarray::{s, Array1, Array2, ArrayView1, Axis};

use super::model::QuadraticModel;

/// Lagrange function values and the `beta` parameter for a trial step.
#[derive(Debug, Clone)]
pub struct LagrangeValues {
    /// First `npt` entries: Lagrange function values at `xopt + d`;
    /// last `n` entries: the `B_x`-part of `H w`.
    pub vlag: Array1<f64>,

    /// The `beta` term of the updating formula.
    pub beta: f64,
}

/// Sample points, their values, and the factored inverse KKT matrix.
#[derive(Debug, Clone)]
pub struct InterpolationSet {
    pub(crate) n: usize,
    pub(crate) npt: usize,
    pub(crate) xbase: Array1<f64>,
    pub(crate) xpt: Array2<f64>,
    pub(crate) fval: Array1<f64>,
    pub(crate) kopt: usize,
    pub(crate) xopt: Array1<f64>,
    pub(crate) bmat: Array2<f64>,
    pub(crate) zmat: Array2<f64>,
    pub(crate) nneg: usize,
}

impl InterpolationSet {
    /// Creates an empty set around `xbase`. Points are added with
    /// [`add_initial_point`](Self::add_initial_point).
    pub fn new(xbase: Array1<f64>, npt: usize) -> Self {
        let n = xbase.len();
        Self {
            n,
            npt,
            xbase,
            xpt: Array2::zeros((npt, n)),
            fval: Array1::from_elem(npt, f64::NAN),
            kopt: 0,
            xopt: Array1::zeros(n),
            bmat: Array2::zeros((npt + n, n)),
            zmat: Array2::zeros((npt, npt - n - 1)),
            nneg: 0,
        }
    }

    /// Problem dimension.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of interpolation points.
    pub fn npt(&self) -> usize {
        self.npt
    }

    /// Current base point.
    pub fn xbase(&self) -> &Array1<f64> {
        &self.xbase
    }

    /// Displacements of the points from `xbase`, one per row.
    pub fn xpt(&self) -> &Array2<f64> {
        &self.xpt
    }

    /// Objective values at the points.
    pub fn fval(&self) -> &Array1<f64> {
        &self.fval
    }

    /// Index of the point with the least value.
    pub fn kopt(&self) -> usize {
        self.kopt
    }

    /// Displacement of the best point from `xbase`.
    pub fn xopt(&self) -> &Array1<f64> {
        &self.xopt
    }

    /// Least value in the set.
    pub fn fopt(&self) -> f64 {
        self.fval[self.kopt]
    }

    /// Coordinate pair `(i, j)` perturbed together by initial point `k > 2n`.
    fn diagonal_pair(&self, k: usize) -> (usize, usize) {
        let n = self.n;
        let itemp = (k - n - 1) / n;
        let jpt = k - itemp * n - n;
        let ipt = jpt + itemp;
        if ipt > n {
            (jpt - 1, ipt - n - 1)
        } else {
            (ipt - 1, jpt - 1)
        }
    }

    /// Side (`+rhobeg` or `-rhobeg`) of coordinate `i` with the lower value.
    fn better_side(&self, i: usize, rhobeg: f64) -> f64 {
        if self.fval[i + self.n + 1] < self.fval[i + 1] {
            -rhobeg
        } else {
            rhobeg
        }
    }

    /// Displacement of the `k`-th initial point.
    ///
    /// Point 0 is the base, points `1..=n` step `+rhobeg` along each
    /// coordinate, points `n+1..=2n` step `-rhobeg`, and any further points
    /// combine two coordinates, each on the side with the lower value. The
    /// values of all earlier points must already be recorded.
    pub fn initial_displacement(&self, k: usize, rhobeg: f64) -> Array1<f64> {
        let n = self.n;
        let mut d = Array1::zeros(n);
        if k == 0 {
            return d;
        }
        if k <= n {
            d[k - 1] = rhobeg;
        } else if k <= 2 * n {
            d[k - n - 1] = -rhobeg;
        } else {
            let (ipt, jpt) = self.diagonal_pair(k);
            d[ipt] = self.better_side(ipt, rhobeg);
            d[jpt] = self.better_side(jpt, rhobeg);
        }
        d
    }

    /// Records the `k`-th initial point and fills in its part of `bmat` and `zmat`.
    pub fn add_initial_point(&mut self, k: usize, d: &Array1<f64>, f: f64, rhobeg: f64) {
        let n = self.n;
        let npt = self.npt;
        let rhosq = rhobeg * rhobeg;
        let recip = 1.0 / rhosq;
        let reciq = 0.5_f64.sqrt() / rhosq;

        self.xpt.row_mut(k).assign(d);
        self.fval[k] = f;
        if k == 0 || f < self.fval[self.kopt] {
            self.kopt = k;
            self.xopt.assign(d);
        }

        if k == 0 {
            return;
        }
        if k <= n {
            let j = k - 1;
            if npt < k + n + 1 {
                // No point on the other side of this coordinate.
                self.bmat[[0, j]] = -1.0 / rhobeg;
                self.bmat[[k, j]] = 1.0 / rhobeg;
                self.bmat[[npt + j, j]] = -0.5 * rhosq;
            }
        } else if k <= 2 * n {
            let j = k - n - 1;
            self.bmat[[k - n, j]] = 0.5 / rhobeg;
            self.bmat[[k, j]] = -0.5 / rhobeg;
            self.zmat[[0, j]] = -reciq - reciq;
            self.zmat[[k - n, j]] = reciq;
            self.zmat[[k, j]] = reciq;
        } else {
            let col = k - n - 1;
            let (ipt, jpt) = self.diagonal_pair(k);
            let ip = if d[ipt] < 0.0 { ipt + n + 1 } else { ipt + 1 };
            let jp = if d[jpt] < 0.0 { jpt + n + 1 } else { jpt + 1 };
            self.zmat[[0, col]] = recip;
            self.zmat[[k, col]] = recip;
            self.zmat[[ip, col]] = -recip;
            self.zmat[[jp, col]] = -recip;
        }
    }

    /// Sign of column `j` of `zmat` in the factorization.
    fn zsign(&self, j: usize) -> f64 {
        if j < self.nneg {
            -1.0
        } else {
            1.0
        }
    }

    /// First `npt` entries of column `k` of `H`, i.e. `Z S Z^T e_k`.
    pub fn omega_column(&self, k: usize) -> Array1<f64> {
        let mut col = Array1::zeros(self.npt);
        for j in 0..self.zmat.ncols() {
            let temp = self.zsign(j) * self.zmat[[k, j]];
            col.scaled_add(temp, &self.zmat.column(j));
        }
        col
    }

    /// Diagonal of `Z S Z^T`.
    pub fn omega_diagonal(&self) -> Array1<f64> {
        let mut diag = Array1::zeros(self.npt);
        for j in 0..self.zmat.ncols() {
            let sign = self.zsign(j);
            for k in 0..self.npt {
                diag[k] += sign * self.zmat[[k, j]].powi(2);
            }
        }
        diag
    }

    /// Values of the Lagrange functions at `xopt + d` and the `beta`
    /// parameter of the updating formula.
    pub fn lagrange_values(&self, d: &Array1<f64>) -> LagrangeValues {
        let n = self.n;
        let npt = self.npt;
        let mut vlag = Array1::zeros(npt + n);

        let xpt_d = self.xpt.dot(d);
        let xpt_xopt = self.xpt.dot(&self.xopt);
        // w_k = (xpt_k . d) (xpt_k . d / 2 + xpt_k . xopt)
        let wcheck: Array1<f64> = xpt_d
            .iter()
            .zip(xpt_xopt.iter())
            .map(|(&a, &b)| a * (0.5 * a + b))
            .collect();
        vlag.slice_mut(s![..npt])
            .assign(&self.bmat.slice(s![..npt, ..]).dot(d));

        let mut beta = 0.0;
        for j in 0..self.zmat.ncols() {
            let zcol = self.zmat.column(j);
            let mut sum = zcol.dot(&wcheck);
            if j < self.nneg {
                beta += sum * sum;
                sum = -sum;
            } else {
                beta -= sum * sum;
            }
            vlag.slice_mut(s![..npt]).scaled_add(sum, &zcol);
        }

        let bw = self.bmat.slice(s![..npt, ..]).t().dot(&wcheck);
        let bx = self.bmat.slice(s![npt.., ..]);
        let mut bsum = 0.0;
        for j in 0..n {
            bsum += bw[j] * d[j];
            let sum = bw[j] + bx.row(j).dot(d);
            vlag[npt + j] = sum;
            bsum += sum * d[j];
        }

        let dot = self.xopt.dot(d);
        let dsq = d.dot(d);
        let xoptsq = self.xopt.dot(&self.xopt);
        beta = dot * dot + dsq * (xoptsq + dot + dot + 0.5 * dsq) + beta - bsum;
        vlag[self.kopt] += 1.0;

        LagrangeValues { vlag, beta }
    }

    /// Denominator of the updating formula if point `knew` is replaced.
    pub fn denominator(&self, values: &LagrangeValues, knew: usize) -> f64 {
        let alpha = self.omega_column(knew)[knew];
        alpha * values.beta + values.vlag[knew].powi(2)
    }

    /// Index of the point farthest from `xopt` if it lies outside `2 * delta`.
    ///
    /// Ties go to the lowest index.
    pub fn farthest_point(&self, delta: f64) -> Option<(usize, f64)> {
        let mut distsq = 4.0 * delta * delta;
        let mut knew = None;
        for (k, row) in self.xpt.axis_iter(Axis(0)).enumerate() {
            let sum = distance_squared(row, &self.xopt);
            if sum > distsq {
                knew = Some(k);
                distsq = sum;
            }
        }
        knew.map(|k| (k, distsq))
    }

    /// Updates `bmat`, `zmat` and `nneg` so that point `knew` can be moved
    /// to the trial point described by `values`.
    ///
    /// The point itself is not moved; call [`replace_point`](Self::replace_point)
    /// once the model has absorbed the change.
    pub fn update(&mut self, values: &LagrangeValues, knew: usize) {
        let n = self.n;
        let npt = self.npt;
        let nptm = self.zmat.ncols();
        let mut vlag = values.vlag.clone();
        let beta = values.beta;

        let ztest = 1.0e-20 * self.zmat.iter().fold(0.0_f64, |m, z| m.max(z.abs()));

        // Rotate so that row knew of zmat has at most two nonzeros: column 0
        // and, when there are columns of both signs, column jl.
        let mut jl = 0;
        for j in 1..nptm {
            if j == self.nneg {
                jl = self.nneg;
            } else if self.zmat[[knew, j]].abs() > ztest {
                let temp = self.zmat[[knew, jl]].hypot(self.zmat[[knew, j]]);
                let tempa = self.zmat[[knew, jl]] / temp;
                let tempb = self.zmat[[knew, j]] / temp;
                for i in 0..npt {
                    let zl = self.zmat[[i, jl]];
                    let zj = self.zmat[[i, j]];
                    self.zmat[[i, j]] = tempa * zj - tempb * zl;
                    self.zmat[[i, jl]] = tempa * zl + tempb * zj;
                }
                self.zmat[[knew, j]] = 0.0;
            }
        }

        let mut w = Array1::zeros(npt + n);
        let mut tempa = self.zmat[[knew, 0]];
        if self.nneg >= 1 {
            tempa = -tempa;
        }
        let tempb = if jl > 0 { self.zmat[[knew, jl]] } else { 0.0 };
        for i in 0..npt {
            w[i] = tempa * self.zmat[[i, 0]];
            if jl > 0 {
                w[i] += tempb * self.zmat[[i, jl]];
            }
        }
        let alpha = w[knew];
        let tau = vlag[knew];
        let tausq = tau * tau;
        let denom = alpha * beta + tausq;
        vlag[knew] -= 1.0;

        let mut swap_first = false;
        if jl == 0 {
            let temp = denom.abs().sqrt();
            let tempb = tempa / temp;
            let tempa = tau / temp;
            for i in 0..npt {
                self.zmat[[i, 0]] = tempa * self.zmat[[i, 0]] - tempb * vlag[i];
            }
            if self.nneg == 0 && denom < 0.0 {
                self.nneg = 1;
            }
            if self.nneg >= 1 && denom >= 0.0 {
                swap_first = true;
            }
        } else {
            let ja = if beta >= 0.0 { jl } else { 0 };
            let jb = jl - ja;
            let temp = self.zmat[[knew, jb]] / denom;
            let tempa = temp * beta;
            let tempb = temp * tau;
            let temp = self.zmat[[knew, ja]];
            let scala = 1.0 / (beta.abs() * temp * temp + tausq).sqrt();
            let scalb = scala * denom.abs().sqrt();
            for i in 0..npt {
                self.zmat[[i, ja]] = scala * (tau * self.zmat[[i, ja]] - temp * vlag[i]);
                self.zmat[[i, jb]] =
                    scalb * (self.zmat[[i, jb]] - tempa * w[i] - tempb * vlag[i]);
            }
            if denom <= 0.0 {
                if beta < 0.0 {
                    self.nneg += 1;
                } else {
                    swap_first = true;
                }
            }
        }

        if swap_first {
            self.nneg -= 1;
            for i in 0..npt {
                self.zmat.swap([i, 0], [i, self.nneg]);
            }
        }

        for j in 0..n {
            let jp = npt + j;
            w[jp] = self.bmat[[knew, j]];
            let tempa = (alpha * vlag[jp] - tau * w[jp]) / denom;
            let tempb = (-beta * w[jp] - tau * vlag[jp]) / denom;
            for i in 0..=jp {
                self.bmat[[i, j]] += tempa * vlag[i] + tempb * w[i];
                if i >= npt {
                    self.bmat[[jp, i - npt]] = self.bmat[[i, j]];
                }
            }
        }
    }

    /// Moves point `knew` to displacement `xnew` with value `f`.
    pub fn replace_point(&mut self, knew: usize, xnew: &Array1<f64>, f: f64) {
        self.xpt.row_mut(knew).assign(xnew);
        self.fval[knew] = f;
    }

    /// Makes point `k` the best point.
    pub fn set_kopt(&mut self, k: usize) {
        self.kopt = k;
        self.xopt.assign(&self.xpt.row(k));
    }

    /// Moves `xbase` to the best point, updating `bmat` and the model so that
    /// both describe the same functions relative to the new base.
    pub fn shift_base(&mut self, model: &mut QuadraticModel) {
        let n = self.n;
        let npt = self.npt;
        let xopt = self.xopt.clone();
        let xoptsq = xopt.dot(&xopt);
        let tempq = 0.25 * xoptsq;

        // Changes to bmat that do not depend on zmat.
        let mut sxpt = Array1::zeros(npt);
        for k in 0..npt {
            let sum = self.xpt.row(k).dot(&xopt);
            let temp = model.pq[k] * sum;
            model.gq.scaled_add(temp, &self.xpt.row(k));
            sxpt[k] = sum - 0.5 * xoptsq;
            self.xpt.row_mut(k).scaled_add(-0.5, &xopt);
            let bk = self.bmat.row(k).to_owned();
            let w = &self.xpt.row(k) * sxpt[k] + &xopt * tempq;
            for i in 0..n {
                for j in 0..=i {
                    self.bmat[[npt + i, j]] += bk[i] * w[j] + w[i] * bk[j];
                }
            }
        }

        // Changes to bmat that depend on zmat.
        for k in 0..self.zmat.ncols() {
            let zcol = self.zmat.column(k).to_owned();
            let sumz = zcol.sum();
            let wz = &sxpt * &zcol;
            let mut yz = self.xpt.t().dot(&wz);
            yz.scaled_add(tempq * sumz, &xopt);
            let sign = self.zsign(k);
            for j in 0..n {
                let sum = sign * yz[j];
                for i in 0..npt {
                    self.bmat[[i, j]] += sum * zcol[i];
                }
            }
            for i in 0..n {
                let temp = sign * yz[i];
                for j in 0..=i {
                    self.bmat[[npt + i, j]] += temp * yz[j];
                }
            }
        }

        // Complete the shift, including the model parameters.
        let w = self.xpt.t().dot(&model.pq);
        for mut row in self.xpt.axis_iter_mut(Axis(0)) {
            row.scaled_add(-0.5, &xopt);
        }
        let hx = model.hq.dot(&xopt);
        model.gq += &hx;
        for i in 0..n {
            for j in 0..n {
                model.hq[[i, j]] += w[i] * xopt[j] + xopt[i] * w[j];
            }
        }
        for j in 0..n {
            for i in 0..j {
                self.bmat[[npt + i, j]] = self.bmat[[npt + j, i]];
            }
        }

        self.xbase += &xopt;
        self.xopt.fill(0.0);
    }
}

/// Squared Euclidean distance between a stored point and `x`.
pub(crate) fn distance_squared(point: ArrayView1<f64>, x: &Array1<f64>) -> f64 {
    point
        .iter()
        .zip(x.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Builds the initial set and model for `f` around `x0`.
    pub(crate) fn build_initial<F>(
        mut f: F,
        x0: Array1<f64>,
        npt: usize,
        rhobeg: f64,
    ) -> (InterpolationSet, QuadraticModel)
    where
        F: FnMut(&Array1<f64>) -> f64,
    {
        let n = x0.len();
        let mut set = InterpolationSet::new(x0, npt);
        let mut model = QuadraticModel::new(n, npt);
        for k in 0..npt {
            let d = set.initial_displacement(k, rhobeg);
            let fx = f(&(set.xbase() + &d));
            set.add_initial_point(k, &d, fx, rhobeg);
            model.add_initial_point(&set, k, rhobeg);
        }
        (set, model)
    }

    /// Largest interpolation error of the model over the set.
    pub(crate) fn interpolation_error(set: &InterpolationSet, model: &QuadraticModel) -> f64 {
        let qopt = model.value(set.xpt(), set.xopt());
        (0..set.npt())
            .map(|k| {
                let xk = set.xpt().row(k).to_owned();
                let q = model.value(set.xpt(), &xk) - qopt;
                (q - (set.fval()[k] - set.fopt())).abs()
            })
            .fold(0.0, f64::max)
    }
}
