//! Implementation of the NEWUOA driver.
//!
//! This module ties the interpolation set, the quadratic model, the
//! trust-region solver and the radius controller together in an explicit
//! state machine, and exposes the result of a run as a [`NewuoaResult`].

use log::{debug, info, trace, warn};
use ndarray::Array1;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;

use crate::error::Result;
use crate::problem::{is_nan_or_posinf, Objective};

use super::config::{NewuoaConfig, ResolvedConfig, Verbosity};
use super::geometry::{choose_replacement, lagrange_step, maximize_denominator, Replacement};
use super::history::History;
use super::interpolation::{InterpolationSet, LagrangeValues};
use super::model::QuadraticModel;
use super::status::ExitStatus;
use super::step::solve_trust_region;
use super::trust_region::RadiusController;

/// Control flow of a run: `Err` carries the status that ends it.
type Flow<T> = std::result::Result<T, ExitStatus>;

/// Snapshot passed to the progress callback.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// Problem dimension
    pub n: usize,

    /// Best point found so far
    pub x: &'a Array1<f64>,

    /// Objective value at `x`
    pub f: f64,

    /// Number of objective evaluations so far
    pub nf: usize,

    /// Index of the trust-region iteration that just completed, from 1
    pub tr: usize,
}

/// Answer of the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Keep iterating.
    Continue,

    /// End the run with [`ExitStatus::CallbackTerminate`].
    Stop,
}

/// Result of a NEWUOA run.
#[derive(Debug, Clone, Serialize)]
pub struct NewuoaResult {
    /// Best point found
    pub x: Array1<f64>,

    /// Objective value at `x`
    pub f: f64,

    /// Number of objective evaluations
    pub nf: usize,

    /// Number of trust-region iterations
    pub tr_iterations: usize,

    /// Why the run ended
    pub status: ExitStatus,

    /// A message describing the result
    pub message: String,

    /// Whether the run converged or met its target
    pub success: bool,

    /// The most recent evaluations, at most `maxhist` of them
    pub history: History,
}

impl fmt::Display for NewuoaResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Status: {} ({})", self.message, self.status.code())?;
        writeln!(f, "  Objective: {:.6e}", self.f)?;
        writeln!(f, "  Trust-region iterations: {}", self.tr_iterations)?;
        writeln!(f, "  Function evaluations: {}", self.nf)?;
        writeln!(f, "  Point: {:?}", self.x)?;
        Ok(())
    }
}

/// The NEWUOA optimizer.
#[derive(Debug, Clone, Default)]
pub struct Newuoa {
    /// Configuration options
    config: NewuoaConfig,
}

impl Newuoa {
    /// Create a new optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new optimizer with the given configuration.
    pub fn with_config(config: NewuoaConfig) -> Self {
        Self { config }
    }

    /// The configuration options.
    pub fn config(&self) -> &NewuoaConfig {
        &self.config
    }

    /// Set the initial trust-region radius.
    pub fn with_rhobeg(mut self, rhobeg: f64) -> Self {
        self.config.rhobeg = Some(rhobeg);
        self
    }

    /// Set the final trust-region radius.
    pub fn with_rhoend(mut self, rhoend: f64) -> Self {
        self.config.rhoend = Some(rhoend);
        self
    }

    /// Set the maximum number of objective evaluations.
    pub fn with_maxfun(mut self, maxfun: usize) -> Self {
        self.config.maxfun = Some(maxfun);
        self
    }

    /// Set the number of interpolation points.
    pub fn with_npt(mut self, npt: usize) -> Self {
        self.config.npt = Some(npt);
        self
    }

    /// Set the target objective value.
    pub fn with_ftarget(mut self, ftarget: f64) -> Self {
        self.config.ftarget = Some(ftarget);
        self
    }

    /// Set the maximum number of history entries.
    pub fn with_maxhist(mut self, maxhist: usize) -> Self {
        self.config.maxhist = Some(maxhist);
        self
    }

    /// Set the reduction-ratio thresholds for contraction and expansion.
    pub fn with_eta(mut self, eta1: f64, eta2: f64) -> Self {
        self.config.eta1 = eta1;
        self.config.eta2 = eta2;
        self
    }

    /// Set the contraction and expansion factors of the trust region.
    pub fn with_gamma(mut self, gamma1: f64, gamma2: f64) -> Self {
        self.config.gamma1 = gamma1;
        self.config.gamma2 = gamma2;
        self
    }

    /// Set the logging verbosity.
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.config.verbosity = verbosity;
        self
    }

    /// Minimize the objective starting from `x0`.
    ///
    /// # Arguments
    ///
    /// * `objective` - The function to minimize
    /// * `x0` - Starting point; it is copied, never modified
    ///
    /// # Returns
    ///
    /// * `Result<NewuoaResult>` - The result of the run, or a validation
    ///   error if the options do not fit the problem. A validation error
    ///   consumes no evaluations.
    pub fn minimize<O>(&self, objective: &mut O, x0: &Array1<f64>) -> Result<NewuoaResult>
    where
        O: Objective + ?Sized,
    {
        self.minimize_with_callback(objective, x0, |_: &Progress<'_>| {
            CallbackAction::Continue
        })
    }

    /// Minimize the objective, reporting progress after every trust-region iteration.
    ///
    /// # Arguments
    ///
    /// * `objective` - The function to minimize
    /// * `x0` - Starting point; it is copied, never modified
    /// * `callback` - Called once per trust-region iteration; returning
    ///   [`CallbackAction::Stop`] ends the run with
    ///   [`ExitStatus::CallbackTerminate`]
    ///
    /// # Returns
    ///
    /// * `Result<NewuoaResult>` - The result of the run
    pub fn minimize_with_callback<O, C>(
        &self,
        objective: &mut O,
        x0: &Array1<f64>,
        callback: C,
    ) -> Result<NewuoaResult>
    where
        O: Objective + ?Sized,
        C: FnMut(&Progress<'_>) -> CallbackAction,
    {
        let config = self.config.resolve(x0.len())?;
        let x0 = sanitize_start(x0);
        let mut solver = Solver::new(&config, objective, x0.clone(), callback);
        let status = match solver.drive() {
            Ok(never) => match never {},
            Err(status) => status,
        };
        Ok(solver.into_result(status, x0))
    }
}

/// Copy of `x0` with NaN replaced by zero and infinities by the largest finite values.
fn sanitize_start(x0: &Array1<f64>) -> Array1<f64> {
    x0.mapv(|v| {
        if v.is_nan() {
            0.0
        } else if v == f64::INFINITY {
            f64::MAX
        } else if v == f64::NEG_INFINITY {
            -f64::MAX
        } else {
            v
        }
    })
}

/// Wraps the objective with the evaluation counter, the history and the
/// best point seen.
struct Evaluator<'o, O: ?Sized> {
    objective: &'o mut O,
    nf: usize,
    maxfun: usize,
    ftarget: f64,
    history: History,
    best: Option<(Array1<f64>, f64)>,
    log_evaluations: bool,
}

impl<'o, O> Evaluator<'o, O>
where
    O: Objective + ?Sized,
{
    fn new(objective: &'o mut O, config: &ResolvedConfig) -> Self {
        Self {
            objective,
            nf: 0,
            maxfun: config.maxfun,
            ftarget: config.ftarget,
            history: History::new(config.maxhist),
            best: None,
            log_evaluations: config.verbosity >= Verbosity::Fevl,
        }
    }

    /// Evaluates the objective at `x`.
    ///
    /// A point with a non-finite entry is rejected without an evaluation.
    /// Otherwise the evaluation is counted and recorded, and then checked
    /// against the fatal values, the target and the budget, in that order.
    fn evaluate(&mut self, x: &Array1<f64>) -> Flow<f64> {
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ExitStatus::NanInfX);
        }

        let f = self.objective.eval(x);
        self.nf += 1;
        self.history.record(x, f);
        let better = match &self.best {
            None => true,
            Some((_, fbest)) => f < *fbest || (fbest.is_nan() && !f.is_nan()),
        };
        if better {
            self.best = Some((x.clone(), f));
        }
        if self.log_evaluations {
            trace!("evaluation {}: f = {:.10e} at {:?}", self.nf, f, x);
        }

        if is_nan_or_posinf(f) {
            return Err(ExitStatus::NanInfF);
        }
        if f <= self.ftarget {
            return Err(ExitStatus::FtargetAchieved);
        }
        if self.nf >= self.maxfun {
            return Err(ExitStatus::MaxfunReached);
        }
        Ok(f)
    }
}

/// An evaluated trust-region trial point.
struct TrialPoint {
    /// Displacement of the trial point from `xbase`
    xnew: Array1<f64>,
    /// Objective value at the trial point
    f: f64,
    /// `fopt` before the trial point was evaluated
    fsave: f64,
    /// Predicted change of the model, negative
    vquad: f64,
}

impl TrialPoint {
    /// Interpolation error of the model at the trial point.
    fn model_error(&self) -> f64 {
        self.f - self.fsave - self.vquad
    }
}

/// Stages of the driver loop.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Compute and try a trust-region step.
    TrustRegion,

    /// Move point `knew` by a step of length `dstep` to improve the geometry.
    Geometry { knew: usize, dstep: f64 },

    /// Decide between a geometry step, another trust-region step and a
    /// reduction of `rho`.
    CheckGeometry,

    /// Lower `rho`, or finish if it is already at `rhoend`.
    ReduceRho,

    /// `rho` has reached `rhoend`.
    Finish,
}

/// State of one run.
struct Solver<'o, O: ?Sized, C> {
    config: ResolvedConfig,
    eval: Evaluator<'o, O>,
    callback: C,
    set: InterpolationSet,
    model: QuadraticModel,
    radius: RadiusController,

    /// Reduction ratio of the last trust-region step
    ratio: f64,
    /// Length of the last trust-region step
    dnorm: f64,
    /// Curvature estimate of the last trust-region step
    crvmin: f64,
    /// Moduli of the last three model errors, newest first
    diffs: [f64; 3],
    /// Evaluation count when the last long step was taken or rho was reduced
    nfsav: usize,
    /// Consecutive tests where the least-Frobenius gradient was much smaller
    itest: usize,
    /// A step too short to evaluate, tried once more at the end of the run
    short_step: Option<Array1<f64>>,
    tr_iterations: usize,
}

impl<'o, O, C> Solver<'o, O, C>
where
    O: Objective + ?Sized,
    C: FnMut(&Progress<'_>) -> CallbackAction,
{
    fn new(config: &ResolvedConfig, objective: &'o mut O, x0: Array1<f64>, callback: C) -> Self {
        let n = config.n;
        Self {
            config: config.clone(),
            eval: Evaluator::new(objective, config),
            callback,
            set: InterpolationSet::new(x0, config.npt),
            model: QuadraticModel::new(n, config.npt),
            radius: RadiusController::new(config),
            ratio: 1.0,
            dnorm: 0.0,
            crvmin: 0.0,
            diffs: [0.0; 3],
            nfsav: 0,
            itest: 0,
            short_step: None,
            tr_iterations: 0,
        }
    }

    fn logs(&self, level: Verbosity) -> bool {
        self.config.verbosity >= level
    }

    /// Runs the state machine until a terminal status is reached.
    fn drive(&mut self) -> Flow<Infallible> {
        self.initialize()?;
        let mut phase = Phase::TrustRegion;
        loop {
            phase = match phase {
                Phase::TrustRegion => self.trust_region_step()?,
                Phase::Geometry { knew, dstep } => self.geometry_step(knew, dstep)?,
                Phase::CheckGeometry => self.check_geometry(),
                Phase::ReduceRho => self.reduce_rho(),
                Phase::Finish => return Err(self.finish()),
            };
        }
    }

    /// Evaluates the initial points and builds the initial model.
    fn initialize(&mut self) -> Flow<()> {
        let rhobeg = self.config.rhobeg;
        for k in 0..self.config.npt {
            let d = self.set.initial_displacement(k, rhobeg);
            let x = self.set.xbase() + &d;
            let f = self.eval.evaluate(&x)?;
            self.set.add_initial_point(k, &d, f, rhobeg);
            self.model.add_initial_point(&self.set, k, rhobeg);
        }
        if !self.model.is_finite() {
            return Err(ExitStatus::NanInfModel);
        }
        self.nfsav = self.eval.nf;
        if self.logs(Verbosity::Rho) {
            info!(
                "initial model built from {} points: rho = {:.3e}, fopt = {:.10e}",
                self.config.npt,
                self.radius.rho(),
                self.set.fopt()
            );
        }
        Ok(())
    }

    /// Calls the progress callback after a trust-region iteration.
    fn checkpoint(&mut self) -> Flow<()> {
        let (x, f) = match &self.eval.best {
            Some((x, f)) => (x, *f),
            None => (self.set.xbase(), f64::NAN),
        };
        let progress = Progress {
            n: self.config.n,
            x,
            f,
            nf: self.eval.nf,
            tr: self.tr_iterations,
        };
        match (self.callback)(&progress) {
            CallbackAction::Continue => Ok(()),
            CallbackAction::Stop => Err(ExitStatus::CallbackTerminate),
        }
    }

    fn record_model_error(&mut self, diff: f64) {
        self.diffs = [diff.abs(), self.diffs[0], self.diffs[1]];
    }

    /// Moves the base point to `xopt` if the step is small compared with `|xopt|`.
    fn maybe_shift_base(&mut self, dsq: f64) {
        let xoptsq = self.set.xopt().dot(self.set.xopt());
        if dsq <= 1.0e-3 * xoptsq {
            if self.logs(Verbosity::Fevl) {
                debug!("shifting the base point by {:.3e}", xoptsq.sqrt());
            }
            self.set.shift_base(&mut self.model);
        }
    }

    fn trust_region_step(&mut self) -> Flow<Phase> {
        if self.tr_iterations >= self.config.maxtr {
            return Err(ExitStatus::MaxtrReached);
        }
        self.tr_iterations += 1;
        self.short_step = None;
        if !self.model.is_finite() {
            return Err(ExitStatus::NanInfModel);
        }

        let delta = self.radius.delta();
        let rho = self.radius.rho();
        let trs = solve_trust_region(&self.set, &self.model, delta);
        let d = trs.step;
        let dsq = d.dot(&d);
        self.dnorm = delta.min(dsq.sqrt());
        self.crvmin = trs.crvmin;

        if self.dnorm < 0.5 * rho {
            self.short_step = Some(d);
            self.radius.shrink_after_short_step();
            self.ratio = -1.0;
            let worst_error = self.diffs.iter().cloned().fold(0.0, f64::max);
            let next = if self.eval.nf <= self.nfsav + 2
                || 0.125 * self.crvmin * rho * rho <= worst_error
            {
                Phase::CheckGeometry
            } else {
                Phase::ReduceRho
            };
            if self.logs(Verbosity::Fevl) {
                debug!(
                    "tr {}: short step {:.3e} < rho / 2, delta = {:.3e}",
                    self.tr_iterations,
                    self.dnorm,
                    self.radius.delta()
                );
            }
            self.checkpoint()?;
            return Ok(next);
        }

        self.maybe_shift_base(dsq);
        let vquad = self.model.change(self.set.xpt(), self.set.xopt(), &d);
        if !(vquad < 0.0) {
            return Err(ExitStatus::TrsubpFailed);
        }

        let xnew = self.set.xopt() + &d;
        let f = self.eval.evaluate(&(self.set.xbase() + &xnew))?;
        let fsave = self.set.fopt();
        let trial = TrialPoint {
            xnew,
            f,
            fsave,
            vquad,
        };
        self.record_model_error(trial.model_error());
        if self.dnorm > rho {
            self.nfsav = self.eval.nf;
        }

        let decision = self.radius.decide(fsave - f, -vquad, self.dnorm);
        self.ratio = decision.ratio;
        if self.logs(Verbosity::Fevl) {
            debug!(
                "tr {}: rho = {:.3e}, delta = {:.3e}, ratio = {:.3e}, fopt = {:.10e}, nf = {}",
                self.tr_iterations,
                decision.rho,
                decision.delta,
                decision.ratio,
                fsave.min(f),
                self.eval.nf
            );
        }

        let values = self.set.lagrange_values(&d);
        let center = if decision.accepted {
            &trial.xnew
        } else {
            self.set.xopt()
        };
        let choice = choose_replacement(
            &self.set,
            &values,
            decision.accepted,
            center,
            decision.delta,
            decision.rho,
        );
        let next = self.absorb_trial(choice, &values, &trial)?;
        self.checkpoint()?;
        Ok(next)
    }

    /// Acts on the replacement chosen for an evaluated trust-region trial point.
    ///
    /// # Returns
    ///
    /// * The next phase: another trust-region step if the trial point was
    ///   taken and reduced `f` by a tenth of the predicted amount, a geometry
    ///   step if the updating denominator was not trusted, and a geometry
    ///   check otherwise
    fn absorb_trial(
        &mut self,
        choice: Replacement,
        values: &LagrangeValues,
        trial: &TrialPoint,
    ) -> Flow<Phase> {
        match choice {
            Replacement::Point(knew) => {
                self.replace(knew, values, &trial.xnew, trial.f, trial.model_error())?;
                if self.radius.at_rho() {
                    self.test_model_gradient();
                }
                if trial.f <= trial.fsave + 0.1 * trial.vquad {
                    Ok(Phase::TrustRegion)
                } else {
                    Ok(Phase::CheckGeometry)
                }
            }
            Replacement::Keep => Ok(Phase::CheckGeometry),
            Replacement::IllConditioned(knew) => {
                if self.logs(Verbosity::Exit) {
                    warn!(
                        "skipping the replacement of point {}: updating denominator too small",
                        knew
                    );
                }
                Ok(self.forced_geometry())
            }
        }
    }

    /// Geometry step for the point farthest from `xopt`, at any distance.
    fn forced_geometry(&self) -> Phase {
        match self.set.farthest_point(0.0) {
            Some((knew, distsq)) => Phase::Geometry {
                knew,
                dstep: self.geometry_step_length(distsq),
            },
            None => Phase::CheckGeometry,
        }
    }

    fn geometry_step_length(&self, distsq: f64) -> f64 {
        let delta = self.radius.delta();
        (0.1 * distsq.sqrt())
            .min(0.5 * delta)
            .max(self.radius.rho())
    }

    fn geometry_step(&mut self, knew: usize, dstep: f64) -> Flow<Phase> {
        self.short_step = None;
        self.maybe_shift_base(dstep * dstep);

        let geo = lagrange_step(&self.set, knew, dstep);
        let mut d = geo.step;
        let mut values = self.set.lagrange_values(&d);
        let cancellation = 1.0 + geo.alpha * values.beta / values.vlag[knew].powi(2);
        if cancellation.abs() <= 0.8 {
            d = maximize_denominator(&self.set, knew, d);
            values = self.set.lagrange_values(&d);
        }
        if !self.set.denominator(&values, knew).is_finite() {
            return Err(ExitStatus::NanInfModel);
        }

        let vquad = self.model.change(self.set.xpt(), self.set.xopt(), &d);
        let xnew = self.set.xopt() + &d;
        let f = self.eval.evaluate(&(self.set.xbase() + &xnew))?;
        let diff = f - self.set.fopt() - vquad;
        self.record_model_error(diff);
        if dstep > self.radius.rho() {
            self.nfsav = self.eval.nf;
        }
        if self.logs(Verbosity::Fevl) {
            debug!(
                "geometry step for point {}: |d| = {:.3e}, f = {:.10e}",
                knew, dstep, f
            );
        }

        self.replace(knew, &values, &xnew, f, diff)?;
        Ok(Phase::TrustRegion)
    }

    /// Replaces point `knew` by `xnew`, updating the conditioning structure and the model.
    fn replace(
        &mut self,
        knew: usize,
        values: &LagrangeValues,
        xnew: &Array1<f64>,
        f: f64,
        diff: f64,
    ) -> Flow<()> {
        let fopt = self.set.fopt();
        self.set.update(values, knew);
        self.model.absorb_replacement(&self.set, knew, diff);
        self.set.replace_point(knew, xnew, f);
        if f < fopt {
            self.set.set_kopt(knew);
        }
        if self.model.is_finite() {
            Ok(())
        } else {
            Err(ExitStatus::NanInfModel)
        }
    }

    /// Replaces the model by the least-Frobenius-norm interpolant when its
    /// gradient has been much smaller than the model's for three
    /// consecutive trust-region steps at `delta == rho` with little change
    /// in the objective.
    fn test_model_gradient(&mut self) {
        if self.ratio.abs() > 0.01 {
            self.itest = 0;
            return;
        }
        let alternative = QuadraticModel::least_frobenius(&self.set);
        let xpt = self.set.xpt();
        let xopt = self.set.xopt();
        let gopt = self.model.gradient_at(xpt, xopt);
        let galt = alternative.gradient_at(xpt, xopt);
        self.itest += 1;
        if gopt.dot(&gopt) < 100.0 * galt.dot(&galt) {
            self.itest = 0;
        }
        if self.itest >= 3 {
            if self.logs(Verbosity::Fevl) {
                debug!("replacing the model by the least Frobenius norm interpolant");
            }
            self.model = alternative;
            self.itest = 0;
        }
    }

    fn check_geometry(&mut self) -> Phase {
        let delta = self.radius.delta();
        if let Some((knew, distsq)) = self.set.farthest_point(delta) {
            return Phase::Geometry {
                knew,
                dstep: self.geometry_step_length(distsq),
            };
        }
        if self.ratio > 0.0 || delta.max(self.dnorm) > self.radius.rho() {
            Phase::TrustRegion
        } else {
            Phase::ReduceRho
        }
    }

    fn reduce_rho(&mut self) -> Phase {
        if self.radius.at_floor() {
            return Phase::Finish;
        }
        let rho = self.radius.reduce_rho();
        self.nfsav = self.eval.nf;
        if self.logs(Verbosity::Rho) {
            info!(
                "rho reduced to {:.3e}: nf = {}, fopt = {:.10e}",
                rho,
                self.eval.nf,
                self.set.fopt()
            );
        }
        Phase::TrustRegion
    }

    /// Tries a pending short step once, then ends the run.
    fn finish(&mut self) -> ExitStatus {
        let Some(d) = self.short_step.take() else {
            return ExitStatus::SmallTrRadius;
        };
        if self.eval.nf >= self.config.maxfun {
            return ExitStatus::SmallTrRadius;
        }
        let x = self.set.xbase() + self.set.xopt() + &d;
        match self.eval.evaluate(&x) {
            Ok(_) | Err(ExitStatus::MaxfunReached) => ExitStatus::SmallTrRadius,
            Err(status) => status,
        }
    }

    fn into_result(self, status: ExitStatus, x0: Array1<f64>) -> NewuoaResult {
        let (x, f) = self.eval.best.unwrap_or((x0, f64::NAN));
        if self.config.verbosity >= Verbosity::Exit {
            info!(
                "NEWUOA finished: {} (nf = {}, f = {:.10e})",
                status.message(),
                self.eval.nf,
                f
            );
        }
        NewuoaResult {
            x,
            f,
            nf: self.eval.nf,
            tr_iterations: self.tr_iterations,
            status,
            message: status.message().to_string(),
            success: status.is_success(),
            history: self.eval.history,
        }
    }
}
