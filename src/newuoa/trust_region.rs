//! Radius and acceptance control.
//!
//! This module owns the trust-region radius `delta` and its lower bound
//! `rho`. `delta` adapts after every trust-region step from the agreement
//! between actual and predicted reduction; `rho` only decreases, in discrete
//! steps, until it reaches `rhoend`.

use super::config::ResolvedConfig;

/// Outcome of a trust-region step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Ratio of actual to predicted reduction
    pub ratio: f64,

    /// Whether the trial point improves on the best value
    pub accepted: bool,

    /// Trust-region radius for the next step
    pub delta: f64,

    /// Lower bound on the radius, unchanged by a single step
    pub rho: f64,
}

/// Trust-region radius controller.
#[derive(Debug, Clone)]
pub struct RadiusController {
    /// Current trust-region radius
    delta: f64,

    /// Current lower bound on the radius
    rho: f64,

    /// Final value of `rho`
    rhoend: f64,

    /// Ratio at or below which the radius contracts
    eta1: f64,

    /// Ratio above which the radius may expand
    eta2: f64,

    /// Contraction factor
    gamma1: f64,

    /// Expansion factor
    gamma2: f64,
}

impl RadiusController {
    /// Creates a controller with `delta = rho = rhobeg`.
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            delta: config.rhobeg,
            rho: config.rhobeg,
            rhoend: config.rhoend,
            eta1: config.eta1,
            eta2: config.eta2,
            gamma1: config.gamma1,
            gamma2: config.gamma2,
        }
    }

    /// Current trust-region radius.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Current lower bound on the radius.
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Returns true once `rho` has reached `rhoend`.
    pub fn at_floor(&self) -> bool {
        self.rho <= self.rhoend
    }

    /// Returns true if the radius is at its lower bound.
    pub fn at_rho(&self) -> bool {
        self.delta == self.rho
    }

    /// Calculates the reduction ratio.
    ///
    /// # Arguments
    ///
    /// * `actual_reduction` - `fopt - f` at the trial point
    /// * `predicted_reduction` - Model decrease along the step, positive
    ///
    /// # Returns
    ///
    /// * The ratio of actual to predicted reduction
    pub fn reduction_ratio(actual_reduction: f64, predicted_reduction: f64) -> f64 {
        actual_reduction / predicted_reduction
    }

    /// Updates `delta` after a trust-region step.
    ///
    /// A ratio below `eta1` contracts the radius to a fraction of the step
    /// length, one in `[eta1, eta2)` keeps at least the step length, and one
    /// at or above `eta2` allows growth to a multiple of the step length. A
    /// radius within `1.5 * rho` snaps to `rho`.
    ///
    /// # Arguments
    ///
    /// * `actual_reduction` - `fopt - f` at the trial point
    /// * `predicted_reduction` - Model decrease along the step, positive
    /// * `step_norm` - Length of the step, at most `delta`
    pub fn decide(
        &mut self,
        actual_reduction: f64,
        predicted_reduction: f64,
        step_norm: f64,
    ) -> Decision {
        let ratio = Self::reduction_ratio(actual_reduction, predicted_reduction);
        self.delta = if ratio < self.eta1 {
            self.gamma1 * step_norm
        } else if ratio < self.eta2 {
            (self.gamma1 * self.delta).max(step_norm)
        } else {
            (self.gamma1 * self.delta).max(self.gamma2 * step_norm)
        };
        self.snap_to_rho();

        Decision {
            ratio,
            accepted: actual_reduction > 0.0,
            delta: self.delta,
            rho: self.rho,
        }
    }

    /// Contracts the radius after a step too short to be worth evaluating.
    pub fn shrink_after_short_step(&mut self) {
        self.delta *= 0.1;
        self.snap_to_rho();
    }

    /// Lowers `rho` towards `rhoend` and resets `delta` accordingly.
    ///
    /// `rho` drops by a factor of ten while it is far from `rhoend`, by the
    /// square root of the remaining ratio when it is within a factor of 250,
    /// and straight to `rhoend` when within a factor of 16.
    ///
    /// # Returns
    ///
    /// * The new value of `rho`
    pub fn reduce_rho(&mut self) -> f64 {
        self.delta = 0.5 * self.rho;
        let ratio = self.rho / self.rhoend;
        self.rho = if ratio <= 16.0 {
            self.rhoend
        } else if ratio <= 250.0 {
            ratio.sqrt() * self.rhoend
        } else {
            0.1 * self.rho
        };
        self.delta = self.delta.max(self.rho);
        self.rho
    }

    fn snap_to_rho(&mut self) {
        if self.delta <= 1.5 * self.rho {
            self.delta = self.rho;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::config::NewuoaConfig;
    use super::*;
    use approx::assert_relative_eq;

    fn controller(rhobeg: f64, rhoend: f64) -> RadiusController {
        let config = NewuoaConfig {
            rhobeg: Some(rhobeg),
            rhoend: Some(rhoend),
            ..Default::default()
        }
        .resolve(2)
        .unwrap();
        RadiusController::new(&config)
    }

    #[test]
    fn test_poor_ratio_contracts() {
        let mut tr = controller(1.0, 1e-6);
        tr.reduce_rho();
        tr.reduce_rho();
        let rho = tr.rho();
        assert_relative_eq!(rho, 0.01);

        tr.delta = 1.0;
        let decision = tr.decide(-0.5, 1.0, 0.8);
        assert!(!decision.accepted);
        assert_relative_eq!(decision.ratio, -0.5);
        assert_relative_eq!(decision.delta, 0.4);
    }

    #[test]
    fn test_moderate_ratio_keeps_step_length() {
        let mut tr = controller(1.0, 1e-6);
        tr.reduce_rho();
        tr.reduce_rho();
        tr.delta = 1.0;
        let decision = tr.decide(0.5, 1.0, 0.8);
        assert!(decision.accepted);
        assert_relative_eq!(decision.delta, 0.8);

        let decision = tr.decide(0.5, 1.0, 0.1);
        assert_relative_eq!(decision.delta, 0.4);
    }

    #[test]
    fn test_ratio_at_thresholds() {
        let mut tr = controller(1.0, 1e-6);
        tr.reduce_rho();
        tr.reduce_rho();

        // Exactly eta1 is a moderate ratio, not a poor one.
        tr.delta = 1.0;
        let decision = tr.decide(0.1, 1.0, 0.8);
        assert_eq!(decision.ratio, 0.1);
        assert_relative_eq!(decision.delta, 0.8);

        // Exactly eta2 is a good ratio.
        tr.delta = 1.0;
        let decision = tr.decide(0.7, 1.0, 1.0);
        assert_eq!(decision.ratio, 0.7);
        assert_relative_eq!(decision.delta, 2.0);
    }

    #[test]
    fn test_good_ratio_expands() {
        let mut tr = controller(1.0, 1e-6);
        tr.reduce_rho();
        tr.reduce_rho();
        tr.delta = 1.0;
        let decision = tr.decide(0.9, 1.0, 1.0);
        assert_relative_eq!(decision.delta, 2.0);
    }

    #[test]
    fn test_small_radius_snaps_to_rho() {
        let mut tr = controller(1.0, 1e-6);
        let decision = tr.decide(0.0, 1.0, 1.0);
        assert_eq!(decision.delta, 1.0);
        assert!(tr.at_rho());

        tr.shrink_after_short_step();
        assert_eq!(tr.delta(), 1.0);
    }

    #[test]
    fn test_rho_reduction_schedule() {
        let mut tr = controller(1.0, 1e-6);
        let mut schedule = Vec::new();
        let mut previous = tr.rho();
        while !tr.at_floor() {
            let rho = tr.reduce_rho();
            assert!(rho < previous);
            assert!(tr.delta() >= rho);
            schedule.push(rho);
            previous = rho;
        }
        assert_eq!(*schedule.last().unwrap(), 1e-6);
        // 1 -> 0.1 -> 0.01 -> 1e-3 -> 1e-4 -> 1e-5 -> 1e-6
        assert_eq!(schedule.len(), 6);
        assert_relative_eq!(schedule[3], 1e-4, max_relative = 1e-12);
        assert_relative_eq!(schedule[4], 1e-5, max_relative = 1e-12);
    }

    #[test]
    fn test_delta_after_rho_reduction() {
        let mut tr = controller(1.0, 0.1);
        assert_eq!(tr.reduce_rho(), 0.1);
        assert_eq!(tr.delta(), 0.5);
        assert!(tr.at_floor());
    }
}
