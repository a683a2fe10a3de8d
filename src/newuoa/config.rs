//! Configuration options for the NEWUOA algorithm.
//!
//! This module defines the user-facing options, their defaults, and the
//! validation that turns them into an immutable [`ResolvedConfig`] for a
//! problem of a given dimension. Nothing here consumes objective evaluations.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{NewuoaError, Result};

/// Default evaluation budget per variable.
pub const MAXFUN_DIM_DFT: usize = 500;

/// Default initial trust-region radius.
pub const RHOBEG_DFT: f64 = 1.0;

/// Default final trust-region radius.
pub const RHOEND_DFT: f64 = 1.0e-6;

/// Cap on trust-region iterations per allowed evaluation.
pub const MAXTR_PER_MAXFUN: usize = 2;

/// Memory ceiling in bytes for the history buffers of one run.
pub const MAX_HISTORY_MEMORY: usize = 2 * 1024 * 1024 * 1024;

/// Memory ceiling in bytes for the interpolation set, model and conditioning
/// structure of one run.
pub const MAX_WORKSPACE_MEMORY: usize = 2 * 1024 * 1024 * 1024;

/// How much progress information the solver emits through the `log` facade.
///
/// The level never changes the iterates, only what is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verbosity {
    /// Nothing is logged.
    None,

    /// A summary is logged when the run ends.
    Exit,

    /// Additionally log every reduction of `rho`.
    Rho,

    /// Additionally log every objective evaluation and trust-region iteration.
    Fevl,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::None
    }
}

/// Configuration options for the NEWUOA algorithm.
///
/// Options whose default depends on the problem dimension (or on another
/// option) are `Option`s; `None` means "use the default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewuoaConfig {
    /// Initial trust-region radius. Default: 1, or `max(1, 10 * rhoend)` when only `rhoend` is given
    pub rhobeg: Option<f64>,

    /// Final trust-region radius. Default: 1e-6, or `min(1e-6, rhobeg / 10)` when only `rhobeg` is given
    pub rhoend: Option<f64>,

    /// Maximum number of objective evaluations. Default: 500 * n
    pub maxfun: Option<usize>,

    /// Number of interpolation points. Default: 2 * n + 1
    pub npt: Option<usize>,

    /// Stop as soon as a value at or below this target is sampled. Default: none (-inf)
    pub ftarget: Option<f64>,

    /// Reduction ratio below which the trust region contracts. Default: 0.1
    pub eta1: f64,

    /// Reduction ratio above which the trust region may expand. Default: 0.7
    pub eta2: f64,

    /// Contraction factor of the trust region. Default: 0.5
    pub gamma1: f64,

    /// Expansion factor of the trust region. Default: 2.0
    pub gamma2: f64,

    /// Maximum number of history entries kept. Default: maxfun
    pub maxhist: Option<usize>,

    /// Logging verbosity. Default: None
    pub verbosity: Verbosity,
}

impl Default for NewuoaConfig {
    fn default() -> Self {
        Self {
            rhobeg: None,
            rhoend: None,
            maxfun: None,
            npt: None,
            ftarget: None,
            eta1: 0.1,
            eta2: 0.7,
            gamma1: 0.5,
            gamma2: 2.0,
            maxhist: None,
            verbosity: Verbosity::default(),
        }
    }
}

/// Fully validated options for a problem of dimension `n`.
///
/// Produced by [`NewuoaConfig::resolve`]; a run never changes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ResolvedConfig {
    /// Problem dimension
    pub n: usize,
    /// Initial trust-region radius
    pub rhobeg: f64,
    /// Final trust-region radius
    pub rhoend: f64,
    /// Maximum number of objective evaluations
    pub maxfun: usize,
    /// Maximum number of trust-region iterations, `2 * maxfun`
    pub maxtr: usize,
    /// Number of interpolation points
    pub npt: usize,
    /// Target objective value
    pub ftarget: f64,
    /// Contraction threshold of the reduction ratio
    pub eta1: f64,
    /// Expansion threshold of the reduction ratio
    pub eta2: f64,
    /// Contraction factor
    pub gamma1: f64,
    /// Expansion factor
    pub gamma2: f64,
    /// Capacity of the history buffers
    pub maxhist: usize,
    /// Logging verbosity
    pub verbosity: Verbosity,
}

impl NewuoaConfig {
    /// Serialize the configuration to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a configuration from a JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Fill in the defaults for a problem of dimension `n` and validate the result.
    ///
    /// # Errors
    ///
    /// * `NewuoaError::DimensionMismatch` if `n == 0`
    /// * `NewuoaError::InvalidParameter` for radii, thresholds or budgets out of range
    /// * `NewuoaError::InvalidNpt` if `npt` is outside `[n+2, (n+1)(n+2)/2]`
    /// * `NewuoaError::MemoryAllocation` if the working storage exceeds the ceiling
    pub fn resolve(&self, n: usize) -> Result<ResolvedConfig> {
        if n == 0 {
            return Err(NewuoaError::DimensionMismatch(
                "the starting point must have at least one variable".to_string(),
            ));
        }

        let (rhobeg, rhoend) = match (self.rhobeg, self.rhoend) {
            (None, None) => (RHOBEG_DFT, RHOEND_DFT),
            (Some(rhobeg), None) => (rhobeg, (0.1 * rhobeg).min(RHOEND_DFT).max(f64::EPSILON)),
            (None, Some(rhoend)) => ((10.0 * rhoend).max(RHOBEG_DFT), rhoend),
            (Some(rhobeg), Some(rhoend)) => (rhobeg, rhoend),
        };
        if !(rhobeg.is_finite() && rhobeg > 0.0) {
            return Err(NewuoaError::InvalidParameter(format!(
                "rhobeg must be finite and positive, got {}",
                rhobeg
            )));
        }
        if !(rhoend.is_finite() && rhoend > 0.0) {
            return Err(NewuoaError::InvalidParameter(format!(
                "rhoend must be finite and positive, got {}",
                rhoend
            )));
        }
        if rhoend > rhobeg {
            return Err(NewuoaError::InvalidParameter(format!(
                "rhoend ({}) must not exceed rhobeg ({})",
                rhoend, rhobeg
            )));
        }

        let maxfun = match self.maxfun {
            Some(maxfun) => maxfun,
            None => MAXFUN_DIM_DFT.checked_mul(n).ok_or_else(|| {
                NewuoaError::InvalidParameter(format!("default maxfun overflows for n = {}", n))
            })?,
        };
        if maxfun == 0 {
            return Err(NewuoaError::InvalidParameter(
                "maxfun must be at least 1".to_string(),
            ));
        }

        let npt_min = n + 2;
        let npt_max = (n + 1) * (n + 2) / 2;
        let npt = self.npt.unwrap_or(2 * n + 1);
        if npt < npt_min || npt > npt_max {
            return Err(NewuoaError::InvalidNpt {
                npt,
                min: npt_min,
                max: npt_max,
            });
        }

        let ftarget = self.ftarget.unwrap_or(f64::NEG_INFINITY);
        if ftarget.is_nan() {
            return Err(NewuoaError::InvalidParameter(
                "ftarget must not be NaN".to_string(),
            ));
        }

        if !(self.eta1 > 0.0 && self.eta1 <= self.eta2 && self.eta2 < 1.0) {
            return Err(NewuoaError::InvalidParameter(format!(
                "expected 0 < eta1 <= eta2 < 1, got eta1 = {}, eta2 = {}",
                self.eta1, self.eta2
            )));
        }
        if !(self.gamma1 > 0.0 && self.gamma1 < 1.0 && self.gamma2 > 1.0 && self.gamma2.is_finite())
        {
            return Err(NewuoaError::InvalidParameter(format!(
                "expected 0 < gamma1 < 1 < gamma2, got gamma1 = {}, gamma2 = {}",
                self.gamma1, self.gamma2
            )));
        }

        let workspace = workspace_bytes(n, npt).ok_or_else(|| {
            NewuoaError::MemoryAllocation(format!("workspace size overflows for n = {}", n))
        })?;
        if workspace > MAX_WORKSPACE_MEMORY {
            return Err(NewuoaError::MemoryAllocation(format!(
                "n = {} and npt = {} need {} bytes of workspace, the ceiling is {}",
                n, npt, workspace, MAX_WORKSPACE_MEMORY
            )));
        }

        let maxhist = self.maxhist.unwrap_or(maxfun).min(maxfun);
        let maxhist_mem = MAX_HISTORY_MEMORY / (std::mem::size_of::<f64>() * (n + 1));
        let maxhist = if maxhist > maxhist_mem {
            if self.verbosity >= Verbosity::Exit {
                warn!(
                    "maxhist reduced from {} to {} to keep the history below {} bytes",
                    maxhist, maxhist_mem, MAX_HISTORY_MEMORY
                );
            }
            maxhist_mem
        } else {
            maxhist
        };

        Ok(ResolvedConfig {
            n,
            rhobeg,
            rhoend,
            maxfun,
            maxtr: maxfun.saturating_mul(MAXTR_PER_MAXFUN),
            npt,
            ftarget,
            eta1: self.eta1,
            eta2: self.eta2,
            gamma1: self.gamma1,
            gamma2: self.gamma2,
            maxhist,
            verbosity: self.verbosity,
        })
    }
}

/// Bytes needed by the interpolation points, the model and the conditioning structure.
fn workspace_bytes(n: usize, npt: usize) -> Option<usize> {
    let xpt = npt.checked_mul(n)?;
    let bmat = npt.checked_add(n)?.checked_mul(n)?;
    let zmat = npt.checked_mul(npt - n - 1)?;
    let hq = n.checked_mul(n)?;
    let vectors = npt.checked_mul(4)?.checked_add(n.checked_mul(8)?)?;
    xpt.checked_add(bmat)?
        .checked_add(zmat)?
        .checked_add(hq)?
        .checked_add(vectors)?
        .checked_mul(std::mem::size_of::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NewuoaConfig::default().resolve(5).unwrap();
        assert_eq!(config.n, 5);
        assert_eq!(config.rhobeg, 1.0);
        assert_eq!(config.rhoend, 1.0e-6);
        assert_eq!(config.maxfun, 2500);
        assert_eq!(config.npt, 11);
        assert_eq!(config.maxhist, 2500);
        assert_eq!(config.maxtr, 5000);
        assert_eq!(config.ftarget, f64::NEG_INFINITY);
        assert_eq!(config.verbosity, Verbosity::None);
    }

    #[test]
    fn test_radius_defaults_follow_each_other() {
        let config = NewuoaConfig {
            rhobeg: Some(0.5),
            ..Default::default()
        }
        .resolve(2)
        .unwrap();
        assert_eq!(config.rhoend, 1.0e-6);

        let config = NewuoaConfig {
            rhobeg: Some(1.0e-6),
            ..Default::default()
        }
        .resolve(2)
        .unwrap();
        assert!((config.rhoend - 1.0e-7).abs() < 1e-20);

        let config = NewuoaConfig {
            rhoend: Some(0.5),
            ..Default::default()
        }
        .resolve(2)
        .unwrap();
        assert_eq!(config.rhobeg, 5.0);
    }

    #[test]
    fn test_rejects_bad_radii() {
        let config = NewuoaConfig {
            rhobeg: Some(1.0e-3),
            rhoend: Some(1.0e-2),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(3),
            Err(NewuoaError::InvalidParameter(_))
        ));

        let config = NewuoaConfig {
            rhobeg: Some(f64::NAN),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(3),
            Err(NewuoaError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_rejects_npt_out_of_range() {
        for npt in [4, 11] {
            let config = NewuoaConfig {
                npt: Some(npt),
                ..Default::default()
            };
            match config.resolve(3) {
                Err(NewuoaError::InvalidNpt { min, max, .. }) => {
                    assert_eq!(min, 5);
                    assert_eq!(max, 10);
                }
                other => panic!("Expected InvalidNpt, got {:?}", other),
            }
        }

        // Both ends of the domain are admissible.
        for npt in [5, 10] {
            let config = NewuoaConfig {
                npt: Some(npt),
                ..Default::default()
            };
            assert_eq!(config.resolve(3).unwrap().npt, npt);
        }
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let config = NewuoaConfig {
            eta1: 0.8,
            eta2: 0.7,
            ..Default::default()
        };
        assert!(config.resolve(2).is_err());

        let config = NewuoaConfig {
            gamma1: 1.5,
            ..Default::default()
        };
        assert!(config.resolve(2).is_err());

        let config = NewuoaConfig {
            gamma2: 1.0,
            ..Default::default()
        };
        assert!(config.resolve(2).is_err());
    }

    #[test]
    fn test_rejects_empty_problem_and_zero_budget() {
        assert!(matches!(
            NewuoaConfig::default().resolve(0),
            Err(NewuoaError::DimensionMismatch(_))
        ));

        let config = NewuoaConfig {
            maxfun: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(2),
            Err(NewuoaError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_maxhist_never_exceeds_maxfun() {
        let config = NewuoaConfig {
            maxfun: Some(40),
            maxhist: Some(1000),
            ..Default::default()
        }
        .resolve(2)
        .unwrap();
        assert_eq!(config.maxhist, 40);

        let config = NewuoaConfig {
            maxhist: Some(0),
            ..Default::default()
        }
        .resolve(2)
        .unwrap();
        assert_eq!(config.maxhist, 0);
    }

    #[test]
    fn test_maxhist_clamped_to_memory_ceiling() {
        let config = NewuoaConfig {
            maxfun: Some(usize::MAX / 2),
            ..Default::default()
        }
        .resolve(3)
        .unwrap();
        assert_eq!(config.maxhist, MAX_HISTORY_MEMORY / (8 * 4));
    }

    #[test]
    fn test_workspace_ceiling() {
        let config = NewuoaConfig {
            npt: Some(40_000),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(20_000),
            Err(NewuoaError::MemoryAllocation(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = NewuoaConfig {
            rhobeg: Some(0.25),
            ftarget: Some(-3.0),
            verbosity: Verbosity::Rho,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        let loaded = NewuoaConfig::from_json(&json).unwrap();
        assert_eq!(loaded, config);

        // Missing fields fall back to their defaults.
        let partial = NewuoaConfig::from_json(r#"{ "maxfun": 100 }"#).unwrap();
        assert_eq!(partial.maxfun, Some(100));
        assert_eq!(partial.eta2, 0.7);
    }
}
