//! Exit conditions of a NEWUOA run.
//!
//! Every run that passes input validation ends with exactly one of these
//! states. The first applicable condition wins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal state of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitStatus {
    /// The trust-region radius reached its lower bound `rhoend`.
    SmallTrRadius,

    /// A sampled value was at or below `ftarget`.
    FtargetAchieved,

    /// A trust-region step failed to reduce the quadratic model.
    TrsubpFailed,

    /// The evaluation budget `maxfun` is exhausted.
    MaxfunReached,

    /// The cap on trust-region iterations was reached.
    MaxtrReached,

    /// A trial point contains NaN or an infinity.
    NanInfX,

    /// The objective returned NaN or +inf.
    NanInfF,

    /// NaN or an infinity occurred in the quadratic model.
    NanInfModel,

    /// The progress callback asked the run to stop.
    CallbackTerminate,
}

impl ExitStatus {
    /// Stable numeric code of the status.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::SmallTrRadius => 0,
            ExitStatus::FtargetAchieved => 1,
            ExitStatus::TrsubpFailed => 2,
            ExitStatus::MaxfunReached => 3,
            ExitStatus::MaxtrReached => 20,
            ExitStatus::NanInfX => -1,
            ExitStatus::NanInfF => -2,
            ExitStatus::NanInfModel => -3,
            ExitStatus::CallbackTerminate => 30,
        }
    }

    /// Stable human-readable description of the status.
    pub fn message(&self) -> &'static str {
        match self {
            ExitStatus::SmallTrRadius => "Trust region radius reaches its lower bound",
            ExitStatus::FtargetAchieved => "The target function value is reached",
            ExitStatus::TrsubpFailed => "A trust region step failed to reduce the model",
            ExitStatus::MaxfunReached => "Maximum number of function evaluations reached",
            ExitStatus::MaxtrReached => "Maximum number of trust region iterations reached",
            ExitStatus::NanInfX => "The variable vector contains NaN or Inf",
            ExitStatus::NanInfF => "The objective function returns NaN or +Inf",
            ExitStatus::NanInfModel => "NaN or Inf occurs in the model",
            ExitStatus::CallbackTerminate => {
                "Callback function requested termination of optimization"
            }
        }
    }

    /// Returns true if the run ended because it converged or met its target.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ExitStatus::SmallTrRadius | ExitStatus::FtargetAchieved
        )
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ExitStatus; 9] = [
        ExitStatus::SmallTrRadius,
        ExitStatus::FtargetAchieved,
        ExitStatus::TrsubpFailed,
        ExitStatus::MaxfunReached,
        ExitStatus::MaxtrReached,
        ExitStatus::NanInfX,
        ExitStatus::NanInfF,
        ExitStatus::NanInfModel,
        ExitStatus::CallbackTerminate,
    ];

    #[test]
    fn test_codes_and_messages_are_distinct() {
        for (i, a) in ALL.iter().enumerate() {
            for b in &ALL[i + 1..] {
                assert_ne!(a.code(), b.code());
                assert_ne!(a.message(), b.message());
            }
        }
    }

    #[test]
    fn test_success_flag() {
        assert!(ExitStatus::SmallTrRadius.is_success());
        assert!(ExitStatus::FtargetAchieved.is_success());
        assert!(!ExitStatus::TrsubpFailed.is_success());
        assert!(!ExitStatus::MaxfunReached.is_success());
        assert!(!ExitStatus::MaxtrReached.is_success());
        assert!(!ExitStatus::NanInfX.is_success());
        assert!(!ExitStatus::NanInfF.is_success());
        assert!(!ExitStatus::NanInfModel.is_success());
        assert!(!ExitStatus::CallbackTerminate.is_success());
    }

    #[test]
    fn test_display_uses_message() {
        assert_eq!(
            format!("{}", ExitStatus::MaxfunReached),
            "Maximum number of function evaluations reached"
        );
    }
}
