//! Unfolding method selection.

use std::fmt;
use std::str::FromStr;

use log::warn;
use xsunfold_core::{Error, Result};

/// Bayes iterations used when no valid parameter is given.
pub const DEFAULT_BAYES_ITERATIONS: usize = 4;

/// Smallest SVD regularization rank picked by default.
pub const MIN_SVD_RANK: usize = 2;

/// Combinatorial solver driving a QUBO unfolding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QuboSolverKind {
    /// Simulated annealing ("SA").
    Annealing,
    /// Annealing followed by steepest-descent polishing ("HYB").
    Hybrid,
}

/// The five interchangeable unfolding strategies with their parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnfoldingMethod {
    /// Direct (pseudo-)inverse of the migration matrix.
    Inversion,
    /// Damped SVD; `None` picks `n_truth / 2`, at least [`MIN_SVD_RANK`].
    Svd { rank: Option<usize> },
    /// Iterative Bayesian unfolding.
    Bayes { iterations: usize },
    /// Per-bin correction factors.
    BinByBin,
    /// Bit-encoded least squares with a curvature penalty of `strength`.
    Qubo {
        strength: f64,
        solver: QuboSolverKind,
    },
}

impl UnfoldingMethod {
    /// Builds a method from its name and an optional regularization parameter.
    ///
    /// Names are matched case-insensitively. A missing or negative parameter
    /// selects the method default.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an unknown method name.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn from_name(name: &str, parameter: Option<f64>) -> Result<Self> {
        let parameter = parameter.filter(|p| p.is_finite() && *p >= 0.0);
        let method = match name.to_ascii_lowercase().as_str() {
            "inversion" | "invert" => Self::Inversion,
            "svd" => Self::Svd {
                rank: parameter.map(|p| p.round() as usize).filter(|&k| k > 0),
            },
            "bayes" => {
                let mut iterations =
                    parameter.map_or(DEFAULT_BAYES_ITERATIONS, |p| p.round() as usize);
                if iterations == 0 {
                    warn!("Bayes unfolding needs at least one iteration, using 1");
                    iterations = 1;
                }
                Self::Bayes { iterations }
            }
            "binbybin" => Self::BinByBin,
            "sa" => Self::Qubo {
                strength: parameter.unwrap_or(0.0),
                solver: QuboSolverKind::Annealing,
            },
            "hyb" => Self::Qubo {
                strength: parameter.unwrap_or(0.0),
                solver: QuboSolverKind::Hybrid,
            },
            _ => {
                return Err(Error::Configuration(format!(
                    "unknown unfolding method '{name}' (expected Inversion, SVD, Bayes, BinByBin, SA or HYB)"
                )))
            }
        };
        Ok(method)
    }

    /// Canonical method name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inversion => "Inversion",
            Self::Svd { .. } => "SVD",
            Self::Bayes { .. } => "Bayes",
            Self::BinByBin => "BinByBin",
            Self::Qubo {
                solver: QuboSolverKind::Annealing,
                ..
            } => "SA",
            Self::Qubo {
                solver: QuboSolverKind::Hybrid,
                ..
            } => "HYB",
        }
    }

    /// Regularization parameter as a number, `None` when the method has none.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn parameter(&self) -> Option<f64> {
        match self {
            Self::Inversion | Self::BinByBin => None,
            Self::Svd { rank } => rank.map(|k| k as f64),
            Self::Bayes { iterations } => Some(*iterations as f64),
            Self::Qubo { strength, .. } => Some(*strength),
        }
    }

    /// Returns a copy carrying a new regularization parameter.
    ///
    /// # Errors
    /// Never fails for known methods; kept fallible to share [`Self::from_name`].
    pub fn with_parameter(&self, parameter: f64) -> Result<Self> {
        Self::from_name(self.name(), Some(parameter))
    }

    /// Whether the prepared response decomposition survives [`crate::Unfolder::reset`].
    ///
    /// The QUBO encoding is built once from the nominal measurement and reused
    /// by every replica; the linear methods rebuild per replica.
    #[must_use]
    pub fn keeps_response(&self) -> bool {
        matches!(self, Self::Qubo { .. })
    }

    /// Every method with its default parameter, in a fixed order.
    #[must_use]
    pub fn all_defaults() -> Vec<Self> {
        vec![
            Self::Inversion,
            Self::Svd { rank: None },
            Self::Bayes {
                iterations: DEFAULT_BAYES_ITERATIONS,
            },
            Self::BinByBin,
            Self::Qubo {
                strength: 0.0,
                solver: QuboSolverKind::Annealing,
            },
            Self::Qubo {
                strength: 0.0,
                solver: QuboSolverKind::Hybrid,
            },
        ]
    }
}

impl FromStr for UnfoldingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s, None)
    }
}

impl fmt::Display for UnfoldingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parameter() {
            Some(p) => write!(f, "{}({p})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}
