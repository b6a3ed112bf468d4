//! Error types for xsunfold-core.

use thiserror::Error;

/// Result type alias for xsunfold operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for unfolding operations.
///
/// Non-finite bin contents produced by zero denominators are *not* errors:
/// they propagate through the histograms and are reported by the caller.
/// [`Error::NumericalDegeneracy`] is reserved for failures that make a whole
/// computation meaningless (for example a toy replica that cannot be drawn).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed configuration (unknown unfolding method, bad statistical-error mode).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required input is missing or inconsistent.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// Two histograms that must share a binning do not.
    #[error("binning mismatch in {context}: expected {expected}, found {found}")]
    BinningMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// Invalid bin edges (fewer than two, non-finite, or not strictly increasing).
    #[error("invalid binning: {0}")]
    InvalidBinning(String),

    /// Numerical failure that aborts the computation.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// A required solver or numerical facility could not be initialized.
    #[error("resource unavailable: {0}")]
    Resource(String),

    /// Bin index out of range.
    #[error("bin index {index} out of range for histogram with {n_bins} bins")]
    BinOutOfRange { index: usize, n_bins: usize },
}

impl Error {
    /// Builds a [`Error::BinningMismatch`] from any two displayable binnings.
    pub fn mismatch(
        context: impl Into<String>,
        expected: impl std::fmt::Display,
        found: impl std::fmt::Display,
    ) -> Self {
        Self::BinningMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
