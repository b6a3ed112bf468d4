//! xsunfold-algorithms: Unfolding strategies and cross-section extraction.
//!
//! This crate provides the unfolding methods behind one [`Unfolder`] facade:
//! - **Inversion** - exact (pseudo-)inverse of the migration matrix
//! - **SVD** - Tikhonov-filtered singular value decomposition
//! - **Bayes** - iterative D'Agostini unfolding
//! - **BinByBin** - per-bin correction factors
//! - **QUBO** - binary-encoded least squares, solved by simulated annealing
//!   (`SA`) or annealing with a greedy polish (`HYB`)
//!
//! On top of it sit the [`CorrectionChain`], the toy-based uncertainty
//! estimate ([`ToyEnsemble`]) and the [`Spectrum`] pipeline.
//!

mod annealing;
mod backend;
mod bayes;
mod bin_by_bin;
mod corrections;
mod inversion;
mod linalg;
mod method;
pub mod moments;
mod qubo;
mod spectrum;
mod svd;
mod toys;
mod unfolder;

pub use annealing::{steepest_descent, Sample, SimulatedAnnealer};
pub use backend::{SolverBackend, SolverConfig, MAX_BITS_LIMIT};
pub use bayes::BayesUnfolding;
pub use bin_by_bin::BinByBinUnfolding;
pub use corrections::{CorrectionChain, CrossSections, ABSOLUTE_NAME, RELATIVE_NAME};
pub use inversion::InversionUnfolding;
pub use method::{QuboSolverKind, UnfoldingMethod, DEFAULT_BAYES_ITERATIONS, MIN_SVD_RANK};
pub use qubo::{BinaryEncoding, QuboProblem, QuboUnfolding};
pub use spectrum::{
    Spectrum, SpectrumInputs, SpectrumOutputs, SpectrumSettings, StatErrorMode,
    MC_STAT_SYSTEMATIC,
};
pub use svd::SvdUnfolding;
pub use toys::{SmearingMode, ToyConfig, ToyEnsemble, ToyErrors, ToyResult};
pub use unfolder::{Solution, Unfolder, UNFOLDED_NAME};

// Re-export the core types every caller needs
pub use xsunfold_core::{Error, Result};
