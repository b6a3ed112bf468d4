//! The unfolder: one measured histogram in, one truth-level histogram out.
//!
//! An [`Unfolder`] owns a response, a measured histogram and the strategy
//! selected by its [`UnfoldingMethod`]. The strategy's prepared state (matrix
//! inverse, migration matrix, QUBO encoding, ...) is built lazily on the first
//! [`Unfolder::unfold`] and cached. [`Unfolder::reset`] clears the measured
//! input and the last result; it keeps the prepared state only when the
//! unfolder was told to keep its response.

use log::debug;
use xsunfold_core::{Error, Histogram1D, Histogram2D, ResponseModel, Result};

use crate::backend::SolverBackend;
use crate::bayes::BayesUnfolding;
use crate::bin_by_bin::BinByBinUnfolding;
use crate::inversion::InversionUnfolding;
use crate::method::UnfoldingMethod;
use crate::qubo::QuboUnfolding;
use crate::svd::SvdUnfolding;

/// Name given to every unfolded histogram.
pub const UNFOLDED_NAME: &str = "DataUnfolded";

/// Raw output of one strategy: truth-bin values and their errors.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
}

/// Prepared strategy state.
#[derive(Clone, Debug)]
enum Prepared {
    Inversion(InversionUnfolding),
    Svd(SvdUnfolding),
    Bayes(BayesUnfolding),
    BinByBin(BinByBinUnfolding),
    Qubo(QuboUnfolding),
}

/// Regularized inversion of a measured histogram through a response matrix.
#[derive(Clone, Debug)]
pub struct Unfolder {
    method: UnfoldingMethod,
    backend: SolverBackend,
    keep_response: bool,
    seed: u64,
    response: Option<ResponseModel>,
    measured: Option<Histogram1D>,
    prepared: Option<Prepared>,
    unfolded: Option<Histogram1D>,
}

impl Unfolder {
    /// Creates an unfolder using the method's default response-reuse policy.
    #[must_use]
    pub fn new(method: UnfoldingMethod, backend: SolverBackend) -> Self {
        Self {
            keep_response: method.keeps_response(),
            method,
            backend,
            seed: 0,
            response: None,
            measured: None,
            prepared: None,
            unfolded: None,
        }
    }

    /// Creates an unfolder from a method name.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the method name is unknown.
    pub fn from_name(name: &str, parameter: Option<f64>, backend: SolverBackend) -> Result<Self> {
        Ok(Self::new(
            UnfoldingMethod::from_name(name, parameter)?,
            backend,
        ))
    }

    /// Overrides whether [`Self::reset`] keeps the prepared response state.
    #[must_use]
    pub fn with_keep_response(mut self, keep_response: bool) -> Self {
        self.keep_response = keep_response;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Seed for stochastic solvers; deterministic methods ignore it.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    #[must_use]
    pub fn method(&self) -> &UnfoldingMethod {
        &self.method
    }

    #[must_use]
    pub fn keeps_response(&self) -> bool {
        self.keep_response
    }

    pub fn set_measured(&mut self, measured: Histogram1D) {
        self.measured = Some(measured);
    }

    #[must_use]
    pub fn measured(&self) -> Option<&Histogram1D> {
        self.measured.as_ref()
    }

    /// Installs a response matrix, transposing it when its axes are
    /// truth × reco. Drops any prepared state.
    pub fn set_response(&mut self, matrix: Histogram2D, transpose: bool) {
        self.set_response_model(ResponseModel::with_orientation(matrix, transpose));
    }

    pub fn set_response_model(&mut self, response: ResponseModel) {
        self.response = Some(response);
        self.prepared = None;
    }

    #[must_use]
    pub fn response(&self) -> Option<&ResponseModel> {
        self.response.as_ref()
    }

    /// Changes the regularization parameter. Drops any prepared state.
    ///
    /// # Errors
    /// Propagates [`UnfoldingMethod::with_parameter`] failures.
    pub fn set_regularization_parameter(&mut self, parameter: f64) -> Result<()> {
        self.method = self.method.with_parameter(parameter)?;
        self.prepared = None;
        Ok(())
    }

    /// The result of the last successful [`Self::unfold`].
    #[must_use]
    pub fn unfolded(&self) -> Option<&Histogram1D> {
        self.unfolded.as_ref()
    }

    /// Clears the measured histogram and the last result so the instance can
    /// take the next replica.
    pub fn reset(&mut self) {
        self.measured = None;
        self.unfolded = None;
        if !self.keep_response {
            self.prepared = None;
        }
    }

    /// Unfolds the measured histogram.
    ///
    /// # Errors
    /// - [`Error::Precondition`] if the measured histogram or response is missing
    /// - [`Error::BinningMismatch`] if the measured binning differs from the reco axis
    /// - strategy-specific failures (non-square response for bin-by-bin, SVD failure)
    pub fn unfold(&mut self) -> Result<Histogram1D> {
        let response = self
            .response
            .as_ref()
            .ok_or_else(|| Error::Precondition("unfold called without a response".into()))?;
        let measured = self.measured.as_ref().ok_or_else(|| {
            Error::Precondition("unfold called without a measured histogram".into())
        })?;
        response.reco_binning().ensure_matches(
            measured.binning(),
            &format!("reco axis of response vs measured {}", measured.name()),
        )?;

        let (contents, errors) = (measured.contents(), measured.errors());
        let prepared = match &mut self.prepared {
            Some(prepared) => prepared,
            slot => {
                debug!("preparing {} response", self.method.name());
                slot.insert(prepare(&self.method, response, contents, &self.backend)?)
            }
        };

        let solution = match prepared {
            Prepared::Inversion(s) => s.solve(contents, errors),
            Prepared::Svd(s) => s.solve(contents, errors)?,
            Prepared::Bayes(s) => s.solve(contents, errors),
            Prepared::BinByBin(s) => s.solve(contents, errors),
            Prepared::Qubo(s) => s.solve(contents, &self.backend, self.seed),
        };

        let mut unfolded = Histogram1D::from_parts(
            UNFOLDED_NAME,
            response.truth_binning().clone(),
            solution.values,
            solution.errors,
        )?;
        unfolded.set_x_title(response.matrix().y_title());
        self.unfolded = Some(unfolded.clone());
        Ok(unfolded)
    }
}

fn prepare(
    method: &UnfoldingMethod,
    response: &ResponseModel,
    measured: &[f64],
    backend: &SolverBackend,
) -> Result<Prepared> {
    Ok(match *method {
        UnfoldingMethod::Inversion => Prepared::Inversion(InversionUnfolding::prepare(response)),
        UnfoldingMethod::Svd { rank } => Prepared::Svd(SvdUnfolding::prepare(response, rank)),
        UnfoldingMethod::Bayes { iterations } => {
            Prepared::Bayes(BayesUnfolding::prepare(response, iterations))
        }
        UnfoldingMethod::BinByBin => Prepared::BinByBin(BinByBinUnfolding::prepare(response)?),
        UnfoldingMethod::Qubo { strength, solver } => Prepared::Qubo(QuboUnfolding::prepare(
            response,
            measured,
            strength,
            solver,
            backend.config().max_bits,
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SolverConfig;
    use ndarray::Array2;
    use xsunfold_core::Binning;

    fn backend() -> SolverBackend {
        SolverBackend::initialize(SolverConfig::default()).unwrap()
    }

    fn diagonal(values: &[f64]) -> Histogram2D {
        let n = values.len();
        let binning = Binning::uniform(n, 0.0, 3.0).unwrap();
        let mut contents = Array2::zeros((n, n));
        for (i, v) in values.iter().enumerate() {
            contents[[i, i]] = *v;
        }
        Histogram2D::from_counts("Response", binning.clone(), binning, contents).unwrap()
    }

    fn measured(values: Vec<f64>) -> Histogram1D {
        let n = values.len();
        Histogram1D::from_counts("Data", Binning::uniform(n, 0.0, 3.0).unwrap(), values).unwrap()
    }

    #[test]
    fn test_every_method_unfolds_diagonal_response() {
        for method in UnfoldingMethod::all_defaults() {
            let mut unfolder = Unfolder::new(method, backend()).with_seed(3);
            unfolder.set_response(diagonal(&[100.0, 200.0, 100.0]), false);
            unfolder.set_measured(measured(vec![90.0, 190.0, 90.0]));
            let result = unfolder.unfold().unwrap();
            assert_eq!(result.name(), UNFOLDED_NAME);
            for (x, b) in result.contents().iter().zip([90.0, 190.0, 90.0]) {
                match method {
                    // damping halves the components at the regularization rank
                    UnfoldingMethod::Svd { .. } => {
                        assert!(*x >= 0.5 * b - 1e-6 && *x <= b + 1e-6, "{method}: {x} vs {b}");
                    }
                    UnfoldingMethod::Qubo { .. } => {
                        assert!((x - b).abs() <= 0.05 * b, "{method}: {x} vs {b}");
                    }
                    _ => assert!((x - b).abs() <= 1e-6, "{method}: {x} vs {b}"),
                }
            }
            assert!(unfolder.unfolded().is_some());
        }
    }

    #[test]
    fn test_missing_inputs_are_precondition_errors() {
        let mut unfolder = Unfolder::new(UnfoldingMethod::Inversion, backend());
        assert!(matches!(unfolder.unfold(), Err(Error::Precondition(_))));
        unfolder.set_response(diagonal(&[1.0, 1.0, 1.0]), false);
        assert!(matches!(unfolder.unfold(), Err(Error::Precondition(_))));
    }

    #[test]
    fn test_binning_mismatch_detected_before_solving() {
        let mut unfolder = Unfolder::new(UnfoldingMethod::BinByBin, backend());
        unfolder.set_response(diagonal(&[1.0, 1.0, 1.0]), false);
        unfolder.set_measured(measured(vec![1.0, 1.0]));
        assert!(matches!(
            unfolder.unfold(),
            Err(Error::BinningMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_method_name() {
        assert!(matches!(
            Unfolder::from_name("Tikhonov", None, backend()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_reset_policy() {
        let mut bayes = Unfolder::new(UnfoldingMethod::Bayes { iterations: 4 }, backend());
        bayes.set_response(diagonal(&[1.0, 2.0, 1.0]), false);
        bayes.set_measured(measured(vec![1.0, 2.0, 1.0]));
        bayes.unfold().unwrap();
        bayes.reset();
        assert!(bayes.measured().is_none());
        assert!(bayes.unfolded().is_none());
        assert!(bayes.prepared.is_none());

        let mut qubo = Unfolder::from_name("SA", Some(0.0), backend()).unwrap();
        assert!(qubo.keeps_response());
        qubo.set_response(diagonal(&[1.0, 2.0, 1.0]), false);
        qubo.set_measured(measured(vec![1.0, 2.0, 1.0]));
        qubo.unfold().unwrap();
        qubo.reset();
        assert!(qubo.prepared.is_some());
        qubo.set_response(diagonal(&[1.0, 2.0, 1.0]), false);
        assert!(qubo.prepared.is_none());
    }

    #[test]
    fn test_unfold_does_not_mutate_inputs() {
        let mut unfolder = Unfolder::new(UnfoldingMethod::Svd { rank: None }, backend());
        let response = diagonal(&[100.0, 200.0, 100.0]);
        let data = measured(vec![90.0, 190.0, 90.0]);
        unfolder.set_response(response.clone(), false);
        unfolder.set_measured(data.clone());
        let first = unfolder.unfold().unwrap();
        let second = unfolder.unfold().unwrap();
        assert_eq!(first, second);
        assert_eq!(unfolder.measured(), Some(&data));
        assert_eq!(unfolder.response().map(ResponseModel::matrix), Some(&response));
    }
}
