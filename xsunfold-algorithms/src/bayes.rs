//! Iterative Bayesian (D'Agostini) unfolding without inter-iteration smoothing.

use log::debug;
use nalgebra::{DMatrix, DVector};
use xsunfold_core::ResponseModel;

use crate::linalg::{migration_matrix, propagate_errors, to_vector};
use crate::unfolder::Solution;

/// Prepared migration matrix and prior for Bayesian unfolding.
#[derive(Clone, Debug)]
pub struct BayesUnfolding {
    migration: DMatrix<f64>,
    efficiency: Vec<f64>,
    prior: Vec<f64>,
    iterations: usize,
}

impl BayesUnfolding {
    /// Uses the truth projection of the response as the starting prior.
    #[must_use]
    pub fn prepare(response: &ResponseModel, iterations: usize) -> Self {
        let migration = migration_matrix(response.matrix());
        let efficiency = migration.row_sum().iter().copied().collect();
        let truth = response.signal_truth();
        let total = truth.integral();
        let n = truth.n_bins();
        #[allow(clippy::cast_precision_loss)]
        let prior = if total > 0.0 {
            truth.contents().iter().map(|t| t / total).collect()
        } else {
            vec![1.0 / n as f64; n]
        };
        Self {
            migration,
            efficiency,
            prior,
            iterations: iterations.max(1),
        }
    }

    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Runs the configured number of iterations and propagates the measured
    /// errors through the last unfolding matrix.
    #[must_use]
    pub fn solve(&self, measured: &[f64], errors: &[f64]) -> Solution {
        let (n_reco, n_truth) = self.migration.shape();
        let b = to_vector(measured);
        let mut prior = DVector::from_column_slice(&self.prior);
        let mut unfolding: DMatrix<f64> = DMatrix::zeros(n_truth, n_reco);
        let mut x: DVector<f64> = DVector::zeros(n_truth);

        for iteration in 0..self.iterations {
            let expected = &self.migration * &prior;
            for i in 0..n_reco {
                for j in 0..n_truth {
                    let denom = self.efficiency[j] * expected[i];
                    unfolding[(j, i)] = if denom > 0.0 {
                        self.migration[(i, j)] * prior[j] / denom
                    } else {
                        0.0
                    };
                }
            }
            x = &unfolding * &b;
            let total = x.sum();
            if total > 0.0 && total.is_finite() {
                prior = &x / total;
            }
            debug!("Bayes iteration {}: unfolded total {total:.4}", iteration + 1);
        }

        Solution {
            values: x.iter().copied().collect(),
            errors: propagate_errors(&unfolding, errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use xsunfold_core::{Binning, Histogram2D};

    fn model(contents: ndarray::Array2<f64>) -> ResponseModel {
        let binning = Binning::uniform(contents.nrows(), 0.0, 1.0).unwrap();
        ResponseModel::new(
            Histogram2D::from_counts("res", binning.clone(), binning, contents).unwrap(),
        )
    }

    #[test]
    fn test_diagonal_response_returns_measurement() {
        let response = model(array![[100.0, 0.0, 0.0], [0.0, 200.0, 0.0], [0.0, 0.0, 100.0]]);
        let solution = BayesUnfolding::prepare(&response, 4).solve(&[90.0, 190.0, 90.0], &[3.0; 3]);
        for (x, b) in solution.values.iter().zip([90.0, 190.0, 90.0]) {
            assert_relative_eq!(*x, b, epsilon = 1e-9);
        }
        assert_relative_eq!(solution.errors[1], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_iterations_conserve_normalization() {
        let response = model(array![[80.0, 10.0], [20.0, 90.0]]);
        let measured = [150.0, 150.0];
        let solution = BayesUnfolding::prepare(&response, 10).solve(&measured, &[0.0, 0.0]);
        // every truth bin is fully reconstructed, so the total is preserved
        assert_relative_eq!(solution.values.iter().sum::<f64>(), 300.0, epsilon = 1e-9);
        assert!(solution.values[0] > solution.values[1]);
    }

    #[test]
    fn test_zero_iterations_runs_once() {
        let response = model(array![[1.0, 0.0], [0.0, 1.0]]);
        assert_eq!(BayesUnfolding::prepare(&response, 0).iterations(), 1);
    }
}
