//! Damped singular-value-decomposition unfolding.
//!
//! The unknowns are the ratios `w_j = x_j / prior_j` against the truth
//! projection of the response, so the system matrix is the raw response
//! itself: `b_i = sum_j A_ij w_j`. Rows are weighted by the measured errors
//! before decomposing. Singular components are damped with the filter
//! `s^2 / (s^2 + tau)`, where `tau` is the square of the `rank`-th largest
//! singular value; `rank` therefore sets how many components pass
//! essentially unsuppressed.
#![allow(clippy::many_single_char_names)]

use log::debug;
use nalgebra::{DMatrix, DVector};
use xsunfold_core::{Error, ResponseModel, Result};

use crate::linalg::{propagate_errors, response_matrix, to_vector};
use crate::method::MIN_SVD_RANK;
use crate::unfolder::Solution;

/// Prepared response for damped SVD unfolding.
#[derive(Clone, Debug)]
pub struct SvdUnfolding {
    response: DMatrix<f64>,
    prior: Vec<f64>,
    rank: usize,
}

impl SvdUnfolding {
    /// Default rank for `n_truth` truth bins.
    #[must_use]
    pub fn default_rank(n_truth: usize) -> usize {
        (n_truth / 2).max(MIN_SVD_RANK)
    }

    #[must_use]
    pub fn prepare(response: &ResponseModel, rank: Option<usize>) -> Self {
        let prior = response.signal_truth().contents().to_vec();
        let rank = rank.unwrap_or_else(|| Self::default_rank(prior.len()));
        Self {
            response: response_matrix(response.matrix()),
            prior,
            rank,
        }
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Solves the error-weighted system.
    ///
    /// # Errors
    /// Returns [`Error::NumericalDegeneracy`] if the decomposition does not
    /// produce singular vectors.
    pub fn solve(&self, measured: &[f64], errors: &[f64]) -> Result<Solution> {
        let weights: Vec<f64> = errors
            .iter()
            .map(|&e| if e > 0.0 && e.is_finite() { 1.0 / e } else { 1.0 })
            .collect();

        let mut weighted = self.response.clone();
        for (mut row, w) in weighted.row_iter_mut().zip(&weights) {
            row *= *w;
        }

        let svd = weighted.svd(true, true);
        let u = svd
            .u
            .ok_or_else(|| Error::NumericalDegeneracy("SVD produced no left vectors".into()))?;
        let v_t = svd
            .v_t
            .ok_or_else(|| Error::NumericalDegeneracy("SVD produced no right vectors".into()))?;
        let singular = svd.singular_values;

        let mut sorted: Vec<f64> = singular.iter().copied().collect();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let k = self.rank.clamp(1, sorted.len().max(1));
        let tau = sorted.get(k - 1).map_or(0.0, |s| s * s);
        debug!("SVD unfolding: rank {k}, tau {tau:.4e}");

        // G = diag(prior) V diag(s / (s^2 + tau)) U^T diag(weights)
        let filter = DVector::from_iterator(
            singular.len(),
            singular.iter().map(|&s| {
                let denom = s * s + tau;
                if denom > 0.0 {
                    s / denom
                } else {
                    0.0
                }
            }),
        );
        let mut map: DMatrix<f64> = v_t.transpose() * DMatrix::from_diagonal(&filter) * u.transpose();
        for (mut column, w) in map.column_iter_mut().zip(&weights) {
            column *= *w;
        }
        for (mut row, p) in map.row_iter_mut().zip(&self.prior) {
            row *= *p;
        }

        let values = &map * to_vector(measured);
        Ok(Solution {
            values: values.iter().copied().collect(),
            errors: propagate_errors(&map, errors),
        })
    }
}
