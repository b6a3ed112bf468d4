//! Direct inversion of the migration matrix.

use log::warn;
use nalgebra::DMatrix;
use xsunfold_core::ResponseModel;

use crate::linalg::{migration_matrix, propagate_errors, to_vector};
use crate::unfolder::Solution;

/// Singular values below this fraction of the largest are dropped by the
/// pseudo-inverse.
const PSEUDO_INVERSE_EPS: f64 = 1e-12;

/// Prepared inverse of the migration matrix.
#[derive(Clone, Debug)]
pub struct InversionUnfolding {
    inverse: DMatrix<f64>,
}

impl InversionUnfolding {
    /// Inverts the migration matrix (pseudo-inverse when it is not square).
    ///
    /// A singular square matrix yields an all-NaN inverse, so every unfolded
    /// bin comes out non-finite instead of aborting the run.
    #[must_use]
    pub fn prepare(response: &ResponseModel) -> Self {
        let migration = migration_matrix(response.matrix());
        let (rows, cols) = migration.shape();
        let inverse = if rows == cols {
            migration.try_inverse()
        } else {
            let eps = PSEUDO_INVERSE_EPS * migration.amax();
            migration.pseudo_inverse(eps).ok()
        };
        let inverse = inverse.unwrap_or_else(|| {
            warn!("response matrix ({rows}x{cols}) is singular, inversion result is undefined");
            DMatrix::from_element(cols, rows, f64::NAN)
        });
        Self { inverse }
    }

    /// Applies the inverse to the measured vector.
    #[must_use]
    pub fn solve(&self, measured: &[f64], errors: &[f64]) -> Solution {
        let values = &self.inverse * to_vector(measured);
        Solution {
            values: values.iter().copied().collect(),
            errors: propagate_errors(&self.inverse, errors),
        }
    }
}
