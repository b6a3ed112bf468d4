//! Conversions between histograms and nalgebra matrices.

use nalgebra::{DMatrix, DVector};
use xsunfold_core::Histogram2D;

/// Raw response counts as a `n_reco x n_truth` matrix.
pub(crate) fn response_matrix(response: &Histogram2D) -> DMatrix<f64> {
    let contents = response.contents();
    DMatrix::from_fn(response.nx(), response.ny(), |i, j| contents[[i, j]])
}

/// Migration probabilities `P(reco i | truth j)`.
///
/// Each column is normalized to the reconstructed total of its truth bin.
/// Empty truth columns stay zero.
pub(crate) fn migration_matrix(response: &Histogram2D) -> DMatrix<f64> {
    let mut matrix = response_matrix(response);
    for mut column in matrix.column_iter_mut() {
        let sum = column.sum();
        if sum != 0.0 {
            column /= sum;
        }
    }
    matrix
}

pub(crate) fn to_vector(values: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(values)
}

/// Errors of `map * b` for uncorrelated inputs with errors `sigma`.
pub(crate) fn propagate_errors(map: &DMatrix<f64>, sigma: &[f64]) -> Vec<f64> {
    map.row_iter()
        .map(|row| {
            row.iter()
                .zip(sigma)
                .map(|(a, s)| (a * s).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .collect()
}

/// Second-difference operator of shape `(n - 2) x n`; empty for `n < 3`.
pub(crate) fn laplacian(n: usize) -> DMatrix<f64> {
    let rows = n.saturating_sub(2);
    let mut matrix = DMatrix::zeros(rows, n);
    for r in 0..rows {
        matrix[(r, r)] = 1.0;
        matrix[(r, r + 1)] = -2.0;
        matrix[(r, r + 2)] = 1.0;
    }
    matrix
}
