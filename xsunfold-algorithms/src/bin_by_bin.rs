//! Bin-by-bin correction factors.

use xsunfold_core::{Error, ResponseModel, Result};

use crate::unfolder::Solution;

/// Per-bin factors `truth_j / reco_j` taken from the response projections.
#[derive(Clone, Debug)]
pub struct BinByBinUnfolding {
    factors: Vec<f64>,
}

impl BinByBinUnfolding {
    /// # Errors
    /// Returns [`Error::Precondition`] unless the response is square.
    pub fn prepare(response: &ResponseModel) -> Result<Self> {
        let truth = response.signal_truth();
        let reco = response.reco_projection();
        if truth.n_bins() != reco.n_bins() {
            return Err(Error::Precondition(format!(
                "bin-by-bin unfolding needs as many reco bins as truth bins ({} vs {})",
                reco.n_bins(),
                truth.n_bins()
            )));
        }
        let factors = truth
            .contents()
            .iter()
            .zip(reco.contents())
            .map(|(t, r)| t / r)
            .collect();
        Ok(Self { factors })
    }

    #[must_use]
    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    #[must_use]
    pub fn solve(&self, measured: &[f64], errors: &[f64]) -> Solution {
        Solution {
            values: measured.iter().zip(&self.factors).map(|(b, c)| b * c).collect(),
            errors: errors.iter().zip(&self.factors).map(|(e, c)| e * c.abs()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use xsunfold_core::{Binning, Histogram2D};

    #[test]
    fn test_factors_from_projections() {
        let response = ResponseModel::new(
            Histogram2D::from_counts(
                "res",
                Binning::uniform(2, 0.0, 2.0).unwrap(),
                Binning::uniform(2, 0.0, 2.0).unwrap(),
                array![[20.0, 0.0], [20.0, 60.0]],
            )
            .unwrap(),
        );
        let unfolding = BinByBinUnfolding::prepare(&response).unwrap();
        assert_eq!(unfolding.factors(), &[2.0, 0.75]);
        let solution = unfolding.solve(&[4.0, 4.0], &[2.0, 2.0]);
        assert_eq!(solution.values, vec![8.0, 3.0]);
        assert_eq!(solution.errors, vec![4.0, 1.5]);
    }

    #[test]
    fn test_non_square_rejected() {
        let response = ResponseModel::new(Histogram2D::new(
            "res",
            Binning::uniform(3, 0.0, 3.0).unwrap(),
            Binning::uniform(2, 0.0, 2.0).unwrap(),
        ));
        assert!(matches!(
            BinByBinUnfolding::prepare(&response),
            Err(Error::Precondition(_))
        ));
    }
}
