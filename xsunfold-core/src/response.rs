//! Response (migration) model.
//!
//! Wraps a reco × truth [`Histogram2D`] and derives the correction
//! histograms the unfolding chain needs:
//!
//! - signal truth: projection of the response onto the truth axis
//! - efficiency: signal truth / generated
//! - acceptance: reco projection / signal reco
//!
//! Zero denominators are not clamped. A zero generated bin gives a
//! non-finite efficiency, which is logged and left to propagate.

use log::warn;

use crate::error::Result;
use crate::histogram::{Binning, Histogram1D};
use crate::histogram2d::Histogram2D;

/// A response matrix with reco bins along x and truth bins along y.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseModel {
    matrix: Histogram2D,
}

impl ResponseModel {
    /// Wraps a response matrix already in reco × truth orientation.
    #[must_use]
    pub fn new(matrix: Histogram2D) -> Self {
        Self { matrix }
    }

    /// Wraps a response matrix, transposing it first when `transpose` is set.
    #[must_use]
    pub fn with_orientation(mut matrix: Histogram2D, transpose: bool) -> Self {
        if transpose {
            matrix.transpose();
        }
        Self { matrix }
    }

    #[must_use]
    pub fn matrix(&self) -> &Histogram2D {
        &self.matrix
    }

    #[must_use]
    pub fn into_matrix(self) -> Histogram2D {
        self.matrix
    }

    /// Binning of the reco (measured) axis.
    #[must_use]
    pub fn reco_binning(&self) -> &Binning {
        self.matrix.x_binning()
    }

    /// Binning of the truth (generated) axis.
    #[must_use]
    pub fn truth_binning(&self) -> &Binning {
        self.matrix.y_binning()
    }

    /// Swaps reco and truth axes of the stored matrix in place.
    pub fn transpose(&mut self) {
        self.matrix.transpose();
    }

    /// Projection onto the truth axis.
    #[must_use]
    pub fn signal_truth(&self) -> Histogram1D {
        self.matrix.projection_y("SignalTruth")
    }

    /// Projection onto the reco axis.
    #[must_use]
    pub fn reco_projection(&self) -> Histogram1D {
        self.matrix.projection_x("ResponseReco")
    }

    /// Fraction of generated events that are reconstructed, per truth bin.
    ///
    /// Bins with no generated events are undefined and come out as NaN, so
    /// they stay non-finite through any later multiplication or division.
    ///
    /// # Errors
    /// Returns a binning mismatch if `generated` does not share the truth binning.
    pub fn efficiency(&self, generated: &Histogram1D) -> Result<Histogram1D> {
        let mut efficiency = self.signal_truth();
        efficiency.set_name("Efficiency");
        efficiency.divide(generated)?;
        for (i, &n) in generated.contents().iter().enumerate() {
            if !n.is_normal() {
                efficiency.set_bin(i, f64::NAN, f64::NAN)?;
            }
        }
        report_non_finite(&efficiency);
        Ok(efficiency)
    }

    /// Fraction of reconstructed signal that originates inside the truth range,
    /// per reco bin.
    ///
    /// # Errors
    /// Returns a binning mismatch if `signal_reco` does not share the reco binning.
    pub fn acceptance(&self, signal_reco: &Histogram1D) -> Result<Histogram1D> {
        let mut acceptance = self.reco_projection();
        acceptance.set_name("Acceptance");
        acceptance.divide(signal_reco)?;
        report_non_finite(&acceptance);
        Ok(acceptance)
    }

    /// Checks that measured-side and truth-side histograms match the axes.
    ///
    /// # Errors
    /// Returns [`crate::Error::BinningMismatch`] for the first disagreeing histogram.
    pub fn validate(&self, reco_side: &[&Histogram1D], truth_side: &[&Histogram1D]) -> Result<()> {
        for h in reco_side {
            self.reco_binning()
                .ensure_matches(h.binning(), &format!("reco axis of response vs {}", h.name()))?;
        }
        for h in truth_side {
            self.truth_binning()
                .ensure_matches(h.binning(), &format!("truth axis of response vs {}", h.name()))?;
        }
        Ok(())
    }
}

fn report_non_finite(h: &Histogram1D) {
    let bad = h.non_finite_bins();
    if !bad.is_empty() {
        warn!("{} has non-finite bins {:?}", h.name(), bad);
    }
}
