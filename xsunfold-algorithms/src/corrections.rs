//! The correction chain shared by the point estimate and every toy replica.
//!
//! ```text
//! corrected = (data - background) * acceptance
//! unfolded  = unfold(corrected)
//! absolute  = unfolded / efficiency          total = sum(absolute)
//! relative  = absolute / total
//! absolute /= bin width, relative /= bin width, absolute /= luminosity
//! ```

use xsunfold_core::{Histogram1D, Result};

use crate::unfolder::Unfolder;

pub const ABSOLUTE_NAME: &str = "AbsoluteDiffXs";
pub const RELATIVE_NAME: &str = "RelativeDiffXs";

/// Fixed inputs of the correction chain.
#[derive(Clone, Debug)]
pub struct CorrectionChain {
    background: Histogram1D,
    acceptance: Histogram1D,
    efficiency: Histogram1D,
    luminosity: f64,
    subtract_background: bool,
}

/// Everything one pass of the chain produces.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossSections {
    /// Background-subtracted, acceptance-corrected measurement.
    pub corrected: Histogram1D,
    pub unfolded: Histogram1D,
    pub absolute: Histogram1D,
    pub relative: Histogram1D,
    /// Integrated cross-section (sum of the efficiency-corrected yield over luminosity).
    pub total: f64,
}

impl CorrectionChain {
    #[must_use]
    pub fn new(
        background: Histogram1D,
        acceptance: Histogram1D,
        efficiency: Histogram1D,
        luminosity: f64,
        subtract_background: bool,
    ) -> Self {
        Self {
            background,
            acceptance,
            efficiency,
            luminosity,
            subtract_background,
        }
    }

    /// Background-subtracted measurement before the acceptance correction.
    ///
    /// # Errors
    /// Returns a binning mismatch if `data` and the background disagree.
    pub fn subtract_background(&self, data: &Histogram1D) -> Result<Histogram1D> {
        let mut subtracted = data.clone();
        if self.subtract_background {
            subtracted.add(&self.background, -1.0)?;
        }
        Ok(subtracted)
    }

    /// Runs the whole chain on `data`, resetting `unfolder` first.
    ///
    /// # Errors
    /// Propagates binning mismatches and unfolding failures. Zero
    /// denominators are not errors; they leave non-finite bins.
    pub fn apply(&self, data: &Histogram1D, unfolder: &mut Unfolder) -> Result<CrossSections> {
        let mut corrected = self.subtract_background(data)?;
        corrected.multiply(&self.acceptance)?;
        corrected.set_name("DataCorrected");

        unfolder.reset();
        unfolder.set_measured(corrected.clone());
        let unfolded = unfolder.unfold()?;

        let mut absolute = unfolded.renamed(ABSOLUTE_NAME);
        absolute.divide(&self.efficiency)?;
        let yield_total = absolute.integral();

        let mut relative = absolute.renamed(RELATIVE_NAME);
        relative.scale(1.0 / yield_total);

        absolute.divide_by_bin_width();
        relative.divide_by_bin_width();
        absolute.scale(1.0 / self.luminosity);

        Ok(CrossSections {
            corrected,
            unfolded,
            absolute,
            relative,
            total: yield_total / self.luminosity,
        })
    }
}
