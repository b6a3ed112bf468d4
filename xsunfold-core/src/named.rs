//! Borrowed views over histograms of either dimension, keyed by name.

use crate::histogram::Histogram1D;
use crate::histogram2d::Histogram2D;

/// A borrowed 1D or 2D histogram, as handed to persistence sinks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistogramRef<'a> {
    OneD(&'a Histogram1D),
    TwoD(&'a Histogram2D),
}

impl HistogramRef<'_> {
    /// Name under which the histogram is stored.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::OneD(h) => h.name(),
            Self::TwoD(h) => h.name(),
        }
    }
}

impl<'a> From<&'a Histogram1D> for HistogramRef<'a> {
    fn from(h: &'a Histogram1D) -> Self {
        Self::OneD(h)
    }
}

impl<'a> From<&'a Histogram2D> for HistogramRef<'a> {
    fn from(h: &'a Histogram2D) -> Self {
        Self::TwoD(h)
    }
}
