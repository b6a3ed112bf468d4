//! Two-dimensional histograms.
//!
//! Cells are stored in row-major [`Array2`] buffers indexed `[x, y]`. For a
//! response matrix the x axis is the reco axis and the y axis is the truth
//! axis.
#![allow(clippy::float_cmp)]

use ndarray::{Array2, Axis};

use crate::error::{Error, Result};
use crate::histogram::{Binning, Histogram1D};

/// A two-dimensional histogram with per-cell content and error.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    name: String,
    title: String,
    x_title: String,
    y_title: String,
    x_binning: Binning,
    y_binning: Binning,
    contents: Array2<f64>,
    errors: Array2<f64>,
}

impl Histogram2D {
    /// Creates an empty histogram.
    #[must_use]
    pub fn new(name: impl Into<String>, x_binning: Binning, y_binning: Binning) -> Self {
        let shape = (x_binning.n_bins(), y_binning.n_bins());
        Self {
            name: name.into(),
            title: String::new(),
            x_title: String::new(),
            y_title: String::new(),
            x_binning,
            y_binning,
            contents: Array2::zeros(shape),
            errors: Array2::zeros(shape),
        }
    }

    /// Creates a histogram from content and error matrices shaped `[nx, ny]`.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] if a matrix shape disagrees with the binnings.
    pub fn from_parts(
        name: impl Into<String>,
        x_binning: Binning,
        y_binning: Binning,
        contents: Array2<f64>,
        errors: Array2<f64>,
    ) -> Result<Self> {
        let shape = [x_binning.n_bins(), y_binning.n_bins()];
        for (what, matrix) in [("contents", &contents), ("errors", &errors)] {
            if matrix.shape() != shape {
                return Err(Error::mismatch(
                    format!("2D histogram {what}"),
                    format!("{}x{}", shape[0], shape[1]),
                    format!("{}x{}", matrix.nrows(), matrix.ncols()),
                ));
            }
        }
        Ok(Self {
            name: name.into(),
            title: String::new(),
            x_title: String::new(),
            y_title: String::new(),
            x_binning,
            y_binning,
            contents,
            errors,
        })
    }

    /// Creates a histogram whose errors are `sqrt(|content|)`.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] on a shape mismatch.
    pub fn from_counts(
        name: impl Into<String>,
        x_binning: Binning,
        y_binning: Binning,
        contents: Array2<f64>,
    ) -> Result<Self> {
        let errors = contents.mapv(|c| c.abs().sqrt());
        Self::from_parts(name, x_binning, y_binning, contents, errors)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.name = name.into();
        copy
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    #[must_use]
    pub fn x_title(&self) -> &str {
        &self.x_title
    }

    #[must_use]
    pub fn y_title(&self) -> &str {
        &self.y_title
    }

    pub fn set_axis_titles(&mut self, x_title: impl Into<String>, y_title: impl Into<String>) {
        self.x_title = x_title.into();
        self.y_title = y_title.into();
    }

    #[must_use]
    pub fn x_binning(&self) -> &Binning {
        &self.x_binning
    }

    #[must_use]
    pub fn y_binning(&self) -> &Binning {
        &self.y_binning
    }

    /// Number of bins along the x axis.
    #[must_use]
    pub fn nx(&self) -> usize {
        self.contents.nrows()
    }

    /// Number of bins along the y axis.
    #[must_use]
    pub fn ny(&self) -> usize {
        self.contents.ncols()
    }

    #[must_use]
    pub fn contents(&self) -> &Array2<f64> {
        &self.contents
    }

    #[must_use]
    pub fn errors(&self) -> &Array2<f64> {
        &self.errors
    }

    /// Content of cell `(ix, iy)`.
    ///
    /// # Panics
    /// Panics if either index is out of range.
    #[must_use]
    #[inline]
    pub fn content(&self, ix: usize, iy: usize) -> f64 {
        self.contents[[ix, iy]]
    }

    /// Error of cell `(ix, iy)`.
    ///
    /// # Panics
    /// Panics if either index is out of range.
    #[must_use]
    #[inline]
    pub fn error(&self, ix: usize, iy: usize) -> f64 {
        self.errors[[ix, iy]]
    }

    /// Sets content and error of one cell.
    ///
    /// # Errors
    /// Returns [`Error::BinOutOfRange`] if either index is out of range.
    pub fn set_cell(&mut self, ix: usize, iy: usize, content: f64, error: f64) -> Result<()> {
        if ix >= self.nx() {
            return Err(Error::BinOutOfRange {
                index: ix,
                n_bins: self.nx(),
            });
        }
        if iy >= self.ny() {
            return Err(Error::BinOutOfRange {
                index: iy,
                n_bins: self.ny(),
            });
        }
        self.contents[[ix, iy]] = content;
        self.errors[[ix, iy]] = error;
        Ok(())
    }

    /// Projects onto the x axis, summing over y. Errors add in quadrature.
    #[must_use]
    pub fn projection_x(&self, name: impl Into<String>) -> Histogram1D {
        self.project(name, Axis(1), self.x_binning.clone(), &self.x_title)
    }

    /// Projects onto the y axis, summing over x. Errors add in quadrature.
    #[must_use]
    pub fn projection_y(&self, name: impl Into<String>) -> Histogram1D {
        self.project(name, Axis(0), self.y_binning.clone(), &self.y_title)
    }

    fn project(
        &self,
        name: impl Into<String>,
        summed: Axis,
        binning: Binning,
        axis_title: &str,
    ) -> Histogram1D {
        let contents = self.contents.sum_axis(summed).to_vec();
        let errors = self
            .errors
            .mapv(|e| e * e)
            .sum_axis(summed)
            .mapv(f64::sqrt)
            .to_vec();
        let mut projection = Histogram1D::from_vecs(name, binning, contents, errors);
        projection.set_x_title(axis_title);
        projection
    }

    /// Swaps the axes in place, including binnings and axis titles.
    pub fn transpose(&mut self) {
        self.contents = self.contents.t().as_standard_layout().into_owned();
        self.errors = self.errors.t().as_standard_layout().into_owned();
        std::mem::swap(&mut self.x_binning, &mut self.y_binning);
        std::mem::swap(&mut self.x_title, &mut self.y_title);
    }

    /// Returns a transposed copy.
    #[must_use]
    pub fn transposed(&self) -> Self {
        let mut copy = self.clone();
        copy.transpose();
        copy
    }

    /// Multiplies every content by `factor` and every error by `|factor|`.
    pub fn scale(&mut self, factor: f64) {
        let abs = factor.abs();
        self.contents.mapv_inplace(|c| c * factor);
        self.errors.mapv_inplace(|e| e * abs);
    }

    /// Sum of all cell contents.
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.contents.sum()
    }

    /// Sum of all cell contents and its error.
    #[must_use]
    pub fn integral_and_error(&self) -> (f64, f64) {
        (self.integral(), self.errors.mapv(|e| e * e).sum().sqrt())
    }

    /// Collapses into a single cell over `[0, 1) x [0, 1)`.
    #[must_use]
    pub fn collapsed(&self) -> Self {
        let (integral, error) = self.integral_and_error();
        let mut total = Self::new(self.name.clone(), Binning::unit(), Binning::unit());
        total.title.clone_from(&self.title);
        total.x_title.clone_from(&self.x_title);
        total.y_title.clone_from(&self.y_title);
        total.contents[[0, 0]] = integral;
        total.errors[[0, 0]] = error;
        total
    }

    /// Number of cells with a NaN or infinite content.
    #[must_use]
    pub fn count_non_finite(&self) -> usize {
        self.contents.iter().filter(|c| !c.is_finite()).count()
    }
}
