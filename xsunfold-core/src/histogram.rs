//! One-dimensional histograms with fixed binning.
//!
//! A [`Histogram1D`] stores one content and one error per bin. Binning is
//! fixed at construction; arithmetic between histograms requires identical
//! binning and propagates errors in quadrature assuming uncorrelated bins.
//!
//! Ratios with a zero denominator are *not* clamped: the affected bin becomes
//! `inf` or `NaN` and stays that way through subsequent operations.
#![allow(clippy::cast_precision_loss, clippy::float_cmp)]

use std::fmt;

use crate::error::{Error, Result};

/// Relative tolerance used when comparing bin edges.
const EDGE_TOLERANCE: f64 = 1e-9;

/// Strictly increasing bin edges of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Binning {
    edges: Vec<f64>,
}

impl Binning {
    /// Creates a binning from explicit edges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBinning`] if fewer than two edges are given,
    /// any edge is non-finite, or the edges are not strictly increasing.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::InvalidBinning(format!(
                "need at least two edges, got {}",
                edges.len()
            )));
        }
        if let Some(bad) = edges.iter().find(|edge| !edge.is_finite()) {
            return Err(Error::InvalidBinning(format!("non-finite edge {bad}")));
        }
        if let Some(pair) = edges.windows(2).find(|pair| pair[1] <= pair[0]) {
            return Err(Error::InvalidBinning(format!(
                "edges not strictly increasing: {} >= {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { edges })
    }

    /// Creates `n_bins` equal-width bins over `[low, high)`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBinning`] if `n_bins == 0` or `high <= low`.
    pub fn uniform(n_bins: usize, low: f64, high: f64) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::InvalidBinning("zero bins requested".to_string()));
        }
        let width = (high - low) / n_bins as f64;
        let mut edges: Vec<f64> = (0..n_bins).map(|i| low + width * i as f64).collect();
        edges.push(high);
        Self::new(edges)
    }

    /// Single bin over `[0, 1)`, used for total cross-section measurements.
    #[must_use]
    pub fn unit() -> Self {
        Self {
            edges: vec![0.0, 1.0],
        }
    }

    /// Number of bins.
    #[must_use]
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// All bin edges (`n_bins + 1` values).
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Lower edge of bin `i`.
    #[must_use]
    #[inline]
    pub fn low_edge(&self, i: usize) -> f64 {
        self.edges[i]
    }

    /// Upper edge of bin `i`.
    #[must_use]
    #[inline]
    pub fn high_edge(&self, i: usize) -> f64 {
        self.edges[i + 1]
    }

    /// Width of bin `i`.
    #[must_use]
    #[inline]
    pub fn width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    /// Centre of bin `i`.
    #[must_use]
    #[inline]
    pub fn center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    /// Index of the bin containing `x`, or `None` outside the axis range.
    #[must_use]
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if x.is_nan() || x < self.edges[0] || x >= self.edges[self.edges.len() - 1] {
            return None;
        }
        // partition_point returns the first edge strictly greater than x
        Some(self.edges.partition_point(|&edge| edge <= x) - 1)
    }

    /// Returns true if both binnings have the same edges within tolerance.
    #[must_use]
    pub fn matches(&self, other: &Binning) -> bool {
        self.edges.len() == other.edges.len()
            && self.edges.iter().zip(&other.edges).all(|(a, b)| {
                let scale = a.abs().max(b.abs()).max(1.0);
                (a - b).abs() <= EDGE_TOLERANCE * scale
            })
    }

    /// Checks that `other` matches this binning.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] naming `context` when they differ.
    pub fn ensure_matches(&self, other: &Binning, context: &str) -> Result<()> {
        if self.matches(other) {
            Ok(())
        } else {
            Err(Error::mismatch(context, self, other))
        }
    }
}

impl fmt::Display for Binning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bins [{}, {}]",
            self.n_bins(),
            self.edges[0],
            self.edges[self.edges.len() - 1]
        )
    }
}

/// One bin of a [`Histogram1D`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bin {
    pub low_edge: f64,
    pub high_edge: f64,
    pub content: f64,
    pub error: f64,
}

impl Bin {
    /// Bin width.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.high_edge - self.low_edge
    }
}

/// A one-dimensional histogram with per-bin content and error.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    name: String,
    title: String,
    x_title: String,
    binning: Binning,
    contents: Vec<f64>,
    errors: Vec<f64>,
}

impl Histogram1D {
    /// Creates an empty histogram (all contents and errors zero).
    #[must_use]
    pub fn new(name: impl Into<String>, binning: Binning) -> Self {
        let n = binning.n_bins();
        Self {
            name: name.into(),
            title: String::new(),
            x_title: String::new(),
            binning,
            contents: vec![0.0; n],
            errors: vec![0.0; n],
        }
    }

    /// Creates a histogram from contents and errors.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] if either vector length differs
    /// from the number of bins.
    pub fn from_parts(
        name: impl Into<String>,
        binning: Binning,
        contents: Vec<f64>,
        errors: Vec<f64>,
    ) -> Result<Self> {
        let n = binning.n_bins();
        if contents.len() != n {
            return Err(Error::mismatch("histogram contents", n, contents.len()));
        }
        if errors.len() != n {
            return Err(Error::mismatch("histogram errors", n, errors.len()));
        }
        Ok(Self {
            name: name.into(),
            title: String::new(),
            x_title: String::new(),
            binning,
            contents,
            errors,
        })
    }

    /// Builds a histogram whose vectors are known to match the binning.
    pub(crate) fn from_vecs(
        name: impl Into<String>,
        binning: Binning,
        contents: Vec<f64>,
        errors: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(contents.len(), binning.n_bins());
        debug_assert_eq!(errors.len(), binning.n_bins());
        Self {
            name: name.into(),
            title: String::new(),
            x_title: String::new(),
            binning,
            contents,
            errors,
        }
    }

    /// Creates a histogram of event counts with Poisson errors `sqrt(|n|)`.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] if `contents` does not have one value per bin.
    pub fn from_counts(
        name: impl Into<String>,
        binning: Binning,
        contents: Vec<f64>,
    ) -> Result<Self> {
        let errors = contents.iter().map(|c| c.abs().sqrt()).collect();
        Self::from_parts(name, binning, contents, errors)
    }

    /// Histogram name (used as the key when persisting).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns a clone carrying a different name.
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

    pub fn set_x_title(&mut self, title: impl Into<String>) {
        self.x_title = title.into();
    }

    #[must_use]
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    #[must_use]
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    #[must_use]
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    #[must_use]
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    /// Content of bin `i`.
    ///
    /// # Panics
    /// Panics if `i >= n_bins()`.
    #[must_use]
    #[inline]
    pub fn content(&self, i: usize) -> f64 {
        self.contents[i]
    }

    /// Error of bin `i`.
    ///
    /// # Panics
    /// Panics if `i >= n_bins()`.
    #[must_use]
    #[inline]
    pub fn error(&self, i: usize) -> f64 {
        self.errors[i]
    }

    /// Full description of bin `i`.
    #[must_use]
    pub fn bin(&self, i: usize) -> Option<Bin> {
        (i < self.n_bins()).then(|| Bin {
            low_edge: self.binning.low_edge(i),
            high_edge: self.binning.high_edge(i),
            content: self.contents[i],
            error: self.errors[i],
        })
    }

    /// Iterates over all bins in axis order.
    pub fn bins(&self) -> impl Iterator<Item = Bin> + '_ {
        (0..self.n_bins()).filter_map(move |i| self.bin(i))
    }

    /// Sets content and error of bin `i`.
    ///
    /// # Errors
    /// Returns [`Error::BinOutOfRange`] if `i >= n_bins()`.
    pub fn set_bin(&mut self, i: usize, content: f64, error: f64) -> Result<()> {
        let n_bins = self.n_bins();
        if i >= n_bins {
            return Err(Error::BinOutOfRange { index: i, n_bins });
        }
        self.contents[i] = content;
        self.errors[i] = error;
        Ok(())
    }

    /// Replaces all contents, keeping errors.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] on a length mismatch.
    pub fn set_contents(&mut self, contents: &[f64]) -> Result<()> {
        if contents.len() != self.n_bins() {
            return Err(Error::mismatch(
                format!("contents of {}", self.name),
                self.n_bins(),
                contents.len(),
            ));
        }
        self.contents.copy_from_slice(contents);
        Ok(())
    }

    /// Replaces all errors, keeping contents.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] on a length mismatch.
    pub fn set_errors(&mut self, errors: &[f64]) -> Result<()> {
        if errors.len() != self.n_bins() {
            return Err(Error::mismatch(
                format!("errors of {}", self.name),
                self.n_bins(),
                errors.len(),
            ));
        }
        self.errors.copy_from_slice(errors);
        Ok(())
    }

    /// Adds one unit-weight entry at `x`. Returns the filled bin, or `None`
    /// when `x` is outside the axis.
    pub fn fill(&mut self, x: f64) -> Option<usize> {
        let bin = self.binning.find_bin(x)?;
        self.contents[bin] += 1.0;
        self.errors[bin] = self.errors[bin].hypot(1.0);
        Some(bin)
    }

    /// Zeroes all contents and errors, keeping name and binning.
    pub fn reset(&mut self) {
        self.contents.fill(0.0);
        self.errors.fill(0.0);
    }

    /// Zeroes all errors.
    pub fn clear_errors(&mut self) {
        self.errors.fill(0.0);
    }

    /// Adds `factor * other` bin by bin.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] if the binnings differ.
    pub fn add(&mut self, other: &Histogram1D, factor: f64) -> Result<()> {
        self.ensure_same_binning(other, "add")?;
        for i in 0..self.n_bins() {
            self.contents[i] += factor * other.contents[i];
            self.errors[i] = self.errors[i].hypot(factor * other.errors[i]);
        }
        Ok(())
    }

    /// Multiplies bin by bin.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] if the binnings differ.
    pub fn multiply(&mut self, other: &Histogram1D) -> Result<()> {
        self.ensure_same_binning(other, "multiply")?;
        for i in 0..self.n_bins() {
            let (c1, e1) = (self.contents[i], self.errors[i]);
            let (c2, e2) = (other.contents[i], other.errors[i]);
            self.contents[i] = c1 * c2;
            self.errors[i] = (e1 * c2).hypot(e2 * c1);
        }
        Ok(())
    }

    /// Divides bin by bin.
    ///
    /// A zero denominator yields a non-finite bin; nothing is clamped.
    ///
    /// # Errors
    /// Returns [`Error::BinningMismatch`] if the binnings differ.
    pub fn divide(&mut self, other: &Histogram1D) -> Result<()> {
        self.ensure_same_binning(other, "divide")?;
        for i in 0..self.n_bins() {
            let (c1, e1) = (self.contents[i], self.errors[i]);
            let (c2, e2) = (other.contents[i], other.errors[i]);
            self.contents[i] = c1 / c2;
            self.errors[i] = (e1 * c2).hypot(e2 * c1) / (c2 * c2);
        }
        Ok(())
    }

    /// Multiplies every content by `factor` and every error by `|factor|`.
    pub fn scale(&mut self, factor: f64) {
        let abs = factor.abs();
        self.contents.iter_mut().for_each(|c| *c *= factor);
        self.errors.iter_mut().for_each(|e| *e *= abs);
    }

    /// Sum of all bin contents.
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Sum of all bin contents and its error (errors added in quadrature).
    #[must_use]
    pub fn integral_and_error(&self) -> (f64, f64) {
        let error = self.errors.iter().map(|e| e * e).sum::<f64>().sqrt();
        (self.integral(), error)
    }

    /// Divides every bin by its width.
    pub fn divide_by_bin_width(&mut self) {
        for i in 0..self.n_bins() {
            let width = self.binning.width(i);
            self.contents[i] /= width;
            self.errors[i] /= width;
        }
    }

    /// Multiplies every bin by its width (inverse of [`Self::divide_by_bin_width`]).
    pub fn multiply_by_bin_width(&mut self) {
        for i in 0..self.n_bins() {
            let width = self.binning.width(i);
            self.contents[i] *= width;
            self.errors[i] *= width;
        }
    }

    /// Collapses the histogram into one bin over `[0, 1)` holding the
    /// integral and its error.
    #[must_use]
    pub fn collapsed(&self) -> Self {
        let (integral, error) = self.integral_and_error();
        let mut total = Self::new(self.name.clone(), Binning::unit());
        total.title.clone_from(&self.title);
        total.contents[0] = integral;
        total.errors[0] = error;
        total
    }

    /// Indices of bins whose content is NaN or infinite.
    #[must_use]
    pub fn non_finite_bins(&self) -> Vec<usize> {
        self.contents
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_finite())
            .map(|(i, _)| i)
            .collect()
    }

    fn ensure_same_binning(&self, other: &Histogram1D, op: &str) -> Result<()> {
        self.binning.ensure_matches(
            &other.binning,
            &format!("{op} {} with {}", self.name, other.name),
        )
    }
}
