//! Toy ensemble estimator.
//!
//! Each replica smears the measured histogram, reruns the full
//! [`CorrectionChain`] and records its absolute and relative cross-sections.
//! Replicas run on the rayon pool, one cloned [`Unfolder`] per worker. Toy
//! `i` draws from `StdRng::seed_from_u64(seed + i)` and writes into row `i`
//! of a pre-allocated arena; the reduction walks the arena in toy order, so
//! results do not depend on thread count or scheduling.
#![allow(clippy::cast_precision_loss)]

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use rayon::prelude::*;
use xsunfold_core::{Binning, Error, Histogram1D, Histogram2D, Result};

use crate::corrections::{CorrectionChain, CrossSections};
use crate::moments::{correlation, mean_and_rms, GaussianFit, MomentAccumulator};
use crate::unfolder::Unfolder;

/// Bins of each per-bin toy distribution.
const DISTRIBUTION_BINS: usize = 100;
/// Bins of the pull histograms over `[-PULL_RANGE, PULL_RANGE]`.
const PULL_BINS: usize = 30;
const PULL_RANGE: f64 = 3.0;

/// How a measured histogram is fluctuated for one replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmearingMode {
    /// Replace each bin with a Poisson draw around its content.
    Poisson,
    /// Replace each bin with a Gaussian draw, width equal to the bin error.
    Gauss,
}

impl SmearingMode {
    /// Returns a fluctuated copy of `histogram`.
    ///
    /// Poisson mode maps non-positive or non-finite means to zero and sets
    /// errors to `sqrt(n)`. Gauss mode keeps the errors; a zero error leaves
    /// the content unchanged.
    ///
    /// # Errors
    /// Returns [`Error::NumericalDegeneracy`] if a bin cannot be sampled
    /// (negative or NaN Gaussian width).
    pub fn smear<R: Rng + ?Sized>(self, histogram: &Histogram1D, rng: &mut R) -> Result<Histogram1D> {
        let n = histogram.n_bins();
        let mut contents = Vec::with_capacity(n);
        let mut errors = Vec::with_capacity(n);
        for bin in histogram.bins() {
            match self {
                Self::Poisson => {
                    let lambda = bin.content;
                    let draw: f64 = if lambda.is_finite() && lambda > 0.0 {
                        Poisson::new(lambda)
                            .map_err(|e| {
                                Error::NumericalDegeneracy(format!(
                                    "cannot draw Poisson({lambda}): {e}"
                                ))
                            })?
                            .sample(rng)
                    } else {
                        0.0
                    };
                    contents.push(draw);
                    errors.push(draw.sqrt());
                }
                Self::Gauss => {
                    let normal = Normal::new(bin.content, bin.error).map_err(|e| {
                        Error::NumericalDegeneracy(format!(
                            "cannot draw Gauss({}, {}): {e}",
                            bin.content, bin.error
                        ))
                    })?;
                    contents.push(normal.sample(rng));
                    errors.push(bin.error);
                }
            }
        }
        let mut smeared =
            Histogram1D::from_parts(histogram.name(), histogram.binning().clone(), contents, errors)?;
        smeared.set_title(histogram.title());
        smeared.set_x_title(histogram.x_title());
        Ok(smeared)
    }
}

/// Toy ensemble settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToyConfig {
    pub n_toys: usize,
    pub seed: u64,
    pub mode: SmearingMode,
}

impl Default for ToyConfig {
    fn default() -> Self {
        Self {
            n_toys: 10_000,
            seed: 0,
            mode: SmearingMode::Poisson,
        }
    }
}

impl ToyConfig {
    #[must_use]
    pub fn with_n_toys(mut self, n_toys: usize) -> Self {
        self.n_toys = n_toys;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SmearingMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Uncertainty model for one cross-section flavour (absolute or relative).
#[derive(Clone, Debug, PartialEq)]
pub struct ToyErrors {
    /// Toy mean per truth bin.
    pub mean: Vec<f64>,
    /// RMS of the toy values per truth bin.
    pub rms: Vec<f64>,
    pub covariance: Histogram2D,
    pub correlation: Histogram2D,
    /// Covariance diagonal, off-diagonal cells zero.
    pub variance: Histogram2D,
    /// Fitted pull mean per bin (NaN where the fit failed).
    pub pull_mean: Histogram1D,
    /// Fitted pull width per bin (NaN where the fit failed).
    pub pull_width: Histogram1D,
    /// Toy value distribution per truth bin.
    pub distributions: Vec<Histogram1D>,
}

/// Everything the ensemble produces.
#[derive(Clone, Debug, PartialEq)]
pub struct ToyResult {
    pub n_toys: usize,
    pub absolute: ToyErrors,
    pub relative: ToyErrors,
    pub data_distributions: Vec<Histogram1D>,
    pub unfolded_distributions: Vec<Histogram1D>,
    pub total_distribution: Histogram1D,
}

impl ToyResult {
    /// One-dimensional histograms owned by the result.
    #[must_use]
    pub fn histograms_1d(&self) -> Vec<&Histogram1D> {
        let mut out = vec![
            &self.absolute.pull_mean,
            &self.absolute.pull_width,
            &self.relative.pull_mean,
            &self.relative.pull_width,
        ];
        out.extend(self.absolute.distributions.iter());
        out.extend(self.relative.distributions.iter());
        out.extend(self.unfolded_distributions.iter());
        out.extend(self.data_distributions.iter());
        out.push(&self.total_distribution);
        out
    }

    #[must_use]
    pub fn histograms_2d(&self) -> Vec<&Histogram2D> {
        vec![
            &self.absolute.covariance,
            &self.relative.covariance,
            &self.absolute.correlation,
            &self.relative.correlation,
            &self.absolute.variance,
            &self.relative.variance,
        ]
    }
}

/// Row layout inside the replica arena.
#[derive(Clone, Copy, Debug)]
struct RowLayout {
    n_truth: usize,
    n_reco: usize,
}

impl RowLayout {
    fn width(self) -> usize {
        3 * self.n_truth + self.n_reco + 1
    }

    fn absolute(self) -> std::ops::Range<usize> {
        0..self.n_truth
    }

    fn relative(self) -> std::ops::Range<usize> {
        self.n_truth..2 * self.n_truth
    }

    fn data(self) -> std::ops::Range<usize> {
        2 * self.n_truth..2 * self.n_truth + self.n_reco
    }

    fn unfolded(self) -> std::ops::Range<usize> {
        let start = 2 * self.n_truth + self.n_reco;
        start..start + self.n_truth
    }

    fn total(self) -> usize {
        self.width() - 1
    }
}

/// Runs replicas of the correction chain around a nominal result.
#[derive(Clone, Copy, Debug)]
pub struct ToyEnsemble<'a> {
    chain: &'a CorrectionChain,
    data: &'a Histogram1D,
    nominal: &'a CrossSections,
    config: ToyConfig,
}

impl<'a> ToyEnsemble<'a> {
    #[must_use]
    pub fn new(
        chain: &'a CorrectionChain,
        data: &'a Histogram1D,
        nominal: &'a CrossSections,
        config: ToyConfig,
    ) -> Self {
        Self {
            chain,
            data,
            nominal,
            config,
        }
    }

    /// Runs the ensemble.
    ///
    /// Any failing replica aborts the whole estimation.
    ///
    /// # Errors
    /// Returns [`Error::Precondition`] for `n_toys == 0`, and propagates
    /// smearing and unfolding failures.
    pub fn run(&self, unfolder: &Unfolder) -> Result<ToyResult> {
        let n_toys = self.config.n_toys;
        if n_toys == 0 {
            return Err(Error::Precondition(
                "toy ensemble needs at least one replica".into(),
            ));
        }
        let layout = RowLayout {
            n_truth: self.nominal.absolute.n_bins(),
            n_reco: self.data.n_bins(),
        };
        let width = layout.width();
        info!(
            "running {n_toys} toys ({:?} smearing, seed {})",
            self.config.mode, self.config.seed
        );

        let mut arena = vec![0.0; n_toys * width];
        let finished = AtomicUsize::new(0);
        let step = (n_toys / 10).max(1);

        arena
            .par_chunks_mut(width)
            .enumerate()
            .try_for_each_init(
                || unfolder.clone(),
                |worker, (toy, row)| -> Result<()> {
                    let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(toy as u64));
                    let smeared = self.config.mode.smear(self.data, &mut rng)?;
                    worker.set_seed(rng.gen());
                    let sections = self.chain.apply(&smeared, worker)?;

                    row[layout.absolute()].copy_from_slice(sections.absolute.contents());
                    row[layout.relative()].copy_from_slice(sections.relative.contents());
                    row[layout.data()].copy_from_slice(smeared.contents());
                    row[layout.unfolded()].copy_from_slice(sections.unfolded.contents());
                    row[layout.total()] = sections.total;

                    let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % step == 0 {
                        info!("toys: {done}/{n_toys} ({}%)", done * 100 / n_toys);
                    }
                    Ok(())
                },
            )?;

        self.reduce(&arena, layout)
    }

    fn reduce(&self, arena: &[f64], layout: RowLayout) -> Result<ToyResult> {
        let width = layout.width();
        let rows = || arena.chunks_exact(width);
        let truth = self.nominal.absolute.binning();

        let absolute = self.errors_for(
            &self.nominal.absolute,
            "abs",
            "Abs",
            rows().map(|row| &row[layout.absolute()]),
        )?;
        let relative = self.errors_for(
            &self.nominal.relative,
            "rel",
            "Rel",
            rows().map(|row| &row[layout.relative()]),
        )?;

        let column = |offset: usize| -> Vec<f64> { rows().map(|row| row[offset]).collect() };
        let mut data_distributions = Vec::with_capacity(layout.n_reco);
        for (i, r) in layout.data().enumerate() {
            data_distributions.push(distribution(
                format!("Data_toy_bin_{i}"),
                self.data.content(i),
                &column(r),
            )?);
        }
        let mut unfolded_distributions = Vec::with_capacity(layout.n_truth);
        for (i, r) in layout.unfolded().enumerate() {
            unfolded_distributions.push(distribution(
                format!("Unfolded_toy_bin_{i}"),
                self.nominal.unfolded.content(i),
                &column(r),
            )?);
        }
        let total_distribution =
            distribution("TotalXs_toys".to_string(), self.nominal.total, &column(layout.total()))?;
        debug!("toy reduction done over {} truth bins", truth.n_bins());

        Ok(ToyResult {
            n_toys: arena.len() / width,
            absolute,
            relative,
            data_distributions,
            unfolded_distributions,
            total_distribution,
        })
    }

    fn errors_for<'r>(
        &self,
        nominal: &Histogram1D,
        suffix: &str,
        prefix: &str,
        rows: impl Iterator<Item = &'r [f64]>,
    ) -> Result<ToyErrors> {
        let n = nominal.n_bins();
        let binning = nominal.binning().clone();
        let mut moments = MomentAccumulator::new(nominal.contents());
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); n];
        for row in rows {
            moments.push(row);
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(*value);
            }
        }

        let covariance = moments.covariance();
        let corr = correlation(&covariance, n);
        let to_matrix = |name: String, values: &dyn Fn(usize, usize) -> f64| {
            Histogram2D::from_parts(
                name,
                binning.clone(),
                binning.clone(),
                Array2::from_shape_fn((n, n), |(i, j)| values(i, j)),
                Array2::zeros((n, n)),
            )
        };
        let covariance_h = to_matrix(format!("Covariance_{suffix}"), &|i, j| covariance[i * n + j])?;
        let correlation_h = to_matrix(format!("Correlation_{suffix}"), &|i, j| corr[i * n + j])?;
        let variance_h = to_matrix(format!("Variance_{suffix}"), &|i, j| {
            if i == j {
                covariance[i * n + i]
            } else {
                0.0
            }
        })?;

        let mut mean = Vec::with_capacity(n);
        let mut rms = Vec::with_capacity(n);
        let mut pull_mean = Histogram1D::new(format!("PullTestMean_{suffix}"), binning.clone());
        let mut pull_width = Histogram1D::new(format!("PullTestError_{suffix}"), binning.clone());
        let mut distributions = Vec::with_capacity(n);
        for (i, values) in columns.iter().enumerate() {
            let (m, spread) = mean_and_rms(values);
            mean.push(m);
            rms.push(spread);
            let fit = pull_fit(values, nominal.content(i), spread)?;
            match fit {
                Some(fit) => {
                    pull_mean.set_bin(i, fit.mean, fit.mean_error)?;
                    pull_width.set_bin(i, fit.sigma, fit.sigma_error)?;
                }
                None => {
                    debug!("pull fit failed for {prefix} bin {i}");
                    pull_mean.set_bin(i, f64::NAN, 0.0)?;
                    pull_width.set_bin(i, f64::NAN, 0.0)?;
                }
            }
            distributions.push(distribution(
                format!("{prefix}_toy_bin_{i}"),
                nominal.content(i),
                values,
            )?);
        }

        Ok(ToyErrors {
            mean,
            rms,
            covariance: covariance_h,
            correlation: correlation_h,
            variance: variance_h,
            pull_mean,
            pull_width,
            distributions,
        })
    }
}

/// Histogram of toy values on 100 bins over `[0.5, 1.5] x nominal`.
fn distribution(name: String, nominal: f64, values: &[f64]) -> Result<Histogram1D> {
    let (low, high) = if nominal.is_finite() && nominal != 0.0 {
        let (a, b) = (0.5 * nominal, 1.5 * nominal);
        (a.min(b), a.max(b))
    } else {
        (-1.0, 1.0)
    };
    let mut histogram = Histogram1D::new(name, Binning::uniform(DISTRIBUTION_BINS, low, high)?);
    for &value in values {
        histogram.fill(value);
    }
    Ok(histogram)
}

/// Gaussian fit of `(x - nominal) / rms` histogrammed on `[-3, 3]`.
fn pull_fit(values: &[f64], nominal: f64, rms: f64) -> Result<Option<GaussianFit>> {
    if rms <= 0.0 || !rms.is_finite() || !nominal.is_finite() {
        return Ok(None);
    }
    let mut pulls = Histogram1D::new("pull", Binning::uniform(PULL_BINS, -PULL_RANGE, PULL_RANGE)?);
    for &value in values {
        pulls.fill((value - nominal) / rms);
    }
    let centers: Vec<f64> = (0..PULL_BINS).map(|i| pulls.binning().center(i)).collect();
    Ok(GaussianFit::fit(&centers, pulls.contents()))
}
