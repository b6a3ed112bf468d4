//! Moment statistics over toy replicas.
//!
//! Covariances are accumulated on shifted data: every value is taken
//! relative to the nominal estimate of its bin before summing, which keeps
//! the sums small and avoids the cancellation of the naive
//! `E[xy] - E[x]E[y]` form.
#![allow(clippy::cast_precision_loss)]

use nalgebra::{Matrix3, Vector3};

/// Running first and second moments for `n` correlated quantities.
#[derive(Clone, Debug)]
pub struct MomentAccumulator {
    shift: Vec<f64>,
    sum: Vec<f64>,
    /// Lower triangle `(i, j <= i)` in row-major order.
    products: Vec<f64>,
    count: usize,
}

impl MomentAccumulator {
    /// Creates an accumulator shifted by `reference`; non-finite references
    /// fall back to zero.
    #[must_use]
    pub fn new(reference: &[f64]) -> Self {
        let n = reference.len();
        Self {
            shift: reference
                .iter()
                .map(|r| if r.is_finite() { *r } else { 0.0 })
                .collect(),
            sum: vec![0.0; n],
            products: vec![0.0; n * (n + 1) / 2],
            count: 0,
        }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.shift.len()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Adds one replica.
    pub fn push(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.dim());
        let mut k = 0;
        for i in 0..self.dim() {
            let di = values[i] - self.shift[i];
            self.sum[i] += di;
            for j in 0..=i {
                self.products[k] += di * (values[j] - self.shift[j]);
                k += 1;
            }
        }
        self.count += 1;
    }

    /// Means of all quantities.
    #[must_use]
    pub fn mean(&self) -> Vec<f64> {
        let n = self.count as f64;
        self.sum
            .iter()
            .zip(&self.shift)
            .map(|(s, k)| k + s / n)
            .collect()
    }

    /// Population covariance `(1/N) sum (x_i - mean_i)(x_j - mean_j)`,
    /// row-major and symmetric.
    #[must_use]
    pub fn covariance(&self) -> Vec<f64> {
        let dim = self.dim();
        let n = self.count as f64;
        let mut cov = vec![0.0; dim * dim];
        let mut k = 0;
        for i in 0..dim {
            let di = self.sum[i] / n;
            for j in 0..=i {
                let value = self.products[k] / n - di * (self.sum[j] / n);
                cov[i * dim + j] = value;
                cov[j * dim + i] = value;
                k += 1;
            }
        }
        cov
    }
}

/// Correlation matrix from a row-major covariance. Pairs involving a
/// zero-variance quantity get correlation 0.
#[must_use]
pub fn correlation(covariance: &[f64], dim: usize) -> Vec<f64> {
    let mut corr = vec![0.0; dim * dim];
    for i in 0..dim {
        for j in 0..dim {
            let denom = (covariance[i * dim + i] * covariance[j * dim + j]).sqrt();
            corr[i * dim + j] = if denom == 0.0 {
                0.0
            } else {
                covariance[i * dim + j] / denom
            };
        }
    }
    corr
}

/// Mean and RMS spread (two-pass) of a sample.
#[must_use]
pub fn mean_and_rms(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Result of a Gaussian fit to a binned distribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianFit {
    pub mean: f64,
    pub sigma: f64,
    pub mean_error: f64,
    pub sigma_error: f64,
}

impl GaussianFit {
    /// Fits `exp(a + b x + c x^2)` to non-empty bins by weighted least
    /// squares on `ln(y)` with weights `y^2`.
    ///
    /// Returns `None` with fewer than three filled bins or when the fitted
    /// parabola does not open downwards.
    #[must_use]
    pub fn fit(centers: &[f64], counts: &[f64]) -> Option<Self> {
        let mut normal = Matrix3::<f64>::zeros();
        let mut rhs = Vector3::<f64>::zeros();
        let mut filled = 0;
        let mut entries = 0.0;
        for (&x, &y) in centers.iter().zip(counts) {
            if y.is_nan() || y <= 0.0 {
                continue;
            }
            filled += 1;
            entries += y;
            let w = y * y;
            let basis = Vector3::new(1.0, x, x * x);
            normal += basis * basis.transpose() * w;
            rhs += basis * (w * y.ln());
        }
        if filled < 3 {
            return None;
        }
        let coefficients = normal.lu().solve(&rhs)?;
        let (b, c) = (coefficients[1], coefficients[2]);
        if c.is_nan() || c >= 0.0 {
            return None;
        }
        let sigma = (-1.0 / (2.0 * c)).sqrt();
        let mean = -b / (2.0 * c);
        Some(Self {
            mean,
            sigma,
            mean_error: sigma / entries.sqrt(),
            sigma_error: sigma / (2.0 * entries).sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_covariance_matches_direct_formula() {
        let samples = [
            [1.0, 2.0, 0.5],
            [2.0, 1.0, 0.7],
            [3.0, 5.0, 0.1],
            [4.0, 3.0, 0.9],
        ];
        let mut acc = MomentAccumulator::new(&[2.0, 2.0, 0.5]);
        for s in &samples {
            acc.push(s);
        }
        let mean = acc.mean();
        let cov = acc.covariance();
        for i in 0..3 {
            for j in 0..3 {
                let direct: f64 = samples
                    .iter()
                    .map(|s| (s[i] - mean[i]) * (s[j] - mean[j]))
                    .sum::<f64>()
                    / 4.0;
                assert_relative_eq!(cov[i * 3 + j], direct, epsilon = 1e-12);
                assert_eq!(cov[i * 3 + j], cov[j * 3 + i]);
            }
        }
        assert_relative_eq!(mean[0], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_reference_shifts_by_zero() {
        let mut acc = MomentAccumulator::new(&[f64::NAN]);
        acc.push(&[1.0]);
        acc.push(&[3.0]);
        assert_eq!(acc.mean(), vec![2.0]);
        assert_eq!(acc.covariance(), vec![1.0]);
    }

    #[test]
    fn test_correlation_diagonal_and_zero_variance() {
        let cov = vec![4.0, 2.0, 0.0, 2.0, 9.0, 0.0, 0.0, 0.0, 0.0];
        let corr = correlation(&cov, 3);
        assert_eq!(corr[0], 1.0);
        assert_eq!(corr[4], 1.0);
        assert_relative_eq!(corr[1], 2.0 / 6.0, epsilon = 1e-12);
        assert_eq!(corr[8], 0.0);
        assert_eq!(corr[2], 0.0);
    }

    #[test]
    fn test_mean_and_rms() {
        let (mean, rms) = mean_and_rms(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(rms, 2.0);
        assert_eq!(mean_and_rms(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_gaussian_fit_recovers_parameters() {
        let (mu, sigma) = (0.3, 0.8);
        let centers: Vec<f64> = (0..30).map(|i| -3.0 + 0.1 + 0.2 * f64::from(i)).collect();
        let counts: Vec<f64> = centers
            .iter()
            .map(|x| 1000.0 * (-(x - mu) * (x - mu) / (2.0 * sigma * sigma)).exp())
            .collect();
        let fit = GaussianFit::fit(&centers, &counts).unwrap();
        assert_relative_eq!(fit.mean, mu, epsilon = 1e-6);
        assert_relative_eq!(fit.sigma, sigma, epsilon = 1e-6);
        assert!(fit.mean_error > 0.0);
    }

    #[test]
    fn test_gaussian_fit_needs_three_bins() {
        assert!(GaussianFit::fit(&[0.0, 1.0], &[5.0, 3.0]).is_none());
        assert!(GaussianFit::fit(&[0.0, 1.0, 2.0], &[1.0, 2.0, 8.0]).is_none());
    }
}
