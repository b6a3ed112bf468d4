//! Unfolding as a quadratic unconstrained binary optimization.
//!
//! Each truth bin `x_j` is written as `step_j * sum_k 2^k q_jk` over binary
//! variables `q`. The least-squares objective with a curvature penalty,
//!
//! ```text
//! |M x - b|^2 + lambda |L x|^2
//! ```
//!
//! expands (dropping the constant `b.b`) to `x^T H x + c.x` with
//! `H = M^T M + lambda L^T L` and `c = -2 M^T b`. Substituting `x = E q`
//! and folding the linear term onto the diagonal (`q^2 = q` for binary
//! variables) gives the QUBO matrix `Q = E^T H E + diag(E^T c)`.
//!
//! `E^T H E` depends only on the response, the penalty and the encoding; it is
//! built once in [`QuboUnfolding::prepare`]. The diagonal term is rebuilt for
//! every measured vector.

use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use xsunfold_core::ResponseModel;

use crate::annealing::{steepest_descent, Sample, SimulatedAnnealer};
use crate::backend::SolverBackend;
use crate::linalg::{laplacian, migration_matrix, to_vector};
use crate::method::QuboSolverKind;
use crate::unfolder::Solution;

/// Binary encoding of the truth vector.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryEncoding {
    bits: Vec<u32>,
    steps: Vec<f64>,
    offsets: Vec<usize>,
    n_vars: usize,
}

impl BinaryEncoding {
    /// Chooses per-bin widths so that `[0, bound_j]` is representable.
    ///
    /// Bins whose bound needs more than `max_bits` bits use a coarser step.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    #[must_use]
    pub fn new(bounds: &[f64], max_bits: u32) -> Self {
        let max_bits = max_bits.max(1);
        let mut bits = Vec::with_capacity(bounds.len());
        let mut steps = Vec::with_capacity(bounds.len());
        let mut offsets = Vec::with_capacity(bounds.len());
        let mut n_vars = 0;
        for &bound in bounds {
            let bound = if bound.is_finite() { bound.max(1.0) } else { 1.0 };
            let needed = (bound + 1.0).log2().ceil() as u32;
            let width = needed.clamp(1, max_bits);
            let capacity = ((1_u64 << width) - 1) as f64;
            let step = if capacity >= bound { 1.0 } else { bound / capacity };
            offsets.push(n_vars);
            bits.push(width);
            steps.push(step);
            n_vars += width as usize;
        }
        Self {
            bits,
            steps,
            offsets,
            n_vars,
        }
    }

    /// Total number of binary variables.
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    #[must_use]
    pub fn bits(&self) -> &[u32] {
        &self.bits
    }

    #[must_use]
    pub fn steps(&self) -> &[f64] {
        &self.steps
    }

    /// The `n_bins x n_vars` matrix mapping bits to bin values.
    #[must_use]
    pub fn matrix(&self) -> DMatrix<f64> {
        let mut matrix = DMatrix::zeros(self.bits.len(), self.n_vars);
        for (j, (&width, &step)) in self.bits.iter().zip(&self.steps).enumerate() {
            let mut weight = step;
            for k in 0..width as usize {
                matrix[(j, self.offsets[j] + k)] = weight;
                weight *= 2.0;
            }
        }
        matrix
    }

    /// Bin values encoded by `state`.
    #[must_use]
    pub fn decode(&self, state: &[u8]) -> Vec<f64> {
        self.bits
            .iter()
            .zip(&self.steps)
            .zip(&self.offsets)
            .map(|((&width, &step), &offset)| {
                let mut value = 0.0;
                let mut weight = step;
                for &bit in &state[offset..offset + width as usize] {
                    if bit != 0 {
                        value += weight;
                    }
                    weight *= 2.0;
                }
                value
            })
            .collect()
    }
}

/// A symmetric QUBO matrix; the energy of `q` is `q^T Q q`.
#[derive(Clone, Debug)]
pub struct QuboProblem {
    matrix: DMatrix<f64>,
}

impl QuboProblem {
    #[must_use]
    pub fn new(matrix: DMatrix<f64>) -> Self {
        Self { matrix }
    }

    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.matrix.nrows()
    }

    #[must_use]
    #[inline]
    pub fn coupling(&self, a: usize, b: usize) -> f64 {
        self.matrix[(a, b)]
    }

    /// Energy of a binary state.
    #[must_use]
    pub fn energy(&self, state: &[u8]) -> f64 {
        let n = self.n_vars();
        let mut energy = 0.0;
        for a in (0..n).filter(|&a| state[a] != 0) {
            for b in (0..n).filter(|&b| state[b] != 0) {
                energy += self.matrix[(a, b)];
            }
        }
        energy
    }
}

/// Prepared QUBO unfolding: migration matrix, encoding and the quadratic part.
#[derive(Clone, Debug)]
pub struct QuboUnfolding {
    migration: DMatrix<f64>,
    encoding: BinaryEncoding,
    encoding_matrix: DMatrix<f64>,
    quadratic: DMatrix<f64>,
    solver: QuboSolverKind,
}

impl QuboUnfolding {
    /// Builds the encoding from the measured total and the truth shape of the
    /// response: bin `j` may reach twice its expected share of the measurement.
    #[must_use]
    pub fn prepare(
        response: &ResponseModel,
        measured: &[f64],
        strength: f64,
        solver: QuboSolverKind,
        max_bits: u32,
    ) -> Self {
        let migration = migration_matrix(response.matrix());
        let n_truth = migration.ncols();

        let truth = response.signal_truth();
        let truth_total = truth.integral();
        let measured_total: f64 = measured.iter().filter(|b| b.is_finite()).sum();
        #[allow(clippy::cast_precision_loss)]
        let bounds: Vec<f64> = truth
            .contents()
            .iter()
            .map(|t| {
                let share = if truth_total > 0.0 {
                    t / truth_total
                } else {
                    1.0 / n_truth as f64
                };
                (2.0 * measured_total * share).ceil()
            })
            .collect();
        let encoding = BinaryEncoding::new(&bounds, max_bits);
        let encoding_matrix = encoding.matrix();

        let curvature = laplacian(n_truth);
        let hessian = migration.transpose() * &migration
            + (curvature.transpose() * &curvature) * strength;
        let quadratic = encoding_matrix.transpose() * hessian * &encoding_matrix;
        debug!(
            "QUBO encoding: {} variables for {} truth bins (bits {:?})",
            encoding.n_vars(),
            n_truth,
            encoding.bits()
        );

        Self {
            migration,
            encoding,
            encoding_matrix,
            quadratic,
            solver,
        }
    }

    #[must_use]
    pub fn encoding(&self) -> &BinaryEncoding {
        &self.encoding
    }

    /// The full QUBO matrix for one measured vector.
    #[must_use]
    pub fn problem(&self, measured: &[f64]) -> QuboProblem {
        let b: DVector<f64> = to_vector(measured).map(|v| if v.is_finite() { v } else { 0.0 });
        let linear = -2.0 * self.encoding_matrix.transpose() * (self.migration.transpose() * b);
        let mut matrix = self.quadratic.clone();
        for (a, l) in linear.iter().enumerate() {
            matrix[(a, a)] += l;
        }
        QuboProblem::new(matrix)
    }

    /// Samples the QUBO and decodes the lowest-energy state. Errors are zero;
    /// the spread comes from the toy ensemble.
    #[must_use]
    pub fn solve(&self, measured: &[f64], backend: &SolverBackend, seed: u64) -> Solution {
        let problem = self.problem(measured);
        let annealer = SimulatedAnnealer::from_config(backend.config());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut reads = annealer.sample_reads(&problem, &mut rng);
        if self.solver == QuboSolverKind::Hybrid {
            for read in &mut reads {
                read.energy = steepest_descent(&problem, &mut read.state);
            }
        }
        let best = reads
            .into_iter()
            .min_by(|a, b| a.energy.total_cmp(&b.energy))
            .unwrap_or_else(|| Sample::zeros(problem.n_vars()));
        debug!("QUBO best energy {:.6e}", best.energy);
        let values = self.encoding.decode(&best.state);
        let errors = vec![0.0; values.len()];
        Solution { values, errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SolverConfig;
    use ndarray::array;
    use xsunfold_core::{Binning, Histogram2D};

    fn diagonal_response() -> ResponseModel {
        let binning = Binning::uniform(2, 0.0, 2.0).unwrap();
        ResponseModel::new(
            Histogram2D::from_counts(
                "res",
                binning.clone(),
                binning,
                array![[50.0, 0.0], [0.0, 50.0]],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_encoding_widths_and_decode() {
        let encoding = BinaryEncoding::new(&[8.0, 1.0, 1000.0], 4);
        assert_eq!(encoding.bits(), &[4, 1, 4]);
        assert_eq!(encoding.steps()[0], 1.0);
        assert!((encoding.steps()[2] - 1000.0 / 15.0).abs() < 1e-12);
        assert_eq!(encoding.n_vars(), 9);

        let mut state = vec![0_u8; 9];
        state[0] = 1; // 1
        state[2] = 1; // 4
        state[4] = 1; // second bin
        let decoded = encoding.decode(&state);
        assert_eq!(decoded[0], 5.0);
        assert_eq!(decoded[1], 1.0);
        assert_eq!(decoded[2], 0.0);

        let x = encoding.matrix() * DVector::from_iterator(9, state.iter().map(|&q| f64::from(q)));
        assert_eq!(x[0], 5.0);
    }

    #[test]
    fn test_problem_energy_matches_objective() {
        let response = diagonal_response();
        let measured = [3.0, 5.0];
        let unfolding =
            QuboUnfolding::prepare(&response, &measured, 0.0, QuboSolverKind::Annealing, 8);
        let problem = unfolding.problem(&measured);
        let n = problem.n_vars();
        for code in [0_usize, 1, 77, 200] {
            let state: Vec<u8> = (0..n).map(|k| u8::from(code >> k & 1 == 1)).collect();
            let x = unfolding.encoding().decode(&state);
            let objective: f64 = x
                .iter()
                .zip(measured)
                .map(|(xi, bi)| (xi - bi).powi(2))
                .sum::<f64>()
                - measured.iter().map(|b| b * b).sum::<f64>();
            assert!((problem.energy(&state) - objective).abs() < 1e-9);
        }
    }

    #[test]
    fn test_hybrid_solve_recovers_integer_truth() {
        let response = diagonal_response();
        let measured = [3.0, 5.0];
        let backend = SolverBackend::initialize(SolverConfig::default()).unwrap();
        let unfolding =
            QuboUnfolding::prepare(&response, &measured, 0.0, QuboSolverKind::Hybrid, 16);
        let solution = unfolding.solve(&measured, &backend, 42);
        assert!((solution.values[0] - 3.0).abs() <= 1.0);
        assert!((solution.values[1] - 5.0).abs() <= 1.0);
        assert_eq!(solution.errors, vec![0.0, 0.0]);
    }

    #[test]
    fn test_solve_is_deterministic_for_seed() {
        let response = diagonal_response();
        let measured = [6.0, 2.0];
        let backend = SolverBackend::initialize(SolverConfig::default().with_num_sweeps(50))
            .unwrap();
        let unfolding =
            QuboUnfolding::prepare(&response, &measured, 0.5, QuboSolverKind::Annealing, 16);
        let a = unfolding.solve(&measured, &backend, 7);
        let b = unfolding.solve(&measured, &backend, 7);
        assert_eq!(a.values, b.values);
    }
}
