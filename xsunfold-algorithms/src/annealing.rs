//! Simulated annealing and steepest-descent polishing for QUBO problems.
//!
//! The annealer keeps one local field per variable,
//! `h_a = sum_{b != a} Q_ab q_b`, so a flip costs
//! `dE = (1 - 2 q_a) (Q_aa + 2 h_a)` and updating the fields after an
//! accepted flip is a single column pass.
//!
//! Inverse temperatures follow a geometric schedule between a hot end where
//! the largest possible flip is accepted with probability 1/2 and a cold end
//! where the smallest one is accepted with probability 1/100.

use rand::Rng;

use crate::backend::SolverConfig;
use crate::qubo::QuboProblem;

/// One annealing read: final state and its energy.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub state: Vec<u8>,
    pub energy: f64,
}

impl Sample {
    /// The all-zero state, whose energy is zero.
    #[must_use]
    pub fn zeros(n_vars: usize) -> Self {
        Self {
            state: vec![0; n_vars],
            energy: 0.0,
        }
    }
}

/// Metropolis simulated annealer over single-bit flips.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedAnnealer {
    num_reads: usize,
    num_sweeps: usize,
}

impl SimulatedAnnealer {
    #[must_use]
    pub fn new(num_reads: usize, num_sweeps: usize) -> Self {
        Self {
            num_reads: num_reads.max(1),
            num_sweeps: num_sweeps.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(config.num_reads, config.num_sweeps)
    }

    /// Geometric schedule of inverse temperatures, one per sweep.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn schedule(&self, problem: &QuboProblem) -> Vec<f64> {
        let (hot, cold) = beta_range(problem);
        if self.num_sweeps == 1 {
            return vec![cold];
        }
        let ratio = cold / hot;
        let last = (self.num_sweeps - 1) as f64;
        (0..self.num_sweeps)
            .map(|s| hot * ratio.powf(s as f64 / last))
            .collect()
    }

    /// Runs all reads and returns their final states.
    pub fn sample_reads<R: Rng>(&self, problem: &QuboProblem, rng: &mut R) -> Vec<Sample> {
        let schedule = self.schedule(problem);
        (0..self.num_reads)
            .map(|_| anneal_once(problem, &schedule, rng))
            .collect()
    }

    /// Runs all reads and returns the lowest-energy one.
    pub fn sample<R: Rng>(&self, problem: &QuboProblem, rng: &mut R) -> Sample {
        self.sample_reads(problem, rng)
            .into_iter()
            .min_by(|a, b| a.energy.total_cmp(&b.energy))
            .unwrap_or_else(|| Sample::zeros(problem.n_vars()))
    }
}

fn anneal_once<R: Rng>(problem: &QuboProblem, schedule: &[f64], rng: &mut R) -> Sample {
    let n = problem.n_vars();
    let mut state: Vec<u8> = (0..n).map(|_| u8::from(rng.gen::<bool>())).collect();
    let mut field = local_fields(problem, &state);
    let mut energy = problem.energy(&state);

    for &beta in schedule {
        for a in 0..n {
            let delta = flip_delta(problem, &state, &field, a);
            let accept = delta <= 0.0 || rng.gen::<f64>() < (-beta * delta).exp();
            if accept {
                flip(problem, &mut state, &mut field, a);
                energy += delta;
            }
        }
    }
    Sample { state, energy }
}

/// Greedily flips the most favourable bit until no flip lowers the energy.
/// Returns the final energy.
pub fn steepest_descent(problem: &QuboProblem, state: &mut [u8]) -> f64 {
    let n = problem.n_vars();
    let mut field = local_fields(problem, state);
    loop {
        let best = (0..n)
            .map(|a| (a, flip_delta(problem, state, &field, a)))
            .min_by(|x, y| x.1.total_cmp(&y.1));
        match best {
            Some((a, delta)) if delta < 0.0 => flip(problem, state, &mut field, a),
            _ => break,
        }
    }
    problem.energy(state)
}

fn local_fields(problem: &QuboProblem, state: &[u8]) -> Vec<f64> {
    let n = problem.n_vars();
    (0..n)
        .map(|a| {
            (0..n)
                .filter(|&b| b != a && state[b] != 0)
                .map(|b| problem.coupling(a, b))
                .sum()
        })
        .collect()
}

#[inline]
fn flip_delta(problem: &QuboProblem, state: &[u8], field: &[f64], a: usize) -> f64 {
    let sign = if state[a] == 0 { 1.0 } else { -1.0 };
    sign * (problem.coupling(a, a) + 2.0 * field[a])
}

#[inline]
fn flip(problem: &QuboProblem, state: &mut [u8], field: &mut [f64], a: usize) {
    let change = if state[a] == 0 { 1.0 } else { -1.0 };
    state[a] ^= 1;
    for (c, h) in field.iter_mut().enumerate() {
        if c != a {
            *h += problem.coupling(c, a) * change;
        }
    }
}

/// Hot and cold inverse temperatures for `problem`.
fn beta_range(problem: &QuboProblem) -> (f64, f64) {
    let n = problem.n_vars();
    let mut max_delta: f64 = 0.0;
    let mut min_delta = f64::INFINITY;
    for a in 0..n {
        let mut reach = problem.coupling(a, a).abs();
        if reach > 0.0 {
            min_delta = min_delta.min(reach);
        }
        for b in (0..n).filter(|&b| b != a) {
            let coupling = 2.0 * problem.coupling(a, b).abs();
            if coupling > 0.0 {
                min_delta = min_delta.min(coupling);
            }
            reach += coupling;
        }
        max_delta = max_delta.max(reach);
    }
    if max_delta <= 0.0 || !min_delta.is_finite() {
        return (1.0, 1.0);
    }
    (2.0_f64.ln() / max_delta, 100.0_f64.ln() / min_delta)
}
