//! Combinatorial solver facility used by the QUBO unfolding methods.
//!
//! The facility is initialized once by the driver and the returned
//! [`SolverBackend`] handle is handed to every [`crate::Unfolder`].

use log::debug;
use xsunfold_core::{Error, Result};

/// Largest bit width accepted for one truth bin.
pub const MAX_BITS_LIMIT: u32 = 32;

/// Solver tuning shared by all QUBO solves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolverConfig {
    /// Independent annealing runs per solve; the lowest-energy read wins.
    pub num_reads: usize,
    /// Full sweeps over all bits per read.
    pub num_sweeps: usize,
    /// Upper bound on the binary encoding width of one truth bin.
    pub max_bits: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            num_reads: 10,
            num_sweeps: 1000,
            max_bits: 16,
        }
    }
}

impl SolverConfig {
    #[must_use]
    pub fn with_num_reads(mut self, num_reads: usize) -> Self {
        self.num_reads = num_reads;
        self
    }

    #[must_use]
    pub fn with_num_sweeps(mut self, num_sweeps: usize) -> Self {
        self.num_sweeps = num_sweeps;
        self
    }

    #[must_use]
    pub fn with_max_bits(mut self, max_bits: u32) -> Self {
        self.max_bits = max_bits;
        self
    }
}

/// Handle proving the solver facility was initialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverBackend {
    config: SolverConfig,
}

impl SolverBackend {
    /// Initializes the solver facility.
    ///
    /// # Errors
    /// Returns [`Error::Resource`] if the configuration cannot drive a solver.
    pub fn initialize(config: SolverConfig) -> Result<Self> {
        if config.num_reads == 0 {
            return Err(Error::Resource(
                "QUBO solver needs at least one read".to_string(),
            ));
        }
        if config.num_sweeps == 0 {
            return Err(Error::Resource(
                "QUBO solver needs at least one sweep".to_string(),
            ));
        }
        if config.max_bits == 0 || config.max_bits > MAX_BITS_LIMIT {
            return Err(Error::Resource(format!(
                "QUBO encoding width must be within 1..={MAX_BITS_LIMIT} bits, got {}",
                config.max_bits
            )));
        }
        debug!(
            "solver backend ready: {} reads x {} sweeps, {} bits max",
            config.num_reads, config.num_sweeps, config.max_bits
        );
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}
