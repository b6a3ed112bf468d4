//! JSON run configuration.
//!
//! A run configuration names the five input histograms (each a file plus a
//! histogram path inside it) and the unfolding settings. Every key except the
//! required inputs may be omitted and falls back to its default.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;
use xsunfold_algorithms::{SolverConfig, SpectrumSettings, StatErrorMode, UnfoldingMethod};

use crate::{Error, Result};

/// Location of one histogram: a container file and a path inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistogramSource {
    pub file: PathBuf,
    pub hpath: String,
}

/// Unfolding settings as written in the configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct UnfoldingConfig {
    pub method: String,
    /// Method-specific regularization parameter; `None` selects the default.
    pub regularization: Option<f64>,
    pub n_toys: usize,
    pub stat_error: String,
    pub seed: u64,
    pub keep_response: Option<bool>,
}

impl Default for UnfoldingConfig {
    fn default() -> Self {
        Self {
            method: "Bayes".to_string(),
            regularization: None,
            n_toys: 10_000,
            stat_error: "toys".to_string(),
            seed: 0,
            keep_response: None,
        }
    }
}

/// Full run configuration.
#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunConfig {
    pub branching_ratio: f64,
    pub luminosity: f64,
    pub signal_reco: HistogramSource,
    pub data: HistogramSource,
    pub response: HistogramSource,
    pub generated: HistogramSource,
    pub background: Option<HistogramSource>,
    pub unfolding: UnfoldingConfig,
    pub solver: SolverConfig,
    pub do_total: bool,
    pub do_eff: bool,
    pub reco_scale: f64,
    pub transpose_response: bool,
}

// Intermediate structs mirroring the on-disk schema
#[derive(Deserialize)]
struct JsonRunConfig {
    #[serde(default)]
    br: Option<f64>,
    #[serde(default)]
    lumi: Option<f64>,
    sig: JsonSource,
    data: JsonSource,
    res: JsonSource,
    #[serde(rename = "gen")]
    generated: JsonSource,
    #[serde(default)]
    bkg: Option<JsonSource>,
    #[serde(default)]
    unfolding: JsonUnfolding,
    #[serde(default)]
    solver: JsonSolver,
    #[serde(default)]
    do_total: bool,
    #[serde(default = "default_true")]
    do_eff: bool,
    #[serde(default)]
    reco_scale: Option<f64>,
    #[serde(default)]
    transpose_response: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonSource {
    file: String,
    hpath: String,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonUnfolding {
    method: String,
    regularization: Option<f64>,
    ntoys: usize,
    stat_err: String,
    seed: u64,
    keep_response: Option<bool>,
}

impl Default for JsonUnfolding {
    fn default() -> Self {
        let defaults = UnfoldingConfig::default();
        Self {
            method: defaults.method,
            regularization: defaults.regularization,
            ntoys: defaults.n_toys,
            stat_err: defaults.stat_error,
            seed: defaults.seed,
            keep_response: defaults.keep_response,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonSolver {
    num_reads: usize,
    num_sweeps: usize,
    max_bits: u32,
}

impl Default for JsonSolver {
    fn default() -> Self {
        let defaults = SolverConfig::default();
        Self {
            num_reads: defaults.num_reads,
            num_sweeps: defaults.num_sweeps,
            max_bits: defaults.max_bits,
        }
    }
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    /// Loads a configuration file. Relative histogram paths are resolved
    /// against the directory containing the configuration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// names an empty required input.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let json: JsonRunConfig = serde_json::from_reader(reader)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_json_config(json, base)
    }

    /// Parses a configuration from a JSON string; relative paths are kept as-is.
    ///
    /// # Errors
    /// Returns an error on malformed JSON or an empty required input.
    pub fn from_json(json: &str) -> Result<Self> {
        let json: JsonRunConfig = serde_json::from_str(json)?;
        Self::from_json_config(json, Path::new(""))
    }

    fn from_json_config(config: JsonRunConfig, base: &Path) -> Result<Self> {
        let required = |key: &str, source: JsonSource| -> Result<HistogramSource> {
            if source.file.is_empty() || source.hpath.is_empty() {
                return Err(Error::InvalidFormat(format!(
                    "input '{key}' needs both 'file' and 'hpath'"
                )));
            }
            Ok(resolve(base, source))
        };

        let background = match config.bkg {
            Some(source) if !source.file.is_empty() && !source.hpath.is_empty() => {
                Some(resolve(base, source))
            }
            Some(_) => {
                warn!("background file or path is empty, background is ignored");
                None
            }
            None => None,
        };

        let unfolding = UnfoldingConfig {
            method: config.unfolding.method,
            regularization: config.unfolding.regularization,
            n_toys: config.unfolding.ntoys,
            stat_error: config.unfolding.stat_err,
            seed: config.unfolding.seed,
            keep_response: config.unfolding.keep_response,
        };

        Ok(Self {
            branching_ratio: config.br.unwrap_or(1.0),
            luminosity: config.lumi.unwrap_or(1.0),
            signal_reco: required("sig", config.sig)?,
            data: required("data", config.data)?,
            response: required("res", config.res)?,
            generated: required("gen", config.generated)?,
            background,
            unfolding,
            solver: SolverConfig {
                num_reads: config.solver.num_reads,
                num_sweeps: config.solver.num_sweeps,
                max_bits: config.solver.max_bits,
            },
            do_total: config.do_total,
            do_eff: config.do_eff,
            reco_scale: config.reco_scale.unwrap_or(1.0),
            transpose_response: config.transpose_response,
        })
    }

    /// The unfolding method named in the configuration.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown method name.
    pub fn method(&self) -> Result<UnfoldingMethod> {
        UnfoldingMethod::from_name(&self.unfolding.method, self.unfolding.regularization)
            .map_err(Error::from)
    }

    /// Builds the spectrum settings for one systematic variation.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown method name or
    /// statistical error mode.
    pub fn spectrum_settings(&self, systematic: &str) -> Result<SpectrumSettings> {
        let stat_error = StatErrorMode::parse(&self.unfolding.stat_error, systematic)?;
        Ok(SpectrumSettings {
            systematic: systematic.to_string(),
            branching_ratio: self.branching_ratio,
            luminosity: self.luminosity,
            method: self.method()?,
            keep_response: self.unfolding.keep_response,
            n_toys: self.unfolding.n_toys,
            stat_error,
            seed: self.unfolding.seed,
            do_eff: self.do_eff,
            do_total: self.do_total,
            reco_scale: self.reco_scale,
            transpose_response: self.transpose_response,
        })
    }

    /// Default output file `{systematic}_{method}_{parameter}_DiffXs.json`.
    ///
    /// The parameter is the configured regularization value, `-1` when unset.
    #[must_use]
    pub fn default_output_path(&self, systematic: &str) -> PathBuf {
        let parameter = self.unfolding.regularization.unwrap_or(-1.0);
        PathBuf::from(format!(
            "{systematic}_{}_{parameter}_DiffXs.json",
            self.unfolding.method
        ))
    }
}

fn resolve(base: &Path, source: JsonSource) -> HistogramSource {
    let file = PathBuf::from(source.file);
    let file = if file.is_relative() {
        base.join(file)
    } else {
        file
    };
    HistogramSource {
        file,
        hpath: source.hpath,
    }
}
