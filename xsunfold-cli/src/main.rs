//! xsunfold CLI: Command-line driver for differential cross-section unfolding.
//!
//! Loads a JSON run configuration, unfolds one systematic variation and
//! saves every produced histogram.
#![allow(clippy::cast_precision_loss, clippy::too_many_lines)]

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};

use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use xsunfold_algorithms::{SolverBackend, Spectrum, StatErrorMode, UnfoldingMethod};
use xsunfold_io::{load_inputs, HistogramSink, JsonHistogramSink, RunConfig};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    XsunfoldIo(#[from] xsunfold_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] xsunfold_core::Error),

    #[cfg_attr(feature = "hdf5", allow(dead_code))]
    #[error("unsupported output format: {0}")]
    Unsupported(String),
}

/// Output container format.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// JSON histogram container
    Json,
    /// HDF5 file (requires the `hdf5` feature)
    H5,
}

/// Differential cross-section unfolding with toy-based uncertainties.
#[derive(Parser)]
#[command(name = "xsunfold")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Unfold one systematic variation and save its histograms
    Unfold {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Systematic variation name
        #[arg(short, long, default_value = "nominal")]
        systematic: String,

        /// Output file path (default: {systematic}_{method}_{parameter}_DiffXs.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output container format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Override the toy seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the number of toys
        #[arg(long)]
        toys: Option<usize>,
    },

    /// Show binning and integrals of the configured inputs
    Info {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Time one nominal unfold per method
    Benchmark {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Number of iterations
        #[arg(short, long, default_value = "3")]
        iterations: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Unfold {
            config,
            systematic,
            output,
            format,
            seed,
            toys,
        } => {
            let run = RunConfig::from_file(&config)?;
            let backend = SolverBackend::initialize(run.solver)?;

            let mut settings = run.spectrum_settings(&systematic)?;
            if let Some(seed) = seed {
                settings.seed = seed;
            }
            if let Some(toys) = toys {
                settings.n_toys = toys;
            }
            info!(
                "unfolding '{systematic}' with {} ({} stat errors, {} toys)",
                settings.method, settings.stat_error, settings.n_toys
            );

            let start = Instant::now();
            let mut spectrum = Spectrum::new(load_inputs(&run)?, settings, backend)?;
            let outputs = spectrum.compute()?;
            println!("Total cross-section: {:.6}", outputs.total_xs);
            for bin in outputs.absolute.bins() {
                println!(
                    "  [{:>10.4}, {:>10.4})  {:>14.6e} +- {:.6e}",
                    bin.low_edge, bin.high_edge, bin.content, bin.error
                );
            }

            let output = output.unwrap_or_else(|| run.default_output_path(&systematic));
            save(&spectrum, &output, format)?;
            println!(
                "Saved {} histograms to {} in {:.2?}",
                spectrum.named_histograms().len(),
                output.display(),
                start.elapsed()
            );
        }

        Commands::Info { config } => {
            let run = RunConfig::from_file(&config)?;
            let inputs = load_inputs(&run)?;

            println!("Config: {}", config.display());
            println!(
                "Method: {} (parameter {:?})",
                run.unfolding.method, run.unfolding.regularization
            );
            for (label, h) in [
                ("Data", Some(&inputs.data)),
                ("Signal reco", Some(&inputs.signal_reco)),
                ("Generated", Some(&inputs.generated)),
                ("Background", inputs.background.as_ref()),
            ] {
                match h {
                    Some(h) => {
                        let (integral, error) = h.integral_and_error();
                        println!(
                            "{label:<12} {}  integral {integral:.3} +- {error:.3}",
                            h.binning()
                        );
                    }
                    None => println!("{label:<12} none"),
                }
            }
            let (integral, error) = inputs.response.integral_and_error();
            println!(
                "{:<12} reco {} x truth {}  integral {integral:.3} +- {error:.3}",
                "Response",
                inputs.response.x_binning(),
                inputs.response.y_binning()
            );
        }

        Commands::Benchmark { config, iterations } => {
            let run = RunConfig::from_file(&config)?;
            let backend = SolverBackend::initialize(run.solver)?;
            let inputs = load_inputs(&run)?;
            let iterations = iterations.max(1);

            println!(
                "Benchmarking {} truth bins, {} iterations",
                inputs.response.ny(),
                iterations
            );
            println!(
                "{:<10} | {:<15} | {:<15} | {:<15}",
                "Method", "Mean Time (ms)", "Min Time (ms)", "Max Time (ms)"
            );
            println!("{:-<65}", "");

            for method in UnfoldingMethod::all_defaults() {
                let settings = run
                    .spectrum_settings("nominal")?
                    .with_method(method)
                    .with_stat_error(StatErrorMode::None);
                let mut times = Vec::with_capacity(iterations);
                for _ in 0..iterations {
                    let start = Instant::now();
                    let mut spectrum =
                        Spectrum::new(inputs.clone(), settings.clone(), backend.clone())?;
                    spectrum.compute()?;
                    times.push(start.elapsed().as_secs_f64() * 1000.0);
                }

                let min_time = times.iter().fold(f64::INFINITY, |a, &b| a.min(b));
                let max_time = times.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                let mean_time = times.iter().sum::<f64>() / times.len() as f64;

                println!(
                    "{:<10} | {:<15.2} | {:<15.2} | {:<15.2}",
                    method.name(),
                    mean_time,
                    min_time,
                    max_time
                );
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn save(spectrum: &Spectrum, path: &Path, format: OutputFormat) -> Result<()> {
    let histograms = spectrum.named_histograms();
    match format {
        OutputFormat::Json => JsonHistogramSink::create(path)?.save_all(&histograms)?,
        #[cfg(feature = "hdf5")]
        OutputFormat::H5 => xsunfold_io::Hdf5HistogramSink::create(path)?.save_all(&histograms)?,
        #[cfg(not(feature = "hdf5"))]
        OutputFormat::H5 => {
            return Err(CliError::Unsupported(
                "HDF5 output needs the `hdf5` feature".to_string(),
            ))
        }
    }
    Ok(())
}
