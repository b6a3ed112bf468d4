//! xsunfold-io: Run configuration, histogram loading and result persistence.
//!
//! Histograms live in JSON containers (see [`schema`]); results can also be
//! written to HDF5 with the `hdf5` feature.
//!

pub mod config;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod reader;
pub mod schema;
mod writer;

pub use config::{HistogramSource, RunConfig, UnfoldingConfig};
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::Hdf5HistogramSink;
pub use reader::{load_inputs, HistogramFile, HistogramLoader};
pub use writer::{write_json, HistogramSink, JsonHistogramSink};
