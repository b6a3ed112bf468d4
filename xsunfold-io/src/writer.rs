//! Result persistence.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use xsunfold_core::HistogramRef;

use crate::schema::{JsonContainer, JsonHistogram, FORMAT_VERSION};
use crate::Result;

/// Destination for a set of named histograms.
pub trait HistogramSink {
    /// Stores every histogram under its name, in the given order.
    ///
    /// # Errors
    /// Returns an error if the container cannot be written.
    fn save_all(&mut self, histograms: &[HistogramRef<'_>]) -> Result<()>;
}

/// Writes histograms into one JSON container.
pub struct JsonHistogramSink {
    writer: BufWriter<File>,
}

impl JsonHistogramSink {
    /// Creates (or truncates) the output file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl HistogramSink for JsonHistogramSink {
    fn save_all(&mut self, histograms: &[HistogramRef<'_>]) -> Result<()> {
        let container = JsonContainer {
            format_version: FORMAT_VERSION.to_string(),
            histograms: histograms.iter().copied().map(JsonHistogram::from).collect(),
        };
        serde_json::to_writer_pretty(&mut self.writer, &container)?;
        self.writer.flush()?;
        info!("saved {} histograms", histograms.len());
        Ok(())
    }
}

/// Writes `histograms` to a new JSON container at `path`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_json<P: AsRef<Path>>(path: P, histograms: &[HistogramRef<'_>]) -> Result<()> {
    JsonHistogramSink::create(path)?.save_all(histograms)
}
