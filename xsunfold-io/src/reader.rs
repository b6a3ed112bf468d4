//! Histogram loading from JSON containers.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info};
use xsunfold_algorithms::SpectrumInputs;
use xsunfold_core::{Histogram1D, Histogram2D};

use crate::config::{HistogramSource, RunConfig};
use crate::schema::{JsonContainer, JsonHistogram};
use crate::{Error, Result};

/// An opened histogram container.
#[derive(Debug)]
pub struct HistogramFile {
    path: PathBuf,
    histograms: Vec<JsonHistogram>,
}

impl HistogramFile {
    /// Reads and parses a container.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a container.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = BufReader::new(File::open(&path)?);
        let container: JsonContainer = serde_json::from_reader(reader)?;
        debug!(
            "opened {} ({} histograms, format '{}')",
            path.display(),
            container.histograms.len(),
            container.format_version
        );
        Ok(Self {
            path,
            histograms: container.histograms,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the stored histograms, in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.histograms.iter().map(JsonHistogram::name)
    }

    fn take(&self, hpath: &str) -> Result<&JsonHistogram> {
        self.histograms
            .iter()
            .find(|h| h.name() == hpath)
            .ok_or_else(|| Error::MissingHistogram {
                file: self.path.display().to_string(),
                path: hpath.to_string(),
            })
    }

    /// Loads the 1D histogram stored under `hpath`.
    ///
    /// # Errors
    /// Returns [`Error::MissingHistogram`] if absent and
    /// [`Error::InvalidFormat`] if it is not one-dimensional.
    pub fn histogram_1d(&self, hpath: &str) -> Result<Histogram1D> {
        match self.take(hpath)? {
            JsonHistogram::OneD(h) => Histogram1D::try_from(h.clone()),
            other => Err(self.wrong_kind(hpath, "1d", other)),
        }
    }

    /// Loads the 2D histogram stored under `hpath`.
    ///
    /// # Errors
    /// Returns [`Error::MissingHistogram`] if absent and
    /// [`Error::InvalidFormat`] if it is not two-dimensional.
    pub fn histogram_2d(&self, hpath: &str) -> Result<Histogram2D> {
        match self.take(hpath)? {
            JsonHistogram::TwoD(h) => Histogram2D::try_from(h.clone()),
            other => Err(self.wrong_kind(hpath, "2d", other)),
        }
    }

    fn wrong_kind(&self, hpath: &str, expected: &str, found: &JsonHistogram) -> Error {
        Error::InvalidFormat(format!(
            "{}: '{hpath}' is a {} histogram, expected {expected}",
            self.path.display(),
            found.kind()
        ))
    }
}

/// Loads histograms for a run, opening each container once.
#[derive(Debug, Default)]
pub struct HistogramLoader {
    files: HashMap<PathBuf, HistogramFile>,
}

impl HistogramLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn file(&mut self, path: &Path) -> Result<&HistogramFile> {
        Ok(match self.files.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(HistogramFile::open(path)?),
        })
    }

    /// # Errors
    /// Propagates file and lookup failures.
    pub fn histogram_1d(&mut self, source: &HistogramSource) -> Result<Histogram1D> {
        self.file(&source.file)?.histogram_1d(&source.hpath)
    }

    /// # Errors
    /// Propagates file and lookup failures.
    pub fn histogram_2d(&mut self, source: &HistogramSource) -> Result<Histogram2D> {
        self.file(&source.file)?.histogram_2d(&source.hpath)
    }

    /// Loads every input named by `config`.
    ///
    /// # Errors
    /// Fails on the first missing or malformed histogram.
    pub fn load_inputs(&mut self, config: &RunConfig) -> Result<SpectrumInputs> {
        let inputs = SpectrumInputs {
            data: self.histogram_1d(&config.data)?,
            signal_reco: self.histogram_1d(&config.signal_reco)?,
            response: self.histogram_2d(&config.response)?,
            generated: self.histogram_1d(&config.generated)?,
            background: config
                .background
                .as_ref()
                .map(|source| self.histogram_1d(source))
                .transpose()?,
        };
        info!(
            "loaded inputs from {} file(s): data {}, response {}x{}",
            self.files.len(),
            inputs.data.binning(),
            inputs.response.nx(),
            inputs.response.ny()
        );
        Ok(inputs)
    }
}

/// Loads every input named by `config` with a fresh [`HistogramLoader`].
///
/// # Errors
/// Fails on the first missing or malformed histogram.
pub fn load_inputs(config: &RunConfig) -> Result<SpectrumInputs> {
    HistogramLoader::new().load_inputs(config)
}
