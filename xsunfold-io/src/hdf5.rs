//! HDF5 result container.
//!
//! Each histogram becomes a group named after it, holding `contents` and
//! `errors` datasets plus its bin edges (`edges` for 1D, `x_edges` and
//! `y_edges` for 2D). The group attribute `kind` is `"1d"` or `"2d"`.

use std::path::Path;
use std::str::FromStr;

use hdf5::types::VarLenUnicode;
use hdf5::{File, Group};
use log::info;
use ndarray::{Array2, ArrayView1};
use xsunfold_core::{Binning, Histogram1D, Histogram2D, HistogramRef};

use crate::writer::HistogramSink;
use crate::{Error, Result};

/// Writes histograms into one HDF5 file.
pub struct Hdf5HistogramSink {
    file: File,
}

impl Hdf5HistogramSink {
    /// Creates (or truncates) the output file.
    ///
    /// # Errors
    /// Returns an error if the HDF5 file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        set_attr_str(&file, "xsunfold_format_version", crate::schema::FORMAT_VERSION)?;
        Ok(Self { file })
    }
}

impl HistogramSink for Hdf5HistogramSink {
    fn save_all(&mut self, histograms: &[HistogramRef<'_>]) -> Result<()> {
        for histogram in histograms {
            let group = self.file.create_group(histogram.name())?;
            match histogram {
                HistogramRef::OneD(h) => write_1d(&group, h)?,
                HistogramRef::TwoD(h) => write_2d(&group, h)?,
            }
        }
        self.file.flush()?;
        info!("saved {} histograms to HDF5", histograms.len());
        Ok(())
    }
}

fn write_1d(group: &Group, h: &Histogram1D) -> Result<()> {
    set_attr_str(group, "kind", "1d")?;
    set_attr_str(group, "title", h.title())?;
    set_attr_str(group, "x_title", h.x_title())?;
    write_vec(group, "edges", h.binning().edges())?;
    write_vec(group, "contents", h.contents())?;
    write_vec(group, "errors", h.errors())?;
    Ok(())
}

fn write_2d(group: &Group, h: &Histogram2D) -> Result<()> {
    set_attr_str(group, "kind", "2d")?;
    set_attr_str(group, "title", h.title())?;
    set_attr_str(group, "x_title", h.x_title())?;
    set_attr_str(group, "y_title", h.y_title())?;
    write_vec(group, "x_edges", h.x_binning().edges())?;
    write_vec(group, "y_edges", h.y_binning().edges())?;
    write_matrix(group, "contents", h.contents())?;
    write_matrix(group, "errors", h.errors())?;
    Ok(())
}

fn write_vec(group: &Group, name: &str, values: &[f64]) -> Result<()> {
    group
        .new_dataset::<f64>()
        .shape((values.len(),))
        .create(name)?
        .write(ArrayView1::from(values))?;
    Ok(())
}

fn write_matrix(group: &Group, name: &str, values: &Array2<f64>) -> Result<()> {
    let standard = values.as_standard_layout();
    group
        .new_dataset::<f64>()
        .shape(values.dim())
        .create(name)?
        .write(standard.view())?;
    Ok(())
}

/// Reads the 1D histogram stored under `name`.
///
/// # Errors
/// Returns [`Error::MissingHistogram`] if the group is absent and
/// [`Error::InvalidFormat`] if it does not hold a 1D histogram.
pub fn read_histogram_1d<P: AsRef<Path>>(path: P, name: &str) -> Result<Histogram1D> {
    let group = open_group(path.as_ref(), name)?;
    expect_kind(&group, name, "1d")?;
    let binning = Binning::new(group.dataset("edges")?.read_raw::<f64>()?)?;
    let mut h = Histogram1D::from_parts(
        name,
        binning,
        group.dataset("contents")?.read_raw::<f64>()?,
        group.dataset("errors")?.read_raw::<f64>()?,
    )?;
    h.set_title(read_attr_string(&group, "title")?);
    h.set_x_title(read_attr_string(&group, "x_title")?);
    Ok(h)
}

/// Reads the 2D histogram stored under `name`.
///
/// # Errors
/// Returns [`Error::MissingHistogram`] if the group is absent and
/// [`Error::InvalidFormat`] if it does not hold a 2D histogram.
pub fn read_histogram_2d<P: AsRef<Path>>(path: P, name: &str) -> Result<Histogram2D> {
    let group = open_group(path.as_ref(), name)?;
    expect_kind(&group, name, "2d")?;
    let x_binning = Binning::new(group.dataset("x_edges")?.read_raw::<f64>()?)?;
    let y_binning = Binning::new(group.dataset("y_edges")?.read_raw::<f64>()?)?;
    let mut h = Histogram2D::from_parts(
        name,
        x_binning,
        y_binning,
        group.dataset("contents")?.read_2d::<f64>()?,
        group.dataset("errors")?.read_2d::<f64>()?,
    )?;
    h.set_title(read_attr_string(&group, "title")?);
    h.set_axis_titles(
        read_attr_string(&group, "x_title")?,
        read_attr_string(&group, "y_title")?,
    );
    Ok(h)
}

fn open_group(path: &Path, name: &str) -> Result<Group> {
    let file = File::open(path)?;
    file.group(name).map_err(|_| Error::MissingHistogram {
        file: path.display().to_string(),
        path: name.to_string(),
    })
}

fn expect_kind(group: &Group, name: &str, expected: &str) -> Result<()> {
    let kind = read_attr_string(group, "kind")?;
    if kind != expected {
        return Err(Error::InvalidFormat(format!(
            "'{name}' is a {kind} histogram, expected {expected}"
        )));
    }
    Ok(())
}

fn set_attr_str(location: &hdf5::Location, name: &str, value: &str) -> Result<()> {
    let value = VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_attr_string(group: &Group, name: &str) -> Result<String> {
    let value: VarLenUnicode = group.attr(name)?.read_scalar()?;
    Ok(value.to_string())
}
