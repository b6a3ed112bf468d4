//! JSON histogram container schema.
//!
//! ```json
//! {
//!   "format_version": "1",
//!   "histograms": [
//!     { "kind": "1d", "name": "hData", "edges": [0, 1, 2], "contents": [4, 5] },
//!     { "kind": "2d", "name": "hRes", "x_edges": [0, 1, 2], "y_edges": [0, 1, 2],
//!       "contents": [[4, 0], [1, 3]] }
//!   ]
//! }
//! ```
//!
//! 2D contents are nested rows indexed `[x][y]`. Missing errors default to
//! `sqrt(|content|)`. Non-finite values are written as `null` and read back
//! as NaN.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use xsunfold_core::{Binning, Histogram1D, Histogram2D, HistogramRef};

use crate::{Error, Result};

pub const FORMAT_VERSION: &str = "1";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct JsonContainer {
    #[serde(default)]
    pub format_version: String,
    #[serde(default)]
    pub histograms: Vec<JsonHistogram>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub(crate) enum JsonHistogram {
    #[serde(rename = "1d")]
    OneD(JsonHistogram1D),
    #[serde(rename = "2d")]
    TwoD(JsonHistogram2D),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct JsonHistogram1D {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub x_title: String,
    pub edges: Vec<f64>,
    pub contents: Vec<Option<f64>>,
    #[serde(default)]
    pub errors: Option<Vec<Option<f64>>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct JsonHistogram2D {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub x_title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub y_title: String,
    pub x_edges: Vec<f64>,
    pub y_edges: Vec<f64>,
    pub contents: Vec<Vec<Option<f64>>>,
    #[serde(default)]
    pub errors: Option<Vec<Vec<Option<f64>>>>,
}

impl JsonHistogram {
    pub fn name(&self) -> &str {
        match self {
            Self::OneD(h) => &h.name,
            Self::TwoD(h) => &h.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::OneD(_) => "1d",
            Self::TwoD(_) => "2d",
        }
    }
}

impl From<HistogramRef<'_>> for JsonHistogram {
    fn from(histogram: HistogramRef<'_>) -> Self {
        match histogram {
            HistogramRef::OneD(h) => Self::OneD(JsonHistogram1D::from(h)),
            HistogramRef::TwoD(h) => Self::TwoD(JsonHistogram2D::from(h)),
        }
    }
}

impl From<&Histogram1D> for JsonHistogram1D {
    fn from(h: &Histogram1D) -> Self {
        Self {
            name: h.name().to_string(),
            title: h.title().to_string(),
            x_title: h.x_title().to_string(),
            edges: h.binning().edges().to_vec(),
            contents: encode(h.contents().iter()),
            errors: Some(encode(h.errors().iter())),
        }
    }
}

impl From<&Histogram2D> for JsonHistogram2D {
    fn from(h: &Histogram2D) -> Self {
        Self {
            name: h.name().to_string(),
            title: h.title().to_string(),
            x_title: h.x_title().to_string(),
            y_title: h.y_title().to_string(),
            x_edges: h.x_binning().edges().to_vec(),
            y_edges: h.y_binning().edges().to_vec(),
            contents: h.contents().rows().into_iter().map(|r| encode(r.iter())).collect(),
            errors: Some(h.errors().rows().into_iter().map(|r| encode(r.iter())).collect()),
        }
    }
}

impl TryFrom<JsonHistogram1D> for Histogram1D {
    type Error = Error;

    fn try_from(json: JsonHistogram1D) -> Result<Self> {
        let binning = Binning::new(json.edges)?;
        let contents = decode(json.contents);
        let mut histogram = match json.errors {
            Some(errors) => Histogram1D::from_parts(json.name, binning, contents, decode(errors))?,
            None => Histogram1D::from_counts(json.name, binning, contents)?,
        };
        histogram.set_title(json.title);
        histogram.set_x_title(json.x_title);
        Ok(histogram)
    }
}

impl TryFrom<JsonHistogram2D> for Histogram2D {
    type Error = Error;

    fn try_from(json: JsonHistogram2D) -> Result<Self> {
        let x_binning = Binning::new(json.x_edges)?;
        let y_binning = Binning::new(json.y_edges)?;
        let shape = (x_binning.n_bins(), y_binning.n_bins());
        let contents = to_matrix(&json.name, "contents", json.contents, shape)?;
        let mut histogram = match json.errors {
            Some(errors) => Histogram2D::from_parts(
                json.name.clone(),
                x_binning,
                y_binning,
                contents,
                to_matrix(&json.name, "errors", errors, shape)?,
            )?,
            None => Histogram2D::from_counts(json.name, x_binning, y_binning, contents)?,
        };
        histogram.set_title(json.title);
        histogram.set_axis_titles(json.x_title, json.y_title);
        Ok(histogram)
    }
}

fn encode<'a>(values: impl Iterator<Item = &'a f64>) -> Vec<Option<f64>> {
    values.map(|v| v.is_finite().then_some(*v)).collect()
}

fn decode(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

fn to_matrix(
    name: &str,
    what: &str,
    rows: Vec<Vec<Option<f64>>>,
    (nx, ny): (usize, usize),
) -> Result<Array2<f64>> {
    if rows.len() != nx || rows.iter().any(|row| row.len() != ny) {
        return Err(Error::InvalidFormat(format!(
            "{name}: {what} must be {nx} rows of {ny} values"
        )));
    }
    let flat: Vec<f64> = rows.into_iter().flat_map(decode).collect();
    Array2::from_shape_vec((nx, ny), flat)
        .map_err(|e| Error::InvalidFormat(format!("{name}: {what} shape mismatch: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_errors_default_to_poisson() {
        let json = r#"{ "kind": "1d", "name": "h", "edges": [0, 1, 2], "contents": [4, 9] }"#;
        let JsonHistogram::OneD(raw) = serde_json::from_str::<JsonHistogram>(json).unwrap() else {
            panic!("expected a 1D histogram");
        };
        let h = Histogram1D::try_from(raw).unwrap();
        assert_eq!(h.errors(), &[2.0, 3.0]);
    }

    #[test]
    fn test_null_reads_back_as_nan() {
        let json = r#"{ "kind": "1d", "name": "h", "edges": [0, 1], "contents": [null], "errors": [0] }"#;
        let JsonHistogram::OneD(raw) = serde_json::from_str::<JsonHistogram>(json).unwrap() else {
            panic!("expected a 1D histogram");
        };
        assert!(Histogram1D::try_from(raw).unwrap().content(0).is_nan());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let json = r#"{ "kind": "2d", "name": "r", "x_edges": [0, 1, 2], "y_edges": [0, 1, 2],
                        "contents": [[1, 2], [3]] }"#;
        let JsonHistogram::TwoD(raw) = serde_json::from_str::<JsonHistogram>(json).unwrap() else {
            panic!("expected a 2D histogram");
        };
        assert!(matches!(Histogram2D::try_from(raw), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_rows_are_indexed_by_x() {
        let json = r#"{ "kind": "2d", "name": "r", "x_edges": [0, 1, 2, 3], "y_edges": [0, 1, 2],
                        "contents": [[1, 2], [3, 4], [5, 6]] }"#;
        let JsonHistogram::TwoD(raw) = serde_json::from_str::<JsonHistogram>(json).unwrap() else {
            panic!("expected a 2D histogram");
        };
        let h = Histogram2D::try_from(raw).unwrap();
        assert_eq!(h.nx(), 3);
        assert_eq!(h.content(2, 1), 6.0);
    }
}
