//! xsunfold-core: Histogram and response types for cross-section unfolding.
//!
//! This crate provides the fixed-binning histograms, the response model
//! that derives efficiency and acceptance corrections, and the shared
//! error taxonomy.
//!

pub mod error;
pub mod histogram;
pub mod histogram2d;
pub mod named;
pub mod response;

pub use error::{Error, Result};
pub use histogram::{Bin, Binning, Histogram1D};
pub use histogram2d::Histogram2D;
pub use named::HistogramRef;
pub use response::ResponseModel;
