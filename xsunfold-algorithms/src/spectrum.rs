//! Spectrum: the differential cross-section measurement pipeline.
//!
//! A [`Spectrum`] owns its input histograms, the response model, one
//! [`Unfolder`] and the derived correction histograms. It moves through two
//! states: constructed (inputs prepared and validated) and initialized
//! (efficiency, acceptance and unfolder ready). [`Spectrum::compute`]
//! initializes on demand, then recomputes every output from scratch.

use std::fmt;
use std::str::FromStr;

use log::{info, warn};
use xsunfold_core::{Error, Histogram1D, Histogram2D, HistogramRef, ResponseModel, Result};

use crate::backend::SolverBackend;
use crate::corrections::{CorrectionChain, CrossSections};
use crate::method::UnfoldingMethod;
use crate::toys::{SmearingMode, ToyConfig, ToyEnsemble, ToyResult};
use crate::unfolder::Unfolder;

/// Systematic whose toys must use Gaussian smearing.
pub const MC_STAT_SYSTEMATIC: &str = "MCstat";

/// How statistical uncertainties of the cross-sections are obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatErrorMode {
    /// First-order propagation of the unfolder's output errors.
    Analytical,
    /// Toy ensemble with the given smearing.
    Toys(SmearingMode),
    /// Point estimates only.
    None,
}

impl StatErrorMode {
    /// Parses `"analytical"`, `"none"`, `"toys"`, `"toys:Poisson"` or
    /// `"toys:Gauss"` (case-insensitive).
    ///
    /// Plain `"toys"` smears with Poisson draws, except for the
    /// [`MC_STAT_SYSTEMATIC`] systematic which smears with Gaussians.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for anything else.
    pub fn parse(mode: &str, systematic: &str) -> Result<Self> {
        let lower = mode.trim().to_ascii_lowercase();
        let (kind, option) = match lower.split_once(':') {
            Some((kind, option)) => (kind, Some(option)),
            None => (lower.as_str(), None),
        };
        match (kind, option) {
            ("analytical", None) => Ok(Self::Analytical),
            ("none", None) => Ok(Self::None),
            ("toys", None) if systematic == MC_STAT_SYSTEMATIC => Ok(Self::Toys(SmearingMode::Gauss)),
            ("toys", None | Some("poisson")) => Ok(Self::Toys(SmearingMode::Poisson)),
            ("toys", Some("gauss" | "gaus" | "gaussian")) => Ok(Self::Toys(SmearingMode::Gauss)),
            _ => Err(Error::Configuration(format!(
                "invalid statistical error mode '{mode}' (expected analytical, toys[:Poisson|:Gauss] or none)"
            ))),
        }
    }
}

impl FromStr for StatErrorMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, "")
    }
}

impl fmt::Display for StatErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analytical => f.write_str("analytical"),
            Self::Toys(SmearingMode::Poisson) => f.write_str("toys:Poisson"),
            Self::Toys(SmearingMode::Gauss) => f.write_str("toys:Gauss"),
            Self::None => f.write_str("none"),
        }
    }
}

/// Histograms supplied by the loading collaborator.
#[derive(Clone, Debug)]
pub struct SpectrumInputs {
    pub data: Histogram1D,
    pub signal_reco: Histogram1D,
    /// Reco × truth unless [`SpectrumSettings::transpose_response`] is set.
    pub response: Histogram2D,
    pub generated: Histogram1D,
    pub background: Option<Histogram1D>,
}

/// Run parameters of one spectrum.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectrumSettings {
    pub systematic: String,
    pub branching_ratio: f64,
    pub luminosity: f64,
    pub method: UnfoldingMethod,
    /// Overrides [`UnfoldingMethod::keeps_response`] when set.
    pub keep_response: Option<bool>,
    pub n_toys: usize,
    pub stat_error: StatErrorMode,
    pub seed: u64,
    pub do_eff: bool,
    pub do_total: bool,
    pub reco_scale: f64,
    pub transpose_response: bool,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            systematic: "nominal".to_string(),
            branching_ratio: 1.0,
            luminosity: 1.0,
            method: UnfoldingMethod::Bayes {
                iterations: crate::method::DEFAULT_BAYES_ITERATIONS,
            },
            keep_response: None,
            n_toys: 10_000,
            stat_error: StatErrorMode::Toys(SmearingMode::Poisson),
            seed: 0,
            do_eff: true,
            do_total: false,
            reco_scale: 1.0,
            transpose_response: false,
        }
    }
}

impl SpectrumSettings {
    #[must_use]
    pub fn with_method(mut self, method: UnfoldingMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_n_toys(mut self, n_toys: usize) -> Self {
        self.n_toys = n_toys;
        self
    }

    #[must_use]
    pub fn with_stat_error(mut self, stat_error: StatErrorMode) -> Self {
        self.stat_error = stat_error;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_luminosity(mut self, luminosity: f64) -> Self {
        self.luminosity = luminosity;
        self
    }

    #[must_use]
    pub fn with_branching_ratio(mut self, branching_ratio: f64) -> Self {
        self.branching_ratio = branching_ratio;
        self
    }

    #[must_use]
    pub fn with_systematic(mut self, systematic: impl Into<String>) -> Self {
        self.systematic = systematic.into();
        self
    }

    #[must_use]
    pub fn with_do_eff(mut self, do_eff: bool) -> Self {
        self.do_eff = do_eff;
        self
    }

    #[must_use]
    pub fn with_do_total(mut self, do_total: bool) -> Self {
        self.do_total = do_total;
        self
    }

    #[must_use]
    pub fn with_reco_scale(mut self, reco_scale: f64) -> Self {
        self.reco_scale = reco_scale;
        self
    }

    #[must_use]
    pub fn with_transpose_response(mut self, transpose: bool) -> Self {
        self.transpose_response = transpose;
        self
    }

    #[must_use]
    pub fn with_keep_response(mut self, keep_response: Option<bool>) -> Self {
        self.keep_response = keep_response;
        self
    }

    /// Whether a toy ensemble will run.
    #[must_use]
    pub fn runs_toys(&self) -> bool {
        matches!(self.stat_error, StatErrorMode::Toys(_)) && self.n_toys > 0
    }
}

/// Correction histograms and the unfolder, derived once per spectrum.
#[derive(Clone, Debug)]
struct Derived {
    signal_truth: Histogram1D,
    efficiency: Histogram1D,
    acceptance: Histogram1D,
    data_minus_background: Histogram1D,
    chain: CorrectionChain,
    unfolder: Unfolder,
}

/// Results of one [`Spectrum::compute`].
#[derive(Clone, Debug, PartialEq)]
pub struct SpectrumOutputs {
    /// Background-subtracted, acceptance-corrected data fed to the unfolder.
    pub corrected: Histogram1D,
    pub unfolded: Histogram1D,
    pub absolute: Histogram1D,
    pub relative: Histogram1D,
    /// Integrated cross-section.
    pub total_xs: f64,
    pub theory_absolute: Histogram1D,
    pub theory_relative: Histogram1D,
    /// Present only when a toy ensemble ran.
    pub toys: Option<ToyResult>,
}

/// The measurement pipeline for one systematic variation.
#[derive(Clone, Debug)]
pub struct Spectrum {
    settings: SpectrumSettings,
    backend: SolverBackend,
    data: Histogram1D,
    signal_reco: Histogram1D,
    response: ResponseModel,
    generated: Histogram1D,
    background: Histogram1D,
    has_background: bool,
    derived: Option<Derived>,
    outputs: Option<SpectrumOutputs>,
}

impl Spectrum {
    /// Prepares the inputs and checks that every binning agrees with the
    /// response axes.
    ///
    /// Preparation scales the data by `reco_scale` and the generated
    /// spectrum by `1 / branching_ratio`, orients the response, replaces the
    /// generated spectrum with the response truth projection when efficiency
    /// correction is off, substitutes an empty background when none is given,
    /// and collapses everything to one bin in total cross-section mode.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for a non-positive luminosity or
    /// branching ratio and [`Error::BinningMismatch`] when an input does not
    /// match the response.
    pub fn new(
        inputs: SpectrumInputs,
        settings: SpectrumSettings,
        backend: SolverBackend,
    ) -> Result<Self> {
        if !(settings.luminosity.is_finite() && settings.luminosity > 0.0) {
            return Err(Error::Configuration(format!(
                "luminosity must be positive, got {}",
                settings.luminosity
            )));
        }
        if !(settings.branching_ratio.is_finite() && settings.branching_ratio > 0.0) {
            return Err(Error::Configuration(format!(
                "branching ratio must be positive, got {}",
                settings.branching_ratio
            )));
        }

        let SpectrumInputs {
            mut data,
            mut signal_reco,
            response,
            mut generated,
            background,
        } = inputs;

        if settings.reco_scale != 1.0 {
            data.scale(settings.reco_scale);
        }

        let non_finite = response.count_non_finite();
        if non_finite > 0 {
            warn!("response matrix has {non_finite} non-finite cells");
        }
        let mut response = ResponseModel::with_orientation(response, settings.transpose_response);
        if !settings.do_eff {
            info!("efficiency correction disabled, using the response truth projection as generated");
            generated = response.signal_truth();
        }
        generated.scale(1.0 / settings.branching_ratio);

        let has_background = background.is_some();
        let mut background = background.unwrap_or_else(|| {
            warn!("no background supplied, background subtraction skipped");
            let mut zero = data.clone();
            zero.reset();
            zero
        });

        if settings.do_total {
            info!("total cross-section mode: collapsing all inputs to one bin");
            data = data.collapsed();
            signal_reco = signal_reco.collapsed();
            background = background.collapsed();
            generated = generated.collapsed();
            response = ResponseModel::new(response.matrix().collapsed());
        }

        data.set_name("Data");
        signal_reco.set_name("SignalReco");
        background.set_name("Background");
        generated.set_name("Generated");
        let mut matrix = response.into_matrix();
        matrix.set_name("Response");
        let response = ResponseModel::new(matrix);

        response
            .validate(&[&data, &signal_reco, &background], &[&generated])
            .map_err(|e| {
                warn!("input binning check failed: {e}");
                e
            })?;

        Ok(Self {
            settings,
            backend,
            data,
            signal_reco,
            response,
            generated,
            background,
            has_background,
            derived: None,
            outputs: None,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &SpectrumSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.derived.is_some()
    }

    #[must_use]
    pub fn has_background(&self) -> bool {
        self.has_background
    }

    #[must_use]
    pub fn data(&self) -> &Histogram1D {
        &self.data
    }

    #[must_use]
    pub fn response(&self) -> &ResponseModel {
        &self.response
    }

    #[must_use]
    pub fn generated(&self) -> &Histogram1D {
        &self.generated
    }

    #[must_use]
    pub fn efficiency(&self) -> Option<&Histogram1D> {
        self.derived.as_ref().map(|d| &d.efficiency)
    }

    #[must_use]
    pub fn acceptance(&self) -> Option<&Histogram1D> {
        self.derived.as_ref().map(|d| &d.acceptance)
    }

    #[must_use]
    pub fn signal_truth(&self) -> Option<&Histogram1D> {
        self.derived.as_ref().map(|d| &d.signal_truth)
    }

    #[must_use]
    pub fn data_minus_background(&self) -> Option<&Histogram1D> {
        self.derived.as_ref().map(|d| &d.data_minus_background)
    }

    /// Outputs of the last [`Self::compute`].
    #[must_use]
    pub fn outputs(&self) -> Option<&SpectrumOutputs> {
        self.outputs.as_ref()
    }

    /// Derives efficiency, acceptance and signal truth and builds the unfolder.
    /// Calling it again logs a warning and does nothing.
    ///
    /// # Errors
    /// Propagates binning mismatches from the correction histograms.
    pub fn initialize(&mut self) -> Result<()> {
        if self.derived.is_some() {
            warn!("spectrum '{}' already initialized", self.settings.systematic);
            return Ok(());
        }

        let signal_truth = self.response.signal_truth();
        let efficiency = self.response.efficiency(&self.generated)?;
        let acceptance = self.response.acceptance(&self.signal_reco)?;
        let chain = CorrectionChain::new(
            self.background.clone(),
            acceptance.clone(),
            efficiency.clone(),
            self.settings.luminosity,
            self.has_background,
        );
        let mut data_minus_background = chain.subtract_background(&self.data)?;
        data_minus_background.set_name("DataMinusBackground");

        let method = self.settings.method;
        let keep_response = self
            .settings
            .keep_response
            .unwrap_or_else(|| method.keeps_response());
        let mut unfolder = Unfolder::new(method, self.backend.clone())
            .with_keep_response(keep_response)
            .with_seed(self.settings.seed);
        unfolder.set_response_model(self.response.clone());

        info!(
            "initialized spectrum '{}': {} truth bins, method {method}, keep response {keep_response}",
            self.settings.systematic,
            signal_truth.n_bins()
        );
        self.derived = Some(Derived {
            signal_truth,
            efficiency,
            acceptance,
            data_minus_background,
            chain,
            unfolder,
        });
        Ok(())
    }

    /// Computes the absolute and relative differential cross-sections and
    /// their statistical uncertainties.
    ///
    /// Repeated calls with the same inputs and seed give identical outputs.
    ///
    /// # Errors
    /// Propagates configuration, precondition and numerical failures. A
    /// failing toy replica aborts the computation.
    pub fn compute(&mut self) -> Result<&SpectrumOutputs> {
        self.initialize()?;
        self.outputs = None;
        let Some(derived) = self.derived.as_mut() else {
            return Err(Error::Precondition("spectrum is not initialized".into()));
        };

        derived.unfolder.set_seed(self.settings.seed);
        let CrossSections {
            corrected,
            unfolded,
            mut absolute,
            mut relative,
            total,
        } = derived.chain.apply(&self.data, &mut derived.unfolder)?;
        let nominal = CrossSections {
            corrected: corrected.clone(),
            unfolded: unfolded.clone(),
            absolute: absolute.clone(),
            relative: relative.clone(),
            total,
        };

        let bad = absolute.non_finite_bins();
        if !bad.is_empty() {
            warn!("absolute cross-section has non-finite bins {bad:?}");
        }

        let toys = match self.settings.stat_error {
            StatErrorMode::Analytical => None,
            StatErrorMode::None => {
                absolute.clear_errors();
                relative.clear_errors();
                None
            }
            StatErrorMode::Toys(mode) => {
                absolute.clear_errors();
                relative.clear_errors();
                if self.settings.runs_toys() {
                    let config = ToyConfig::default()
                        .with_n_toys(self.settings.n_toys)
                        .with_seed(self.settings.seed)
                        .with_mode(mode);
                    let result = ToyEnsemble::new(&derived.chain, &self.data, &nominal, config)
                        .run(&derived.unfolder)?;
                    absolute.set_errors(&result.absolute.rms)?;
                    relative.set_errors(&result.relative.rms)?;
                    Some(result)
                } else {
                    info!("toy count is zero, no covariance produced");
                    None
                }
            }
        };

        let (theory_absolute, theory_relative) = self.theory();
        info!(
            "spectrum '{}': total cross-section {total:.6}",
            self.settings.systematic
        );

        Ok(self.outputs.insert(SpectrumOutputs {
            corrected,
            unfolded,
            absolute,
            relative,
            total_xs: total,
            theory_absolute,
            theory_relative,
            toys,
        }))
    }

    /// Theory predictions from the generated spectrum.
    fn theory(&self) -> (Histogram1D, Histogram1D) {
        let mut absolute = self.generated.renamed("TheoryXs_abs");
        absolute.divide_by_bin_width();
        absolute.scale(1.0 / self.settings.luminosity);

        let mut relative = self.generated.renamed("TheoryXs_rel");
        relative.scale(1.0 / self.generated.integral());
        relative.divide_by_bin_width();
        (absolute, relative)
    }

    /// Every histogram worth persisting, inputs first.
    ///
    /// Matrices, pull results and toy distributions appear only when a toy
    /// ensemble ran.
    #[must_use]
    pub fn named_histograms(&self) -> Vec<HistogramRef<'_>> {
        let mut out: Vec<HistogramRef<'_>> = vec![
            (&self.data).into(),
            (&self.signal_reco).into(),
            self.response.matrix().into(),
            (&self.background).into(),
            (&self.generated).into(),
        ];
        if let Some(derived) = &self.derived {
            out.push((&derived.data_minus_background).into());
            out.push((&derived.signal_truth).into());
            out.push((&derived.efficiency).into());
            out.push((&derived.acceptance).into());
        }
        if let Some(outputs) = &self.outputs {
            out.push((&outputs.unfolded).into());
            out.push((&outputs.absolute).into());
            out.push((&outputs.relative).into());
            if let Some(toys) = &outputs.toys {
                out.extend(toys.histograms_2d().into_iter().map(HistogramRef::from));
            }
            out.push((&outputs.theory_absolute).into());
            out.push((&outputs.theory_relative).into());
            if let Some(toys) = &outputs.toys {
                out.extend(toys.histograms_1d().into_iter().map(HistogramRef::from));
            }
        }
        out
    }
}
