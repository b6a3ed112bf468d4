#![allow(clippy::float_cmp)]
use approx::assert_relative_eq;
use ndarray::Array2;
use xsunfold_algorithms::{
    Error, SmearingMode, SolverBackend, SolverConfig, Spectrum, SpectrumInputs, SpectrumSettings,
    StatErrorMode, UnfoldingMethod,
};
use xsunfold_core::{Binning, Histogram1D, Histogram2D, HistogramRef};

fn binning() -> Binning {
    Binning::uniform(3, 0.0, 3.0).unwrap()
}

fn hist(name: &str, values: [f64; 3]) -> Histogram1D {
    Histogram1D::from_counts(name, binning(), values.to_vec()).unwrap()
}

fn diagonal(values: [f64; 3]) -> Histogram2D {
    let mut contents = Array2::zeros((3, 3));
    for (i, v) in values.iter().enumerate() {
        contents[[i, i]] = *v;
    }
    Histogram2D::from_counts("migration", binning(), binning(), contents).unwrap()
}

/// Diagonal response with 80% efficiency and full acceptance.
fn inputs() -> SpectrumInputs {
    SpectrumInputs {
        data: hist("data_obs", [100.0, 200.0, 100.0]),
        signal_reco: hist("sig_reco", [100.0, 200.0, 100.0]),
        response: diagonal([100.0, 200.0, 100.0]),
        generated: hist("gen", [125.0, 250.0, 125.0]),
        background: Some(hist("bkg", [10.0, 10.0, 10.0])),
    }
}

fn backend() -> SolverBackend {
    SolverBackend::initialize(SolverConfig::default()).unwrap()
}

fn settings() -> SpectrumSettings {
    SpectrumSettings::default()
        .with_method(UnfoldingMethod::BinByBin)
        .with_stat_error(StatErrorMode::Analytical)
        .with_n_toys(0)
}

#[test]
fn test_bin_by_bin_end_to_end() {
    let mut spectrum = Spectrum::new(inputs(), settings(), backend()).unwrap();
    let outputs = spectrum.compute().unwrap().clone();

    for (i, expected) in [112.5, 237.5, 112.5].into_iter().enumerate() {
        assert_relative_eq!(outputs.absolute.content(i), expected, epsilon = 1e-9);
    }
    assert_relative_eq!(outputs.total_xs, 462.5, epsilon = 1e-9);
    let normalization: f64 = outputs
        .relative
        .bins()
        .map(|bin| bin.content * bin.width())
        .sum();
    assert_relative_eq!(normalization, 1.0, epsilon = 1e-12);
    assert!(outputs.absolute.errors().iter().all(|e| *e > 0.0));
    assert!(outputs.toys.is_none());

    assert_eq!(spectrum.acceptance().unwrap().contents(), &[1.0, 1.0, 1.0]);
    assert_eq!(
        spectrum.data_minus_background().unwrap().contents(),
        &[90.0, 190.0, 90.0]
    );
    for eff in spectrum.efficiency().unwrap().contents() {
        assert_relative_eq!(*eff, 0.8, epsilon = 1e-12);
    }
}

#[test]
fn test_luminosity_and_bin_width_normalization() {
    let settings = settings().with_luminosity(2.0);
    let mut spectrum = Spectrum::new(inputs(), settings, backend()).unwrap();
    let outputs = spectrum.compute().unwrap();
    assert_relative_eq!(outputs.absolute.content(1), 237.5 / 2.0, epsilon = 1e-9);
    assert_relative_eq!(outputs.total_xs, 462.5 / 2.0, epsilon = 1e-9);
    assert_relative_eq!(outputs.theory_absolute.content(1), 125.0, epsilon = 1e-9);
    assert_relative_eq!(outputs.theory_relative.content(1), 0.5, epsilon = 1e-9);
}

fn zero_generated_bin() -> SpectrumInputs {
    let mut inputs = inputs();
    inputs.generated = hist("gen", [125.0, 0.0, 125.0]);
    inputs
}

#[test]
fn test_zero_generated_bin_does_not_abort() {
    let mut spectrum = Spectrum::new(zero_generated_bin(), settings(), backend()).unwrap();
    let outputs = spectrum.compute().unwrap().clone();
    assert!(!outputs.absolute.content(1).is_finite());
    assert_relative_eq!(outputs.absolute.content(0), 112.5, epsilon = 1e-9);
    assert_relative_eq!(outputs.absolute.content(2), 112.5, epsilon = 1e-9);

    let efficiency = spectrum.efficiency().unwrap();
    assert!(!efficiency.content(1).is_finite());
    assert_relative_eq!(efficiency.content(0), 0.8, epsilon = 1e-12);
    assert_relative_eq!(efficiency.content(2), 0.8, epsilon = 1e-12);
}

#[test]
fn test_zero_generated_bin_survives_toys() {
    let settings = settings()
        .with_stat_error(StatErrorMode::Toys(SmearingMode::Poisson))
        .with_n_toys(50)
        .with_seed(3);
    let mut spectrum = Spectrum::new(zero_generated_bin(), settings, backend()).unwrap();
    let outputs = spectrum.compute().unwrap();
    assert!(!outputs.absolute.content(1).is_finite());
    assert!(outputs.absolute.content(0).is_finite());
    assert!(outputs.absolute.error(0) > 0.0);
    assert_eq!(outputs.toys.as_ref().unwrap().n_toys, 50);
}

#[test]
fn test_missing_background_is_zero() {
    let mut inputs = inputs();
    inputs.background = None;
    let mut spectrum = Spectrum::new(inputs, settings(), backend()).unwrap();
    assert!(!spectrum.has_background());
    let outputs = spectrum.compute().unwrap();
    assert_relative_eq!(outputs.absolute.content(0), 125.0, epsilon = 1e-9);
}

#[test]
fn test_binning_mismatch_rejected() {
    let mut inputs = inputs();
    inputs.data = Histogram1D::from_counts(
        "data_obs",
        Binning::uniform(3, 0.0, 6.0).unwrap(),
        vec![1.0, 2.0, 3.0],
    )
    .unwrap();
    let err = Spectrum::new(inputs, settings(), backend()).unwrap_err();
    assert!(matches!(err, Error::BinningMismatch { .. }), "{err}");
}

#[test]
fn test_unknown_method_name_rejected() {
    let err = "Tikhonov".parse::<UnfoldingMethod>().unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_total_mode_collapses_inputs() {
    let settings = settings().with_do_total(true);
    let mut spectrum = Spectrum::new(inputs(), settings, backend()).unwrap();
    assert_eq!(spectrum.data().n_bins(), 1);
    let outputs = spectrum.compute().unwrap();
    assert_eq!(outputs.absolute.n_bins(), 1);
    assert_relative_eq!(outputs.absolute.content(0), 462.5, epsilon = 1e-9);
    assert_relative_eq!(outputs.relative.content(0), 1.0, epsilon = 1e-12);
}

#[test]
fn test_disabled_efficiency_uses_truth_projection() {
    let settings = settings().with_do_eff(false);
    let mut spectrum = Spectrum::new(inputs(), settings, backend()).unwrap();
    spectrum.compute().unwrap();
    assert_eq!(spectrum.efficiency().unwrap().contents(), &[1.0, 1.0, 1.0]);
}

#[test]
fn test_disabled_efficiency_keeps_branching_ratio() {
    let settings = settings().with_do_eff(false).with_branching_ratio(0.5);
    let mut spectrum = Spectrum::new(inputs(), settings, backend()).unwrap();
    assert_eq!(spectrum.generated().contents(), &[200.0, 400.0, 200.0]);
    let outputs = spectrum.compute().unwrap().clone();
    for eff in spectrum.efficiency().unwrap().contents() {
        assert_relative_eq!(*eff, 0.5, epsilon = 1e-12);
    }
    assert_relative_eq!(outputs.absolute.content(1), 380.0, epsilon = 1e-9);
}

#[test]
fn test_transposed_response_is_reoriented() {
    let mut inputs = inputs();
    inputs.response = Histogram2D::from_counts(
        "migration",
        binning(),
        binning(),
        ndarray::array![[90.0, 10.0, 0.0], [0.0, 180.0, 20.0], [0.0, 0.0, 100.0]],
    )
    .unwrap();
    let settings = settings().with_transpose_response(true);
    let spectrum = Spectrum::new(inputs, settings, backend()).unwrap();
    assert_eq!(spectrum.response().matrix().content(0, 1), 0.0);
    assert_eq!(spectrum.response().matrix().content(1, 0), 10.0);
}

#[test]
fn test_second_initialize_is_a_no_op() {
    let mut spectrum = Spectrum::new(inputs(), settings(), backend()).unwrap();
    spectrum.initialize().unwrap();
    let efficiency = spectrum.efficiency().unwrap().clone();
    spectrum.initialize().unwrap();
    assert_eq!(spectrum.efficiency().unwrap(), &efficiency);
}

#[test]
fn test_toys_produce_symmetric_covariance() {
    let settings = settings()
        .with_stat_error(StatErrorMode::Toys(SmearingMode::Poisson))
        .with_n_toys(400)
        .with_seed(7);
    let mut spectrum = Spectrum::new(inputs(), settings, backend()).unwrap();
    let outputs = spectrum.compute().unwrap();
    let toys = outputs.toys.as_ref().unwrap();
    assert_eq!(toys.n_toys, 400);

    let cov = &toys.absolute.covariance;
    let corr = &toys.absolute.correlation;
    for i in 0..3 {
        assert_relative_eq!(corr.content(i, i), 1.0, epsilon = 1e-9);
        assert!(cov.content(i, i) > 0.0);
        for j in 0..3 {
            assert_eq!(cov.content(i, j), cov.content(j, i));
        }
    }
    for (i, rms) in toys.absolute.rms.iter().enumerate() {
        assert_eq!(outputs.absolute.error(i), *rms);
    }
    // Poisson spread of 200 counts scaled by 1/0.8
    assert!((outputs.absolute.error(1) - 200f64.sqrt() / 0.8).abs() < 4.0);
}

#[test]
fn test_fixed_seed_is_reproducible() {
    let settings = settings()
        .with_method(UnfoldingMethod::Bayes { iterations: 3 })
        .with_stat_error(StatErrorMode::Toys(SmearingMode::Poisson))
        .with_n_toys(64)
        .with_seed(11);
    let mut spectrum = Spectrum::new(inputs(), settings, backend()).unwrap();
    let first = spectrum.compute().unwrap().clone();
    let second = spectrum.compute().unwrap().clone();
    assert_eq!(first.absolute, second.absolute);
    assert_eq!(first.relative, second.relative);
    let (a, b) = (first.toys.unwrap(), second.toys.unwrap());
    assert_eq!(a.absolute.covariance, b.absolute.covariance);
    assert_eq!(a.total_distribution, b.total_distribution);
}

#[test]
fn test_gauss_toys_with_zero_errors_have_zero_spread() {
    let mut inputs = inputs();
    inputs.data =
        Histogram1D::from_parts("data_obs", binning(), vec![100.0, 200.0, 100.0], vec![0.0; 3])
            .unwrap();
    inputs.background = None;
    let settings = settings()
        .with_stat_error(StatErrorMode::Toys(SmearingMode::Gauss))
        .with_n_toys(16);
    let mut spectrum = Spectrum::new(inputs, settings, backend()).unwrap();
    let outputs = spectrum.compute().unwrap();
    assert!(outputs.absolute.errors().iter().all(|e| e.abs() < 1e-9));
    let toys = outputs.toys.as_ref().unwrap();
    assert!(toys.absolute.pull_mean.contents().iter().all(|c| c.is_nan()));
}

#[test]
fn test_zero_toys_produce_no_matrices() {
    let settings = settings()
        .with_stat_error(StatErrorMode::Toys(SmearingMode::Poisson))
        .with_n_toys(0);
    let mut spectrum = Spectrum::new(inputs(), settings, backend()).unwrap();
    let outputs = spectrum.compute().unwrap();
    assert!(outputs.toys.is_none());
    assert!(outputs.absolute.errors().iter().all(|e| *e == 0.0));
    assert!(!spectrum
        .named_histograms()
        .iter()
        .any(|h| matches!(h, HistogramRef::TwoD(m) if m.name().starts_with("Covariance"))));
}

#[test]
fn test_named_histograms_order() {
    let settings = settings()
        .with_stat_error(StatErrorMode::Toys(SmearingMode::Poisson))
        .with_n_toys(20);
    let mut spectrum = Spectrum::new(inputs(), settings, backend()).unwrap();
    spectrum.compute().unwrap();
    let histograms = spectrum.named_histograms();
    let names: Vec<&str> = histograms.iter().map(HistogramRef::name).collect();
    assert_eq!(
        &names[..5],
        &["Data", "SignalReco", "Response", "Background", "Generated"]
    );
    for expected in [
        "Efficiency",
        "Acceptance",
        "DataUnfolded",
        "AbsoluteDiffXs",
        "RelativeDiffXs",
        "Covariance_abs",
        "Correlation_rel",
        "TheoryXs_abs",
        "PullTestMean_abs",
        "TotalXs_toys",
    ] {
        assert!(names.contains(&expected), "missing {expected}");
    }
}
