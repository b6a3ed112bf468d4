use std::fs;

use approx::assert_relative_eq;
use ndarray::Array2;
use tempfile::TempDir;
use xsunfold_algorithms::{SolverBackend, Spectrum};
use xsunfold_core::{Binning, Histogram1D, Histogram2D};
use xsunfold_io::{load_inputs, write_json, Error, HistogramFile, RunConfig};

fn binning() -> Binning {
    Binning::new(vec![0.0, 1.0, 2.0, 4.0]).unwrap()
}

/// Writes `mc.json`, `data.json` and `run.json` into `dir`.
fn write_run(dir: &TempDir, stat_err: &str, with_background: bool) {
    let mut response = Array2::zeros((3, 3));
    for (i, v) in [100.0, 200.0, 100.0].into_iter().enumerate() {
        response[[i, i]] = v;
    }
    let response = Histogram2D::from_counts("hResponse", binning(), binning(), response).unwrap();
    let sig = Histogram1D::from_counts("hSigReco", binning(), vec![100.0, 200.0, 100.0]).unwrap();
    let generated = Histogram1D::from_counts("hGen", binning(), vec![125.0, 250.0, 125.0]).unwrap();
    write_json(
        dir.path().join("mc.json"),
        &[(&response).into(), (&sig).into(), (&generated).into()],
    )
    .unwrap();

    let data = Histogram1D::from_counts("hData", binning(), vec![100.0, 200.0, 100.0]).unwrap();
    let bkg = Histogram1D::from_counts("hBkg", binning(), vec![10.0, 10.0, 10.0]).unwrap();
    write_json(dir.path().join("data.json"), &[(&data).into(), (&bkg).into()]).unwrap();

    let bkg_entry = if with_background {
        r#""bkg": { "file": "data.json", "hpath": "hBkg" },"#
    } else {
        ""
    };
    let config = format!(
        r#"{{
            "lumi": 2.0,
            "sig":  {{ "file": "mc.json", "hpath": "hSigReco" }},
            "data": {{ "file": "data.json", "hpath": "hData" }},
            "res":  {{ "file": "mc.json", "hpath": "hResponse" }},
            "gen":  {{ "file": "mc.json", "hpath": "hGen" }},
            {bkg_entry}
            "unfolding": {{ "method": "BinByBin", "ntoys": 50, "stat_err": "{stat_err}", "seed": 5 }}
        }}"#
    );
    fs::write(dir.path().join("run.json"), config).unwrap();
}

#[test]
fn test_config_to_saved_results() {
    let dir = TempDir::new().unwrap();
    write_run(&dir, "toys", true);

    let config = RunConfig::from_file(dir.path().join("run.json")).unwrap();
    let inputs = load_inputs(&config).unwrap();
    assert!(inputs.background.is_some());

    let backend = SolverBackend::initialize(config.solver).unwrap();
    let mut spectrum =
        Spectrum::new(inputs, config.spectrum_settings("nominal").unwrap(), backend).unwrap();
    let outputs = spectrum.compute().unwrap();
    // 190 / 0.8 over a bin of width 1 and luminosity 2
    assert_relative_eq!(outputs.absolute.content(1), 118.75, epsilon = 1e-9);
    // the last bin is two units wide
    assert_relative_eq!(outputs.absolute.content(2), 112.5 / 2.0 / 2.0, epsilon = 1e-9);

    let out = dir.path().join(config.default_output_path("nominal"));
    write_json(&out, &spectrum.named_histograms()).unwrap();

    let saved = HistogramFile::open(&out).unwrap();
    let names: Vec<&str> = saved.names().collect();
    assert_eq!(names[0], "Data");
    assert!(names.contains(&"Covariance_abs"));
    let absolute = saved.histogram_1d("AbsoluteDiffXs").unwrap();
    assert_eq!(absolute.binning(), &binning());
    assert_relative_eq!(absolute.content(1), 118.75, epsilon = 1e-9);
    assert!(absolute.error(1) > 0.0);
    let cov = saved.histogram_2d("Covariance_abs").unwrap();
    assert_eq!(cov.nx(), 3);
}

#[test]
fn test_missing_background_entry_loads_none() {
    let dir = TempDir::new().unwrap();
    write_run(&dir, "none", false);
    let config = RunConfig::from_file(dir.path().join("run.json")).unwrap();
    assert!(load_inputs(&config).unwrap().background.is_none());
}

#[test]
fn test_missing_histogram_reported() {
    let dir = TempDir::new().unwrap();
    write_run(&dir, "none", true);
    let mut config = RunConfig::from_file(dir.path().join("run.json")).unwrap();
    config.data.hpath = "hDataBlinded".to_string();
    let err = load_inputs(&config).unwrap_err();
    assert!(
        matches!(&err, Error::MissingHistogram { path, .. } if path == "hDataBlinded"),
        "{err}"
    );
}

#[test]
fn test_wrong_dimension_rejected() {
    let dir = TempDir::new().unwrap();
    write_run(&dir, "none", true);
    let mut config = RunConfig::from_file(dir.path().join("run.json")).unwrap();
    config.response.hpath = "hGen".to_string();
    assert!(matches!(load_inputs(&config), Err(Error::InvalidFormat(_))));
}
