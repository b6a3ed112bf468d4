//! Closure tests: unfolding the folded truth gives the truth back.
use approx::assert_relative_eq;
use ndarray::{array, Array2};
use xsunfold_algorithms::{
    Error, QuboSolverKind, SolverBackend, SolverConfig, Unfolder, UnfoldingMethod,
};
use xsunfold_core::{Binning, Histogram1D, Histogram2D};

const TRUTH: [f64; 3] = [100.0, 200.0, 100.0];

fn backend() -> SolverBackend {
    SolverBackend::initialize(SolverConfig::default()).unwrap()
}

/// Reco × truth response whose columns sum to [`TRUTH`].
fn response(reco_bins: usize, contents: Array2<f64>) -> Histogram2D {
    Histogram2D::from_counts(
        "Response",
        Binning::uniform(reco_bins, 0.0, 3.0).unwrap(),
        Binning::uniform(3, 0.0, 3.0).unwrap(),
        contents,
    )
    .unwrap()
}

fn smeared() -> Histogram2D {
    response(
        3,
        array![[80.0, 10.0, 0.0], [20.0, 160.0, 10.0], [0.0, 30.0, 90.0]],
    )
}

/// Folds the truth through a fully efficient response.
fn folded(matrix: &Histogram2D) -> Histogram1D {
    let mut measured = matrix.projection_x("DataCorrected");
    measured.set_errors(&vec![1.0; measured.n_bins()]).unwrap();
    measured
}

fn unfold(method: UnfoldingMethod, matrix: &Histogram2D) -> Histogram1D {
    let mut unfolder = Unfolder::new(method, backend());
    unfolder.set_response(matrix.clone(), false);
    unfolder.set_measured(folded(matrix));
    unfolder.unfold().unwrap()
}

#[test]
fn test_inversion_closes_on_smeared_response() {
    let unfolded = unfold(UnfoldingMethod::Inversion, &smeared());
    for (value, truth) in unfolded.contents().iter().zip(TRUTH) {
        assert_relative_eq!(*value, truth, epsilon = 1e-9);
    }
    // off-diagonal migrations inflate the propagated errors above the input
    assert!(unfolded.errors().iter().all(|e| *e > 1.0));
}

#[test]
fn test_inversion_uses_pseudo_inverse_for_non_square() {
    let matrix = response(
        4,
        array![
            [60.0, 10.0, 0.0],
            [40.0, 90.0, 0.0],
            [0.0, 80.0, 30.0],
            [0.0, 20.0, 70.0]
        ],
    );
    let unfolded = unfold(UnfoldingMethod::Inversion, &matrix);
    for (value, truth) in unfolded.contents().iter().zip(TRUTH) {
        assert_relative_eq!(*value, truth, epsilon = 1e-6);
    }
}

#[test]
fn test_bayes_is_stationary_at_the_true_prior() {
    for iterations in [1, 4, 10] {
        let unfolded = unfold(UnfoldingMethod::Bayes { iterations }, &smeared());
        for (value, truth) in unfolded.contents().iter().zip(TRUTH) {
            assert_relative_eq!(*value, truth, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_svd_regularized_result_is_damped_but_sane() {
    let unfolded = unfold(UnfoldingMethod::Svd { rank: None }, &smeared());
    assert_eq!(unfolded.name(), "DataUnfolded");
    assert!(unfolded.contents().iter().all(|v| v.is_finite()));
    assert!(unfolded.integral() > 0.0);
    assert!(unfolded.integral() < 2.0 * 400.0);
}

#[test]
fn test_bin_by_bin_rejects_non_square() {
    let matrix = response(4, Array2::from_elem((4, 3), 10.0));
    let mut unfolder = Unfolder::new(UnfoldingMethod::BinByBin, backend());
    unfolder.set_response(matrix.clone(), false);
    unfolder.set_measured(folded(&matrix));
    assert!(matches!(unfolder.unfold(), Err(Error::Precondition(_))));
}

#[test]
fn test_method_names_are_case_insensitive() {
    let cases = [
        ("Inversion", UnfoldingMethod::Inversion),
        ("BINBYBIN", UnfoldingMethod::BinByBin),
        ("svd", UnfoldingMethod::Svd { rank: None }),
    ];
    for (name, expected) in cases {
        assert_eq!(name.parse::<UnfoldingMethod>().unwrap(), expected);
    }
    assert!(matches!(
        "hyb".parse::<UnfoldingMethod>().unwrap(),
        UnfoldingMethod::Qubo {
            solver: QuboSolverKind::Hybrid,
            ..
        }
    ));
}

#[test]
fn test_qubo_hybrid_reproduces_diagonal_counts() {
    let matrix = response(
        3,
        array![[100.0, 0.0, 0.0], [0.0, 200.0, 0.0], [0.0, 0.0, 100.0]],
    );
    let method = UnfoldingMethod::Qubo {
        strength: 0.0,
        solver: QuboSolverKind::Hybrid,
    };
    let mut unfolder = Unfolder::new(method, backend()).with_seed(3);
    unfolder.set_response(matrix.clone(), false);
    unfolder.set_measured(folded(&matrix));
    let unfolded = unfolder.unfold().unwrap();
    for (value, truth) in unfolded.contents().iter().zip(TRUTH) {
        assert_relative_eq!(*value, truth, max_relative = 0.05);
    }
    assert!(unfolded.errors().iter().all(|e| *e == 0.0));
}
