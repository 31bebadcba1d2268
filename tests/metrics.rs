use fallstream::error::PipelineError;
use fallstream::scores::{ConfusionMatrix, Evaluation, FoldSummary, evaluate, evaluate_threshold};
use ndarray::array;

#[test]
fn rates_use_fall_as_positive() {
    let truth = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
    let pred = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0];
    let m = *evaluate(truth.view(), pred.view()).unwrap().metrics().unwrap();

    assert_eq!(m.confusion, ConfusionMatrix { tp: 3, fn_: 1, fp: 1, tn: 5 });
    assert!((m.tpr - 0.75).abs() < 1e-12);
    assert!((m.fnr - 0.25).abs() < 1e-12);
    assert!((m.tnr - 5.0 / 6.0).abs() < 1e-12);
    assert!((m.fpr - 1.0 / 6.0).abs() < 1e-12);
    assert!((m.precision - 0.75).abs() < 1e-12);
    assert!((m.f1 - 0.75).abs() < 1e-12);
    assert!((m.accuracy - 0.8).abs() < 1e-12);
    assert_eq!(m.sensitivity(), m.recall);
    assert_eq!(m.far(), m.fpr);
    assert_eq!(m.mdr(), m.fnr);
}

#[test]
fn zero_denominator_degrades_to_accuracy() {
    // No fall predicted: tp + fp = 0.
    let truth = array![0.0, 1.0, 1.0, 1.0];
    let pred = array![1.0, 1.0, 1.0, 1.0];
    match evaluate(truth.view(), pred.view()).unwrap() {
        Evaluation::Degenerate { confusion, accuracy } => {
            assert_eq!(confusion.fn_, 1);
            assert!((accuracy - 0.75).abs() < 1e-12);
        }
        other => panic!("expected a degenerate evaluation, got {other:?}"),
    }
}

#[test]
fn threshold_is_applied_before_counting() {
    let truth = array![0.0, 0.0, 1.0, 1.0];
    let scores = array![0.1, 0.6, 0.7, 0.9];
    let e = evaluate_threshold(truth.view(), scores.view(), 0.5).unwrap();
    assert_eq!(e.confusion(), ConfusionMatrix { tp: 1, fn_: 1, fp: 0, tn: 2 });
    let e = evaluate_threshold(truth.view(), scores.view(), 0.65).unwrap();
    assert_eq!(e.confusion(), ConfusionMatrix { tp: 2, fn_: 0, fp: 0, tn: 2 });
}

#[test]
fn invalid_labels_and_lengths_are_errors() {
    let err = evaluate(array![0.0, 0.5].view(), array![0.0, 1.0].view()).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidLabel { index: 1, .. }));
    let err = evaluate(array![0.0].view(), array![0.0, 1.0].view()).unwrap_err();
    assert!(matches!(err, PipelineError::LengthMismatch { .. }));
}

#[test]
fn fold_summary_skips_degenerate_folds_except_accuracy() {
    let good = evaluate(array![0.0, 1.0].view(), array![0.0, 1.0].view()).unwrap();
    let half = evaluate(array![0.0, 0.0, 1.0, 1.0].view(), array![0.0, 1.0, 1.0, 0.0].view()).unwrap();
    let degenerate = evaluate(array![1.0, 1.0].view(), array![1.0, 0.0].view()).unwrap();

    let summary = FoldSummary::from_evaluations(&[good, half, degenerate]);
    assert_eq!(summary.sensitivity.folds, 2);
    assert!((summary.sensitivity.mean - 0.75).abs() < 1e-12);
    assert!((summary.sensitivity.std - 0.25).abs() < 1e-12);
    assert_eq!(summary.accuracy.folds, 3);
    assert!((summary.accuracy.mean - 2.0 / 3.0).abs() < 1e-12);
}
