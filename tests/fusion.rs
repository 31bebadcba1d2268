use fallstream::error::PipelineError;
use fallstream::fusion::{
    FusionMode, LearnedFusion, LearnedInput, Svm, SvmParams, average, binarize, fuse,
};
use ndarray::{Array1, Array2, array};
use tempfile::TempDir;

#[test]
fn average_is_elementwise_mean() {
    let fused = fuse(
        &[array![0.0, 0.4, 1.0], array![0.2, 0.6, 1.0]],
        FusionMode::Average,
    )
    .unwrap();
    let expected = [0.1, 0.5, 1.0];
    for (a, b) in fused.iter().zip(expected) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn misaligned_streams_are_fatal() {
    let err = average(&[array![0.1, 0.2, 0.3], array![0.1, 0.2]]).unwrap_err();
    assert!(matches!(err, PipelineError::LengthMismatch { expected: 3, actual: 2, .. }));
}

#[test]
fn thresholding_is_a_separate_step() {
    let fused = average(&[array![0.3, 0.7], array![0.5, 0.4]]).unwrap();
    assert_eq!(binarize(fused.view(), 0.5).to_vec(), vec![0.0, 1.0]);
    assert_eq!(binarize(fused.view(), 0.4).to_vec(), vec![1.0, 1.0]);
}

fn separable() -> (Vec<Array1<f64>>, Array1<f64>) {
    let spatial = array![0.05, 0.1, 0.2, 0.15, 0.8, 0.9, 0.85, 0.95];
    let temporal = array![0.1, 0.2, 0.1, 0.3, 0.7, 0.8, 0.9, 0.75];
    let truth = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
    (vec![spatial, temporal], truth)
}

#[test]
fn learned_fusion_separates_clean_streams() {
    let (streams, truth) = separable();
    for input in [LearnedInput::PerStream, LearnedInput::Averaged] {
        let model = LearnedFusion::fit(input, &streams, truth.view(), &SvmParams::default()).unwrap();
        let predicted = fuse(&streams, FusionMode::Learned(&model)).unwrap();
        assert_eq!(predicted, truth, "{input:?}");
    }
}

#[test]
fn svm_needs_both_classes() {
    let x = Array2::from_shape_vec((3, 1), vec![0.1, 0.2, 0.3]).unwrap();
    let err = Svm::fit(x.view(), array![1.0, 1.0, 1.0].view(), &SvmParams::default()).unwrap_err();
    assert!(matches!(err, PipelineError::SingleClass(_)));
}

#[test]
fn svm_survives_a_save_load_cycle() {
    let (streams, truth) = separable();
    let model = LearnedFusion::fit(LearnedInput::Averaged, &streams, truth.view(), &SvmParams::default()).unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("svm_avg.json");
    model.svm.save(&path).unwrap();
    let loaded = Svm::load(&path).unwrap();

    let x = average(&streams).unwrap().insert_axis(ndarray::Axis(1));
    let before = model.svm.decision_function(x.view()).unwrap();
    let after = loaded.decision_function(x.view()).unwrap();
    for (a, b) in before.iter().zip(after.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
    assert_eq!(loaded.n_support(), model.svm.n_support());
}
