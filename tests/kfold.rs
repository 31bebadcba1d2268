use fallstream::error::PipelineError;
use fallstream::split::{CrossValidator, balance_classes};

fn labels(falls: usize, adl: usize) -> Vec<f64> {
    let mut y = vec![0.0; falls];
    y.extend(std::iter::repeat(1.0).take(adl));
    y
}

#[test]
fn every_sample_is_tested_exactly_once() {
    let y = labels(13, 22);
    let cv = CrossValidator::from_labels(&y, 4).unwrap().shuffled(3);
    let mut tested = vec![0usize; y.len()];
    let folds: Vec<_> = cv.folds().collect();
    assert_eq!(folds.len(), 4);
    for fold in &folds {
        for &i in &fold.test {
            tested[i] += 1;
        }
        assert_eq!(fold.train.len() + fold.test.len(), y.len());
        for i in &fold.test {
            assert!(!fold.train.contains(i));
        }
    }
    assert!(tested.iter().all(|&n| n == 1));
}

#[test]
fn folds_are_stratified() {
    let y = labels(10, 20);
    let cv = CrossValidator::from_labels(&y, 5).unwrap();
    for fold in cv.folds() {
        let falls = fold.test.iter().filter(|&&i| y[i] == 0.0).count();
        assert_eq!(falls, 2);
        assert_eq!(fold.test.len() - falls, 4);
    }
}

#[test]
fn uneven_pools_put_extras_first() {
    let cv = CrossValidator::new(vec![(0..7).collect()], 3).unwrap();
    let sizes: Vec<usize> = cv.folds().map(|f| f.test.len()).collect();
    assert_eq!(sizes, vec![3, 2, 2]);
}

#[test]
fn too_many_splits_is_a_config_error() {
    let err = CrossValidator::from_labels(&labels(2, 10), 3).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    assert!(CrossValidator::from_labels(&labels(5, 5), 1).is_err());
}

#[test]
fn non_binary_label_is_rejected() {
    let err = CrossValidator::from_labels(&[0.0, 1.0, 2.0], 2).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidLabel { index: 2, .. }));
}

#[test]
fn balancing_subsamples_the_majority() {
    let y = labels(3, 9);
    let indices: Vec<usize> = (0..y.len()).collect();
    let kept = balance_classes(&indices, &y, 5).unwrap();
    assert_eq!(kept.len(), 6);
    assert_eq!(kept.iter().filter(|&&i| y[i] == 0.0).count(), 3);
    assert!(kept.windows(2).all(|w| w[0] < w[1]));
}
