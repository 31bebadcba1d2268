use fallstream::net::{Classifier, FitOptions, LogisticHead};
use ndarray::{Array1, Array2};
use tempfile::TempDir;

fn blobs() -> (Array2<f64>, Array1<f64>) {
    let n = 40;
    let x = Array2::from_shape_fn((n, 3), |(i, j)| {
        let centre = if i < n / 2 { -2.0 } else { 2.0 };
        centre + 0.1 * (((i * 3 + j) % 7) as f64 - 3.0)
    });
    let y = Array1::from_shape_fn(n, |i| if i < n / 2 { 0.0 } else { 1.0 });
    (x, y)
}

fn opts(epochs: usize) -> FitOptions {
    FitOptions {
        class_weight: [1.0, 1.0],
        batch_size: 8,
        epochs,
        seed: 42,
    }
}

#[test]
fn separable_blobs_are_learned() {
    let (x, y) = blobs();
    for batch_norm in [true, false] {
        let mut head = LogisticHead::new(0.05, batch_norm);
        let history = head.fit(x.view(), y.view(), Some((x.view(), y.view())), &opts(60)).unwrap();
        assert_eq!(history.loss.len(), 60);
        assert_eq!(history.val_accuracy.len(), 60);
        assert!(history.loss[59] < history.loss[0]);
        let p = head.predict(x.view()).unwrap();
        let correct = p
            .iter()
            .zip(y.iter())
            .filter(|(p, y)| (**p >= 0.5) == (**y == 1.0))
            .count();
        assert_eq!(correct, y.len(), "batch_norm {batch_norm}");
    }
}

#[test]
fn training_is_seeded() {
    let (x, y) = blobs();
    let mut a = LogisticHead::new(0.01, true);
    let mut b = LogisticHead::new(0.01, true);
    a.fit(x.view(), y.view(), None, &opts(3)).unwrap();
    b.fit(x.view(), y.view(), None, &opts(3)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn saved_head_predicts_the_same() {
    let (x, y) = blobs();
    let mut head = LogisticHead::new(0.05, true);
    head.fit(x.view(), y.view(), None, &opts(10)).unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("temporal_classifier_urfd.json");
    head.save(&path).unwrap();
    let loaded = LogisticHead::load(&path).unwrap();
    let before = head.predict(x.view()).unwrap();
    let after = loaded.predict(x.view()).unwrap();
    for (a, b) in before.iter().zip(after.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
}
