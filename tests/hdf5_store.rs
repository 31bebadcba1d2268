#![cfg(feature = "hdf5")]

use fallstream::config::{Config, StreamKind, Task};
use fallstream::store::{StreamStore, Tensor, TensorBundle, read_bundle, write_bundle};
use fallstream::table::VideoTable;
use ndarray::{Array1, Array2};
use tempfile::TempDir;

#[test]
fn nested_datasets_roundtrip_through_hdf5() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("weights.h5");
    let mut bundle = TensorBundle::new();
    bundle.insert("data/conv1_1/0", Tensor::column_f64(&[1.0, 2.0, 3.0]));
    bundle.insert("data/conv1_1/1", Tensor::column_f64(&[0.5]));
    bundle.insert("num", Tensor::column_i32(&[2, 3]));
    write_bundle(&path, &bundle).unwrap();

    let back = read_bundle(&path).unwrap();
    assert_eq!(
        back.require("data/conv1_1/0").unwrap().to_f64_vec(),
        vec![1.0, 2.0, 3.0]
    );
    assert_eq!(back.require("num").unwrap().to_i64_vec().unwrap(), vec![2, 3]);
}

#[test]
fn stream_store_in_h5_format() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::new(Task::Train, dir.path().to_path_buf(), dir.path().join("out"));
    config.store_ext = "h5".to_string();
    let table = VideoTable::from_counts(&[1, 2], &[1, 1]).unwrap();
    let store = StreamStore::new(
        StreamKind::Pose,
        Array2::from_elem((3, 2), 0.25),
        Array1::from(vec![0.0, 1.0, 1.0]),
        table,
    )
    .unwrap();
    store.save(&config).unwrap();
    let back = StreamStore::load(&config, StreamKind::Pose).unwrap();
    assert_eq!(back.features, store.features);
    assert_eq!(back.table, store.table);
}
