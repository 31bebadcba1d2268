use std::fs;
use std::path::Path;

use fallstream::config::{Config, StreamKind, Task};
use fallstream::ctx::Ctx;
use fallstream::flow::mean::MEAN_KEY;
use fallstream::net::NetSpec;
use fallstream::pipeline::stage0_scaffold::Stage0Scaffold;
use fallstream::pipeline::stage1_discover::Stage1Discover;
use fallstream::pipeline::stage2_transplant::Stage2Transplant;
use fallstream::pipeline::stage3_extract::Stage3Extract;
use fallstream::pipeline::stage4_load::Stage4Load;
use fallstream::pipeline::stage5_holdout::Stage5Holdout;
use fallstream::pipeline::stage6_cross_validate::Stage6CrossValidate;
use fallstream::pipeline::stage7_predict::Stage7Predict;
use fallstream::pipeline::stage8_fusion::Stage8Fusion;
use fallstream::pipeline::stage9_videos::Stage9Videos;
use fallstream::pipeline::stage10_output::Stage10Output;
use fallstream::pipeline::{Pipeline, Stage};
use fallstream::store::{StreamStore, Tensor, TensorBundle, write_bundle};
use fallstream::table::VideoTable;
use image::{GrayImage, Luma};
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use serde_json::Value;
use tempfile::TempDir;

const SIDE: usize = 8;
const WINDOW: usize = 2;

fn tiny_net() -> NetSpec {
    NetSpec {
        blocks: vec![vec![2]],
        num_features: 3,
    }
}

fn write_video(dir: &Path, frames: usize, base: u8) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..frames {
        for axis in ["x", "y"] {
            let img = GrayImage::from_fn(SIDE as u32, SIDE as u32, |x, y| {
                Luma([base.wrapping_add((x + y + i as u32) as u8)])
            });
            img.save(dir.join(format!("flow_{}_{:05}.png", axis, i + 1)))
                .unwrap();
        }
    }
}

fn write_dataset(root: &Path) {
    for v in 0..3 {
        write_video(&root.join("Falls").join(format!("fall-{:02}", v + 1)), 5, 200);
        write_video(&root.join("NotFalls").join(format!("adl-{:02}", v + 1)), 5, 10);
    }
    write_video(&root.join("NotFalls").join("adl-04"), 1, 10);
}

fn ramp(shape: &[usize], scale: f64) -> ArrayD<f64> {
    let n: usize = shape.iter().product();
    ArrayD::from_shape_vec(
        IxDyn(shape),
        (0..n).map(|i| ((i % 7) as f64 - 3.0) * scale).collect(),
    )
    .unwrap()
}

fn write_inputs(dir: &Path) {
    let spec = tiny_net();
    let channels = 2 * WINDOW;
    let flat = spec.flat_len(channels, SIDE, SIDE);

    let mut weights = TensorBundle::new();
    weights.insert("data/conv1_1/0", Tensor::from_f64(&ramp(&[2, channels, 3, 3], 0.01)));
    weights.insert("data/conv1_1/1", Tensor::column_f64(&[0.0, 0.1]));
    weights.insert("data/fc6/0", Tensor::from_f64(&ramp(&[3, flat], 0.001)));
    weights.insert("data/fc6/1", Tensor::column_f64(&[0.0, 0.0, 0.0]));
    write_bundle(&dir.join("weights.fst"), &weights).unwrap();

    let mut mean = TensorBundle::new();
    mean.insert(
        MEAN_KEY,
        Tensor::from_f64(&ArrayD::from_elem(IxDyn(&[SIDE, SIDE, channels]), 100.0)),
    );
    write_bundle(&dir.join("mean.fst"), &mean).unwrap();
}

fn config(task: Task, root: &Path) -> Config {
    let mut c = Config::new(task, root.join("stores"), root.join("out"));
    c.window = WINDOW;
    c.frame_height = SIDE;
    c.frame_width = SIDE;
    c.net = tiny_net();
    c.training.epochs = 5;
    c.training.learning_rate = 0.01;
    c
}

fn run(config: Config, stages: Vec<Box<dyn Stage>>) -> Ctx {
    config.validate().unwrap();
    let mut ctx = Ctx::new(config, "0.0.0-test");
    Pipeline::new(stages).run(&mut ctx).unwrap();
    ctx
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

#[test]
fn extract_train_and_score_a_temporal_stream() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_dataset(&root.join("data"));
    write_inputs(root);

    let mut extract = config(Task::Extract, root);
    extract.data_dir = Some(root.join("data"));
    extract.mean_path = Some(root.join("mean.fst"));
    extract.weights_path = Some(root.join("weights.fst"));
    let ctx = run(
        extract,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage1Discover::new()),
            Box::new(Stage2Transplant::new()),
            Box::new(Stage3Extract::new()),
            Box::new(Stage10Output::new()),
        ],
    );
    assert_eq!(ctx.videos.len(), 7);
    assert_eq!(ctx.warnings.len(), 1);
    let store = ctx.store(StreamKind::Temporal).unwrap();
    assert_eq!(store.n_samples(), 6 * 4);
    assert_eq!(store.features.ncols(), 3);
    assert_eq!(store.table.class_video_counts(), vec![3, 4]);
    assert_eq!(store.table.stack_counts(), vec![4, 4, 4, 4, 4, 4, 0]);
    assert!(ctx.config.samples_path(StreamKind::Temporal).exists());

    let mut train = config(Task::Train, root);
    train.test_fraction = 0.34;
    let ctx = run(
        train,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage4Load::new()),
            Box::new(Stage5Holdout::new()),
            Box::new(Stage8Fusion::new()),
            Box::new(Stage10Output::new()),
        ],
    );
    assert_eq!(ctx.stream_scores.len(), 1);
    assert!(ctx.fusion_scores.is_empty());
    assert!(ctx.config.classifier_path(StreamKind::Temporal).exists());
    let history = read_json(&ctx.config.history_path(StreamKind::Temporal));
    assert_eq!(history["loss"].as_array().unwrap().len(), 5);
    let report = read_json(&ctx.output.json_path);
    assert_eq!(report["tool"]["name"], "fallstream");
    assert_eq!(report["splits"][0]["test_videos"], 2);

    let ctx = run(
        config(Task::Result, root),
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage4Load::new()),
            Box::new(Stage7Predict::new()),
            Box::new(Stage8Fusion::new()),
            Box::new(Stage9Videos::new()),
            Box::new(Stage10Output::new()),
        ],
    );
    let videos = ctx.video_report.as_ref().unwrap();
    assert_eq!(videos.videos.len(), 6);
    let tsv = fs::read_to_string(&ctx.output.tsv_path).unwrap();
    assert!(tsv.starts_with("class\tvideo\tsamples"));
    assert_eq!(tsv.lines().count(), 7);
}

/// Spatial samples per video are the temporal count plus the window.
fn write_two_streams(config: &Config) {
    let temporal_counts = [3usize, 4, 3, 5, 4, 3, 3, 4];
    let class_videos = [4i64, 4];
    for (stream, extra) in [(StreamKind::Temporal, 0), (StreamKind::Spatial, WINDOW)] {
        let counts: Vec<i64> = temporal_counts.iter().map(|&c| (c + extra) as i64).collect();
        let table = VideoTable::from_counts(&counts, &class_videos).unwrap();
        let mut labels = Vec::new();
        for record in table.records() {
            labels.extend(std::iter::repeat(record.class_id as f64).take(record.stack_count));
        }
        let n = labels.len();
        let features = Array2::from_shape_fn((n, 4), |(i, j)| {
            let sign = if labels[i] == 0.0 { -1.0 } else { 1.0 };
            sign * (1.0 + j as f64) + 0.01 * ((i * 7 + j) % 5) as f64
        });
        StreamStore::new(stream, features, Array1::from(labels), table)
            .unwrap()
            .save(config)
            .unwrap();
    }
}

#[test]
fn two_streams_are_aligned_and_fused() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let mut train = config(Task::Train, root);
    train.streams = vec![StreamKind::Spatial, StreamKind::Temporal];
    train.test_fraction = 0.5;
    train.training.epochs = 20;
    write_two_streams(&train);

    let ctx = run(
        train,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage4Load::new()),
            Box::new(Stage5Holdout::new()),
            Box::new(Stage8Fusion::new()),
            Box::new(Stage10Output::new()),
        ],
    );
    let spatial = ctx.predictions_of(StreamKind::Spatial).unwrap();
    let temporal = ctx.predictions_of(StreamKind::Temporal).unwrap();
    assert_eq!(spatial.scores.len(), temporal.scores.len() + 4 * WINDOW);
    assert_eq!(spatial.aligned_truth(), temporal.aligned_truth());

    let names: Vec<&str> = ctx.fusion_scores.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["average", "svm", "svm_average"]);
    assert!(ctx.config.svm_path().exists());

    let mut result = config(Task::Result, root);
    result.streams = vec![StreamKind::Spatial, StreamKind::Temporal];
    let ctx = run(
        result,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage4Load::new()),
            Box::new(Stage7Predict::new()),
            Box::new(Stage8Fusion::new()),
            Box::new(Stage9Videos::new()),
            Box::new(Stage10Output::new()),
        ],
    );
    let fused = ctx.fused.as_ref().unwrap();
    assert_eq!(fused.len(), ctx.store(StreamKind::Temporal).unwrap().n_samples());
    assert_eq!(ctx.video_report.as_ref().unwrap().videos.len(), 8);
    let report = read_json(&ctx.output.json_path);
    assert_eq!(report["fusion"][0]["name"], "average");
    assert_eq!(report["videos"]["videos"].as_array().unwrap().len(), 8);
}

#[test]
fn cross_training_summarises_folds() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let mut cross = config(Task::CrossTrain, root);
    cross.nsplits = 3;
    cross.balance = true;
    write_two_streams(&cross);

    let ctx = run(
        cross,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage4Load::new()),
            Box::new(Stage6CrossValidate::new()),
            Box::new(Stage10Output::new()),
        ],
    );
    assert_eq!(ctx.cv_scores.len(), 1);
    let cv = &ctx.cv_scores[0];
    assert_eq!(cv.stream, "temporal");
    assert_eq!(cv.folds.len(), 3);
    assert_eq!(cv.summary.accuracy.folds, 3);
    assert!(ctx.config.classifier_path(StreamKind::Temporal).exists());
    let report = read_json(&ctx.output.json_path);
    assert_eq!(report["cross_validation"][0]["folds"].as_array().unwrap().len(), 3);
}

#[test]
fn balanced_folds_accept_the_largest_seed() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let mut cross = config(Task::CrossTrain, root);
    cross.nsplits = 2;
    cross.balance = true;
    cross.seed = u64::MAX;
    write_two_streams(&cross);

    let ctx = run(
        cross,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage4Load::new()),
            Box::new(Stage6CrossValidate::new()),
        ],
    );
    assert_eq!(ctx.cv_scores[0].folds.len(), 2);
}
