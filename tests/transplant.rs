use fallstream::error::PipelineError;
use fallstream::net::{Backbone, ConvNet, NetSpec};
use fallstream::store::{Tensor, TensorBundle};
use fallstream::weights::{
    LayerPlan, TensorPair, WeightArchive, conv_kernel_to_target, dense_kernel_to_target,
    restore_conv_kernel, restore_dense_kernel, transplant,
};
use ndarray::{Array1, Array3, ArrayD, IxDyn};

fn tiny_spec() -> NetSpec {
    NetSpec {
        blocks: vec![vec![3], vec![2]],
        num_features: 4,
    }
}

fn ramp(shape: &[usize]) -> ArrayD<f64> {
    let n: usize = shape.iter().product();
    ArrayD::from_shape_vec(IxDyn(shape), (0..n).map(|i| i as f64 * 0.01).collect()).unwrap()
}

/// Archive in the source layout: conv `(out, in, h, w)`, dense `(out, in)`.
fn tiny_archive(in_channels: usize, flat: usize) -> WeightArchive {
    let mut archive = WeightArchive::default();
    archive.insert(
        "conv1_1",
        TensorPair {
            kernel: ramp(&[3, in_channels, 3, 3]),
            bias: Array1::from(vec![0.1, 0.2, 0.3]),
        },
    );
    archive.insert(
        "conv2_1",
        TensorPair {
            kernel: ramp(&[2, 3, 3, 3]),
            bias: Array1::from(vec![0.0, -0.1]),
        },
    );
    archive.insert(
        "fc6",
        TensorPair {
            kernel: ramp(&[4, flat]),
            bias: Array1::zeros(4),
        },
    );
    archive
}

#[test]
fn conv_transform_is_invertible() {
    let kernel = ramp(&[5, 4, 3, 2]);
    let target = conv_kernel_to_target(&kernel).unwrap();
    assert_eq!(target.shape(), &[3, 2, 4, 5]);
    assert_eq!(restore_conv_kernel(&target).into_dyn(), kernel);
}

#[test]
fn conv_transform_flips_spatial_axes() {
    let kernel = ramp(&[1, 1, 3, 3]);
    let target = conv_kernel_to_target(&kernel).unwrap();
    // target[a, b] = source[h = 2 - a, w = 2 - b]
    for a in 0..3 {
        for b in 0..3 {
            assert_eq!(target[[a, b, 0, 0]], kernel[[0, 0, 2 - a, 2 - b]]);
        }
    }
}

#[test]
fn dense_transform_is_invertible() {
    let kernel = ramp(&[4, 6]);
    let target = dense_kernel_to_target(&kernel).unwrap();
    assert_eq!(target.shape(), &[6, 4]);
    assert_eq!(restore_dense_kernel(&target).into_dyn(), kernel);
}

#[test]
fn transplant_initialises_every_layer() {
    let spec = tiny_spec();
    let (c, h, w) = (4, 4, 4);
    let plan = LayerPlan::from_spec(&spec);
    let archive = tiny_archive(c, spec.flat_len(c, h, w));
    let mut net = ConvNet::new(&spec, c, h, w).unwrap();
    assert!(!net.is_initialized());

    let report = transplant(&archive, &plan, &mut net).unwrap();
    assert_eq!(report.conv_layers, 2);
    assert_eq!(report.dense_layers, 1);
    assert!(net.is_initialized());

    let embedding = net.embed(Array3::ones((c, h, w)).view()).unwrap();
    assert_eq!(embedding.len(), 4);
    assert!(embedding.iter().all(|v| v.is_finite()));
}

#[test]
fn transplanted_net_correlates_like_the_source() {
    let spec = NetSpec {
        blocks: vec![vec![1]],
        num_features: 4,
    };
    let (h, w) = (4, 4);
    let k = [1.0, 2.0, 3.0, 0.0, 0.0, 0.0, -1.0, 0.5, 0.25];
    let mut archive = WeightArchive::default();
    archive.insert(
        "conv1_1",
        TensorPair {
            kernel: ArrayD::from_shape_vec(IxDyn(&[1, 1, 3, 3]), k.to_vec()).unwrap(),
            bias: Array1::from(vec![0.1]),
        },
    );
    let mut eye = ArrayD::zeros(IxDyn(&[4, 4]));
    for i in 0..4 {
        eye[[i, i]] = 1.0;
    }
    archive.insert(
        "fc6",
        TensorPair {
            kernel: eye,
            bias: Array1::zeros(4),
        },
    );
    let mut net = ConvNet::new(&spec, 1, h, w).unwrap();
    transplant(&archive, &LayerPlan::from_spec(&spec), &mut net).unwrap();

    let input = Array3::from_shape_fn((1, h, w), |(_, y, x)| ((y * 7 + x * 3) % 5) as f64 - 1.5);
    // zero-padded cross-correlation with the source kernel, ReLU, 2x2 max-pool
    let mut conv = [[0.0f64; 4]; 4];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.1;
            for i in 0..3 {
                for j in 0..3 {
                    let (iy, ix) = (y as isize + i as isize - 1, x as isize + j as isize - 1);
                    if iy >= 0 && ix >= 0 && (iy as usize) < h && (ix as usize) < w {
                        acc += k[i * 3 + j] * input[[0, iy as usize, ix as usize]];
                    }
                }
            }
            conv[y][x] = acc.max(0.0);
        }
    }
    let mut expected = Vec::new();
    for py in 0..2 {
        for px in 0..2 {
            let cells = [
                conv[2 * py][2 * px],
                conv[2 * py][2 * px + 1],
                conv[2 * py + 1][2 * px],
                conv[2 * py + 1][2 * px + 1],
            ];
            expected.push(cells.iter().cloned().fold(f64::MIN, f64::max));
        }
    }

    let got = net.embed(input.view()).unwrap();
    for (g, e) in got.iter().zip(&expected) {
        assert!((g - e).abs() < 1e-12, "got {got:?}, expected {expected:?}");
    }
}

#[test]
fn missing_layer_is_named() {
    let spec = tiny_spec();
    let plan = LayerPlan::from_spec(&spec);
    let mut bundle = TensorBundle::new();
    bundle.insert("data/conv1_1/0", Tensor::from_f64(&ramp(&[3, 4, 3, 3])));
    bundle.insert("data/conv1_1/1", Tensor::column_f64(&[0.0, 0.0, 0.0]));
    bundle.insert("data/fc6/0", Tensor::from_f64(&ramp(&[4, 2])));
    let archive = WeightArchive::from_bundle(&bundle).unwrap();

    let err = archive.validate(&plan).unwrap_err();
    match err {
        PipelineError::MissingLayers(names) => {
            assert!(names.iter().any(|n| n.contains("conv2_1")));
            assert!(names.iter().any(|n| n.contains("fc6")));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn wrong_input_channels_is_a_shape_error() {
    let spec = tiny_spec();
    let (h, w) = (4, 4);
    let plan = LayerPlan::from_spec(&spec);
    let archive = tiny_archive(3, spec.flat_len(4, h, w));
    let mut net = ConvNet::new(&spec, 4, h, w).unwrap();
    let err = transplant(&archive, &plan, &mut net).unwrap_err();
    assert!(matches!(err, PipelineError::LayerShape { ref layer, .. } if layer == "conv1_1"));
    assert!(!net.is_initialized());
}
