//! Exported models executed in ONNX Runtime

mod common;

use std::path::Path;

use common::Fixture;
use ort::session::Session;
use ort::value::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use sam_onnx_export::export::{run, OUTPUT_NAMES};

const EMBED_DIM: usize = 256;
const GRID: usize = 64;

/// One decoder call's inputs
struct Prompt {
    embeddings: Vec<f32>,
    coords: Vec<f32>,
    labels: Vec<f32>,
    mask: Vec<f32>,
    has_mask: f32,
}

impl Prompt {
    fn random(num_points: usize, has_mask: bool, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut normal = |n: usize| -> Vec<f32> {
            (0..n).map(|_| rng.sample::<f32, _>(StandardNormal)).collect()
        };
        let embeddings = normal(EMBED_DIM * GRID * GRID);
        let mask = normal(16 * GRID * GRID);

        let coords = (0..num_points * 2)
            .map(|_| rng.random_range(0.0..1024.0f32))
            .collect();
        // Last point is the padding point of a prompt without a box
        let labels = (0..num_points)
            .map(|i| {
                if i + 1 == num_points {
                    -1.0
                } else {
                    f32::from(rng.random_range(0..2u8))
                }
            })
            .collect();

        Self {
            embeddings,
            coords,
            labels,
            mask,
            has_mask: if has_mask { 1.0 } else { 0.0 },
        }
    }

    fn num_points(&self) -> i64 {
        self.labels.len() as i64
    }
}

/// `(shape, values)` per output, in declaration order
fn run_model(path: &Path, prompt: &Prompt, height: usize, width: usize) -> Vec<(Vec<usize>, Vec<f32>)> {
    let session = Session::builder().unwrap().commit_from_file(path).unwrap();
    let tensor = |shape: Vec<i64>, data: Vec<f32>| -> Tensor<f32> {
        Tensor::from_array((shape, data)).unwrap()
    };
    let n = prompt.num_points();
    let grid = GRID as i64;
    let inputs = vec![
        (
            "image_embeddings",
            tensor(vec![1, EMBED_DIM as i64, grid, grid], prompt.embeddings.clone()),
        ),
        ("point_coords", tensor(vec![1, n, 2], prompt.coords.clone())),
        ("point_labels", tensor(vec![1, n], prompt.labels.clone())),
        ("mask_input", tensor(vec![1, 1, 4 * grid, 4 * grid], prompt.mask.clone())),
        ("has_mask_input", tensor(vec![1], vec![prompt.has_mask])),
        ("orig_im_size", tensor(vec![2], vec![height as f32, width as f32])),
    ];

    let outputs = session.run(inputs).unwrap();
    OUTPUT_NAMES
        .iter()
        .map(|name| {
            let view = outputs[*name].try_extract_tensor::<f32>().unwrap();
            (view.shape().to_vec(), view.iter().copied().collect())
        })
        .collect()
}

#[test]
fn test_float_model_runs_for_any_point_count() {
    let fx = Fixture::new();
    fx.add_image("a.png", 64, 48);
    let report = run(&fx.config(false)).unwrap();
    let path = &report.artifacts[0].path;

    for (seed, num_points) in [2usize, 3, 5].into_iter().enumerate() {
        let prompt = Prompt::random(num_points, seed % 2 == 1, seed as u64);
        let outputs = run_model(path, &prompt, 48, 64);

        let shapes: Vec<_> = outputs.iter().map(|(shape, _)| shape.clone()).collect();
        assert_eq!(
            shapes,
            vec![vec![1, 1, 48, 64], vec![1, 1], vec![1, 1, 256, 256]],
            "{num_points} points"
        );
        for ((_, values), name) in outputs.iter().zip(OUTPUT_NAMES) {
            assert!(values.iter().all(|v| v.is_finite()), "{name} with {num_points} points");
        }
    }
}

#[test]
fn test_masks_follow_original_image_size() {
    let fx = Fixture::new();
    fx.add_image("wide.png", 100, 30);
    let report = run(&fx.config(false)).unwrap();

    let prompt = Prompt::random(2, false, 11);
    let outputs = run_model(&report.artifacts[0].path, &prompt, 30, 100);
    assert_eq!(outputs[0].0, vec![1, 1, 30, 100]);
}

#[test]
fn test_quantized_model_tracks_float_outputs() {
    let fx = Fixture::new();
    fx.add_image("a.png", 64, 48);
    let float = run(&fx.config_in("float", false)).unwrap();
    let quantized = run(&fx.config_in("quantized", true)).unwrap();

    let prompt = Prompt::random(3, true, 5);
    let expected = run_model(&float.artifacts[0].path, &prompt, 48, 64);
    let actual = run_model(&quantized.artifacts[0].path, &prompt, 48, 64);

    // low_res_masks
    let (shape, want) = &expected[2];
    let (quant_shape, got) = &actual[2];
    assert_eq!(shape, quant_shape);

    let scale = want.iter().fold(0.0f32, |m, v| m.max(v.abs())).max(1e-3);
    let max_diff = want
        .iter()
        .zip(got)
        .fold(0.0f32, |m, (a, b)| m.max((a - b).abs()));
    assert!(
        max_diff <= 0.05 * scale,
        "quantized masks drift by {max_diff} (scale {scale})"
    );
}
