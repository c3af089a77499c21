//! End-to-end pipeline tests against a synthetic checkpoint

mod common;

use std::collections::BTreeSet;

use common::Fixture;
use sam_onnx_export::export::{run, OUTPUT_NAMES};
use sam_onnx_export::onnx::proto::DataType;
use sam_onnx_export::onnx::tensor::value_info_dims;
use sam_onnx_export::onnx::{load_model, Dim};
use sam_onnx_export::quant::TEMP_MODEL_NAME;
use sam_onnx_export::ExportError;

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn test_one_artifact_per_distinct_size() {
    let fx = Fixture::new();
    fx.add_image("a.png", 640, 480);
    fx.add_image("b.jpg", 1280, 720);
    fx.add_image("c.JPG", 640, 480);
    fx.add_image("skipped.PNG", 32, 32);

    let report = run(&fx.config(false)).unwrap();
    assert_eq!(report.artifacts.len(), 2);
    assert_eq!(
        fx.output_files(),
        names(&["sam_onnx.480_640.onnx", "sam_onnx.720_1280.onnx"])
    );
}

#[test]
fn test_artifact_names_independent_of_listing_order() {
    let first = Fixture::new();
    first.add_image("a.png", 64, 48);
    first.add_image("z.png", 96, 32);

    let second = Fixture::new();
    second.add_image("z.png", 64, 48);
    second.add_image("a.png", 96, 32);

    run(&first.config(false)).unwrap();
    run(&second.config(false)).unwrap();
    assert_eq!(first.output_files(), second.output_files());
}

#[test]
fn test_unquantized_weights_stay_float() {
    let fx = Fixture::new();
    fx.add_image("a.png", 64, 48);
    let report = run(&fx.config(false)).unwrap();

    let model = load_model(&report.artifacts[0].path).unwrap();
    let graph = model.graph.unwrap();
    assert!(graph.initializer.iter().all(|t| {
        t.data_type == DataType::Float as i32 || t.data_type == DataType::Int64 as i32
    }));
    assert!(graph
        .initializer
        .iter()
        .any(|t| t.name == "mask_decoder.transformer.layers.0.self_attn.q_proj.weight"));
    assert!(!report.artifacts[0].quantized);
}

#[test]
fn test_quantized_export() {
    let fx = Fixture::new();
    fx.add_image("a.png", 64, 48);
    let report = run(&fx.config(true)).unwrap();

    assert_eq!(fx.output_files(), names(&["sam_onnx.48_64.onnx"]));
    assert!(!fx.root.join("models").join(TEMP_MODEL_NAME).exists());
    assert!(report.artifacts[0].quantized);

    let model = load_model(&report.artifacts[0].path).unwrap();
    let graph = model.graph.unwrap();
    assert!(graph
        .initializer
        .iter()
        .any(|t| t.data_type == DataType::Uint8 as i32));
    assert!(graph.node.iter().any(|n| n.op_type == "MatMulInteger"));
    assert!(graph.node.iter().any(|n| n.op_type == "ConvInteger"));

    // Interface is unchanged by quantization
    let outputs: Vec<_> = graph.output.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(outputs, OUTPUT_NAMES.to_vec());
    for name in OUTPUT_NAMES {
        assert!(graph.node.iter().any(|n| n.output.iter().any(|o| o == name)));
    }
}

#[test]
fn test_point_inputs_have_dynamic_axis() {
    let fx = Fixture::new();
    fx.add_image("a.png", 64, 48);
    let report = run(&fx.config(false)).unwrap();

    let model = load_model(&report.artifacts[0].path).unwrap();
    let graph = model.graph.unwrap();
    for input in &graph.input {
        let dims = value_info_dims(input).unwrap();
        for (axis, dim) in dims.iter().enumerate() {
            let dynamic = input.name.starts_with("point_") && axis == 1;
            match dim {
                Dim::Param(name) => {
                    assert!(dynamic, "{} axis {axis} should be fixed", input.name);
                    assert_eq!(name, "num_points");
                }
                Dim::Fixed(_) => assert!(!dynamic, "{} axis {axis}", input.name),
            }
        }
    }
    let orig = graph.input.iter().find(|i| i.name == "orig_im_size").unwrap();
    assert_eq!(value_info_dims(orig).unwrap(), vec![Dim::Fixed(2)]);
}

#[test]
fn test_no_images_no_artifacts() {
    let fx = Fixture::new();
    std::fs::write(fx.root.join("dataset").join("images").join("notes.txt"), "x").unwrap();
    let report = run(&fx.config(true)).unwrap();
    assert!(report.artifacts.is_empty());
    assert!(fx.output_files().is_empty());
}

#[test]
fn test_unknown_model_type_writes_nothing() {
    let fx = Fixture::new();
    fx.add_image("a.png", 64, 48);
    let mut config = fx.config(false);
    config.model_type = "vit_s".to_string();

    assert!(matches!(
        run(&config),
        Err(ExportError::UnknownModelType { .. })
    ));
    assert!(!fx.root.join("models").exists());
}

#[test]
fn test_checkpoint_for_other_variant_is_rejected() {
    let fx = Fixture::new();
    fx.add_image("a.png", 64, 48);
    let mut config = fx.config(false);
    config.model_type = "default".to_string();

    assert!(matches!(
        run(&config),
        Err(ExportError::VariantMismatch {
            expected: 1280,
            actual: 768,
            ..
        })
    ));
    assert!(fx.output_files().is_empty());
}
