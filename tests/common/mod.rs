//! Fixtures shared by the integration tests
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::RgbImage;
use safetensors::tensor::{Dtype, TensorView};
use sam_onnx_export::config::ExportConfig;
use sam_onnx_export::model::{lookup, Sam, PATCH_EMBED_KEY};
use tempfile::TempDir;

/// Write every tensor `model_type` needs, plus its patch embedding
pub fn write_checkpoint(path: &Path, model_type: &str) {
    let variant = lookup(model_type).unwrap();
    let mut tensors = Sam::expected_tensors(variant);
    tensors.push((
        PATCH_EMBED_KEY.to_string(),
        vec![variant.encoder_embed_dim, 3, 16, 16],
    ));

    let data: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
        .into_iter()
        .map(|(name, shape)| {
            let n: usize = shape.iter().product();
            let bytes = (0..n)
                .flat_map(|i| (((i % 11) as f32 - 5.0) * 0.01).to_le_bytes())
                .collect();
            (name, shape, bytes)
        })
        .collect();
    let views: Vec<(String, TensorView<'_>)> = data
        .iter()
        .map(|(name, shape, bytes)| {
            (
                name.clone(),
                TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap(),
            )
        })
        .collect();
    let serialized = safetensors::serialize(views, &None).unwrap();
    std::fs::write(path, serialized).unwrap();
}

/// A vit_b checkpoint next to an empty dataset
pub struct Fixture {
    _tmp: TempDir,
    pub root: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        std::fs::create_dir_all(root.join("dataset").join("images")).unwrap();
        write_checkpoint(&root.join("sam.safetensors"), "vit_b");
        Self { _tmp: tmp, root }
    }

    pub fn add_image(&self, name: &str, width: u32, height: u32) {
        RgbImage::new(width, height)
            .save(self.root.join("dataset").join("images").join(name))
            .unwrap();
    }

    /// Settings writing to `<root>/models`
    pub fn config(&self, quantize: bool) -> ExportConfig {
        self.config_in("models", quantize)
    }

    /// Settings writing to `<root>/<dir>`
    pub fn config_in(&self, dir: &str, quantize: bool) -> ExportConfig {
        ExportConfig {
            checkpoint_path: self.root.join("sam.safetensors"),
            model_type: "vit_b".to_string(),
            output_dir: self.root.join(dir),
            dataset_path: self.root.join("dataset"),
            opset_version: 15,
            quantize,
        }
    }

    pub fn output_files(&self) -> BTreeSet<String> {
        match std::fs::read_dir(self.root.join("models")) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => BTreeSet::new(),
        }
    }
}
