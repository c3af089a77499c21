//! SAM variant registry
//!
//! Maps model type keys to architecture hyperparameters. `default` is an alias
//! for `vit_h`, the variant the released `sam_vit_h_4b8939` checkpoint uses.

use super::Sam;
use crate::checkpoint::TensorSource;
use crate::error::{ExportError, Result};

/// Side of the square model input
pub const IMAGE_SIZE: usize = 1024;
/// Image encoder patch size
pub const PATCH_SIZE: usize = 16;
/// Prompt embedding dimension, shared by every variant
pub const PROMPT_EMBED_DIM: usize = 256;

/// Architecture of one SAM variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamVariant {
    pub name: &'static str,
    pub encoder_embed_dim: usize,
    pub encoder_depth: usize,
    pub encoder_num_heads: usize,
    pub encoder_global_attn_indexes: [usize; 4],
}

impl SamVariant {
    /// Side of the image embedding grid
    #[must_use]
    pub const fn image_embedding_size(&self) -> usize {
        IMAGE_SIZE / PATCH_SIZE
    }
}

const VIT_H: SamVariant = SamVariant {
    name: "vit_h",
    encoder_embed_dim: 1280,
    encoder_depth: 32,
    encoder_num_heads: 16,
    encoder_global_attn_indexes: [7, 15, 23, 31],
};

const VIT_L: SamVariant = SamVariant {
    name: "vit_l",
    encoder_embed_dim: 1024,
    encoder_depth: 24,
    encoder_num_heads: 16,
    encoder_global_attn_indexes: [5, 11, 17, 23],
};

const VIT_B: SamVariant = SamVariant {
    name: "vit_b",
    encoder_embed_dim: 768,
    encoder_depth: 12,
    encoder_num_heads: 12,
    encoder_global_attn_indexes: [2, 5, 8, 11],
};

const REGISTRY: [(&str, SamVariant); 4] = [
    ("default", VIT_H),
    ("vit_h", VIT_H),
    ("vit_l", VIT_L),
    ("vit_b", VIT_B),
];

/// Accepted model type keys
#[must_use]
pub fn model_types() -> Vec<&'static str> {
    REGISTRY.iter().map(|(key, _)| *key).collect()
}

/// Look up a variant by key
pub fn lookup(model_type: &str) -> Result<SamVariant> {
    REGISTRY
        .iter()
        .find(|(key, _)| *key == model_type)
        .map(|(_, variant)| *variant)
        .ok_or_else(|| ExportError::UnknownModelType {
            model_type: model_type.to_string(),
            supported: model_types().join(", "),
        })
}

/// Build the model for `model_type` from checkpoint weights
pub fn build_sam(model_type: &str, weights: &dyn TensorSource) -> Result<Sam> {
    let variant = lookup(model_type)?;
    Sam::from_state_dict(variant, weights)
}
