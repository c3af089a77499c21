//! Segment Anything model parts needed for prompt-to-mask export
//!
//! Only the prompt encoder and mask decoder are materialized: the exported
//! graph takes precomputed image embeddings, so the image encoder weights are
//! used solely to check the checkpoint against the requested variant.

pub mod layers;
pub mod mask_decoder;
pub mod prompt_encoder;
pub mod registry;
pub mod transformer;

pub use mask_decoder::MaskDecoder;
pub use prompt_encoder::PromptEncoder;
pub use registry::{build_sam, lookup, model_types, SamVariant};

use crate::checkpoint::{ShapeRecorder, TensorSource};
use crate::error::{ExportError, Result};

/// Checkpoint key of the image encoder patch embedding
pub const PATCH_EMBED_KEY: &str = "image_encoder.patch_embed.proj.weight";

/// Checkpoint prefixes whose tensor data the export reads
pub const EXPORTED_PREFIXES: [&str; 2] = ["prompt_encoder.", "mask_decoder."];

/// Whether the data of checkpoint tensor `name` ends up in the exported graph
#[must_use]
pub fn is_exported_tensor(name: &str) -> bool {
    EXPORTED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Prompt encoder and mask decoder of one SAM variant
#[derive(Debug, Clone)]
pub struct Sam {
    pub variant: SamVariant,
    pub prompt_encoder: PromptEncoder,
    pub mask_decoder: MaskDecoder,
    pub image_size: usize,
    /// Logit threshold applied by downstream consumers
    pub mask_threshold: f32,
}

impl Sam {
    /// Load weights for `variant`, validating every tensor shape
    pub fn from_state_dict(variant: SamVariant, weights: &dyn TensorSource) -> Result<Self> {
        check_variant(variant, weights)?;

        let prompt_encoder = PromptEncoder::load(
            weights,
            registry::PROMPT_EMBED_DIM,
            variant.image_embedding_size(),
            registry::IMAGE_SIZE,
        )?;
        let mask_decoder = MaskDecoder::load(weights, registry::PROMPT_EMBED_DIM)?;

        tracing::debug!(variant = variant.name, "built SAM prompt encoder and mask decoder");
        Ok(Self {
            variant,
            prompt_encoder,
            mask_decoder,
            image_size: registry::IMAGE_SIZE,
            mask_threshold: 0.0,
        })
    }

    /// Every `(name, shape)` a checkpoint must provide for `variant`
    #[must_use]
    pub fn expected_tensors(variant: SamVariant) -> Vec<(String, Vec<usize>)> {
        let recorder = ShapeRecorder::new();
        // The recorder never fails and has no patch embedding to check
        if Self::from_state_dict(variant, &recorder).is_err() {
            return Vec::new();
        }
        recorder.into_requests()
    }
}

/// Compare the patch embedding width with the variant when the checkpoint has one
fn check_variant(variant: SamVariant, weights: &dyn TensorSource) -> Result<()> {
    let Some(shape) = weights.shape_of(PATCH_EMBED_KEY) else {
        tracing::debug!("checkpoint has no image encoder, skipping variant check");
        return Ok(());
    };
    let actual = shape.first().copied().unwrap_or(0);
    if actual != variant.encoder_embed_dim {
        return Err(ExportError::VariantMismatch {
            model_type: variant.name.to_string(),
            expected: variant.encoder_embed_dim,
            actual,
        });
    }
    Ok(())
}
