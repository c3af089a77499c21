//! Prompt encoder: point and mask prompts to sparse/dense embeddings

use std::f32::consts::PI;

use super::layers::{gelu, Conv2d, LayerNorm2d};
use crate::checkpoint::TensorSource;
use crate::error::Result;
use crate::onnx::{DataType, GraphBuilder};

/// Point label values with a learned embedding
pub const NUM_POINT_EMBEDDINGS: usize = 4;

/// Channels of the hidden mask downscaling layer
const MASK_IN_CHANS: usize = 16;

/// Downsamples a low resolution mask to the image embedding grid
#[derive(Debug, Clone)]
pub struct MaskDownscaling {
    conv1: Conv2d,
    norm1: LayerNorm2d,
    conv2: Conv2d,
    norm2: LayerNorm2d,
    conv3: Conv2d,
}

impl MaskDownscaling {
    fn load(src: &dyn TensorSource, embed_dim: usize) -> Result<Self> {
        let p = "prompt_encoder.mask_downscaling";
        let quarter = MASK_IN_CHANS / 4;
        Ok(Self {
            conv1: Conv2d::load(src, &format!("{p}.0"), 1, quarter, 2, 2)?,
            norm1: LayerNorm2d::load(src, &format!("{p}.1"), quarter)?,
            conv2: Conv2d::load(src, &format!("{p}.3"), quarter, MASK_IN_CHANS, 2, 2)?,
            norm2: LayerNorm2d::load(src, &format!("{p}.4"), MASK_IN_CHANS)?,
            conv3: Conv2d::load(src, &format!("{p}.6"), MASK_IN_CHANS, embed_dim, 1, 1)?,
        })
    }

    fn emit(&self, g: &mut GraphBuilder, mask: &str) -> String {
        let x = self.conv1.emit(g, mask);
        let x = self.norm1.emit(g, &x);
        let x = gelu(g, &x);
        let x = self.conv2.emit(g, &x);
        let x = self.norm2.emit(g, &x);
        let x = gelu(g, &x);
        self.conv3.emit(g, &x)
    }
}

/// Prompt encoder weights
#[derive(Debug, Clone)]
pub struct PromptEncoder {
    pub embed_dim: usize,
    /// Side of the square image embedding grid
    pub image_embedding_size: usize,
    /// Side of the square model input
    pub input_image_size: usize,
    /// Random Fourier feature matrix, `[2, embed_dim / 2]`
    pub pe_gaussian: Vec<f32>,
    pub point_embeddings: Vec<Vec<f32>>,
    pub not_a_point_embed: Vec<f32>,
    pub no_mask_embed: Vec<f32>,
    pub mask_downscaling: MaskDownscaling,
}

impl PromptEncoder {
    pub fn load(
        src: &dyn TensorSource,
        embed_dim: usize,
        image_embedding_size: usize,
        input_image_size: usize,
    ) -> Result<Self> {
        let p = "prompt_encoder";
        let pe_gaussian = src.require(
            &format!("{p}.pe_layer.positional_encoding_gaussian_matrix"),
            &[2, embed_dim / 2],
        )?;
        let point_embeddings = (0..NUM_POINT_EMBEDDINGS)
            .map(|i| src.require(&format!("{p}.point_embeddings.{i}.weight"), &[1, embed_dim]))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            embed_dim,
            image_embedding_size,
            input_image_size,
            pe_gaussian,
            point_embeddings,
            not_a_point_embed: src.require(&format!("{p}.not_a_point_embed.weight"), &[1, embed_dim])?,
            no_mask_embed: src.require(&format!("{p}.no_mask_embed.weight"), &[1, embed_dim])?,
            mask_downscaling: MaskDownscaling::load(src, embed_dim)?,
        })
    }

    /// Side of the low resolution mask prompt
    #[must_use]
    pub fn mask_input_size(&self) -> usize {
        4 * self.image_embedding_size
    }

    /// Fourier features of normalized `[x, y]` coordinates
    fn pe_features(&self, x: f32, y: f32, out: &mut [f32]) {
        let half = self.embed_dim / 2;
        let (x, y) = (2.0 * x - 1.0, 2.0 * y - 1.0);
        for j in 0..half {
            let v = 2.0 * PI * (x * self.pe_gaussian[j] + y * self.pe_gaussian[half + j]);
            out[j] = v.sin();
            out[half + j] = v.cos();
        }
    }

    /// Dense positional encoding of the embedding grid, token-major
    ///
    /// Laid out as `[h * w, embed_dim]`, i.e. the `[embed_dim, h, w]` encoding
    /// already flattened and permuted the way the transformer consumes it.
    #[must_use]
    pub fn dense_pe_tokens(&self) -> Vec<f32> {
        let side = self.image_embedding_size;
        let mut out = vec![0.0; side * side * self.embed_dim];
        for (token, chunk) in out.chunks_exact_mut(self.embed_dim).enumerate() {
            let (row, col) = (token / side, token % side);
            let y = (row as f32 + 0.5) / side as f32;
            let x = (col as f32 + 0.5) / side as f32;
            self.pe_features(x, y, chunk);
        }
        out
    }

    /// Sparse embedding of `[1, N, 2]` pixel coordinates and `[1, N]` labels
    ///
    /// Label `-1` marks padding and gets the not-a-point embedding; labels
    /// `0..4` add their learned embedding on top of the positional one.
    pub fn embed_points(&self, g: &mut GraphBuilder, coords: &str, labels: &str) -> String {
        let dim = self.embed_dim;
        g.push_scope("prompt_encoder");

        let half_px = g.scalar_f32(0.5);
        let size = g.scalar_f32(self.input_image_size as f32);
        let coords = g.add(coords, &half_px);
        let coords = g.div(&coords, &size);

        // pe_layer._pe_encoding
        let two = g.scalar_f32(2.0);
        let one = g.scalar_f32(1.0);
        let scaled = g.mul(&coords, &two);
        let centered = g.sub(&scaled, &one);
        let gaussian = g.initializer_f32(
            "prompt_encoder.pe_layer.positional_encoding_gaussian_matrix",
            &[2, dim / 2],
            &self.pe_gaussian,
        );
        let projected = g.matmul(&centered, &gaussian);
        let tau = g.scalar_f32(2.0 * PI);
        let projected = g.mul(&projected, &tau);
        let sin = g.unary("Sin", &projected);
        let cos = g.unary("Cos", &projected);
        let mut embedding = g.concat(&[sin.as_str(), cos.as_str()], -1);

        let labels = g.unsqueeze(labels, &[-1]);
        let pad = g.scalar_f32(-1.0);
        let is_pad = g.equal(&labels, &pad);
        let not_pad = g.unary("Not", &is_pad);
        let keep = g.cast(&not_pad, DataType::Float);
        embedding = g.mul(&embedding, &keep);

        let pad_mask = g.cast(&is_pad, DataType::Float);
        let not_a_point = g.initializer_f32(
            "prompt_encoder.not_a_point_embed.weight",
            &[1, dim],
            &self.not_a_point_embed,
        );
        let pad_term = g.mul(&not_a_point, &pad_mask);
        embedding = g.add(&embedding, &pad_term);

        for (i, weight) in self.point_embeddings.iter().enumerate() {
            let label = g.scalar_f32(i as f32);
            let hit = g.equal(&labels, &label);
            let hit = g.cast(&hit, DataType::Float);
            let table = g.initializer_f32(
                &format!("prompt_encoder.point_embeddings.{i}.weight"),
                &[1, dim],
                weight,
            );
            let term = g.mul(&table, &hit);
            embedding = g.add(&embedding, &term);
        }

        g.pop_scope();
        embedding
    }

    /// Dense embedding: downscaled mask when `has_mask` is 1, else the no-mask embedding
    pub fn embed_masks(&self, g: &mut GraphBuilder, mask_input: &str, has_mask: &str) -> String {
        g.push_scope("prompt_encoder");
        let downscaled = self.mask_downscaling.emit(g, mask_input);
        let with_mask = g.mul(has_mask, &downscaled);

        let one = g.scalar_f32(1.0);
        let without = g.sub(&one, has_mask);
        let no_mask = g.initializer_f32(
            "prompt_encoder.no_mask_embed.weight",
            &[1, self.embed_dim, 1, 1],
            &self.no_mask_embed,
        );
        let no_mask_term = g.mul(&without, &no_mask);
        let dense = g.add(&with_mask, &no_mask_term);
        g.pop_scope();
        dense
    }
}
