//! Mask decoder: transformer over prompt and image tokens, then mask and IoU heads

use super::layers::{gelu, ConvTranspose2d, LayerNorm2d, Mlp};
use super::transformer::{TransformerConfig, TwoWayTransformer};
use crate::checkpoint::TensorSource;
use crate::error::Result;
use crate::onnx::GraphBuilder;

/// Masks predicted besides the single-mask output
pub const NUM_MULTIMASK_OUTPUTS: usize = 3;

const IOU_HEAD_DEPTH: usize = 3;
const IOU_HEAD_HIDDEN_DIM: usize = 256;

#[derive(Debug, Clone)]
pub struct MaskDecoder {
    pub transformer_dim: usize,
    pub num_mask_tokens: usize,
    pub iou_token: Vec<f32>,
    pub mask_tokens: Vec<f32>,
    pub transformer: TwoWayTransformer,
    upscale_conv1: ConvTranspose2d,
    upscale_norm: LayerNorm2d,
    upscale_conv2: ConvTranspose2d,
    output_hypernetworks_mlps: Vec<Mlp>,
    iou_prediction_head: Mlp,
}

impl MaskDecoder {
    pub fn load(src: &dyn TensorSource, transformer_dim: usize) -> Result<Self> {
        let p = "mask_decoder";
        let num_mask_tokens = NUM_MULTIMASK_OUTPUTS + 1;
        let d = transformer_dim;
        let transformer = TwoWayTransformer::load(
            src,
            &format!("{p}.transformer"),
            TransformerConfig {
                embedding_dim: d,
                ..TransformerConfig::default()
            },
        )?;

        let output_hypernetworks_mlps = (0..num_mask_tokens)
            .map(|i| {
                Mlp::load(
                    src,
                    &format!("{p}.output_hypernetworks_mlps.{i}"),
                    d,
                    d,
                    d / 8,
                    3,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            transformer_dim,
            num_mask_tokens,
            iou_token: src.require(&format!("{p}.iou_token.weight"), &[1, d])?,
            mask_tokens: src.require(&format!("{p}.mask_tokens.weight"), &[num_mask_tokens, d])?,
            transformer,
            upscale_conv1: ConvTranspose2d::load(src, &format!("{p}.output_upscaling.0"), d, d / 4, 2, 2)?,
            upscale_norm: LayerNorm2d::load(src, &format!("{p}.output_upscaling.1"), d / 4)?,
            upscale_conv2: ConvTranspose2d::load(src, &format!("{p}.output_upscaling.3"), d / 4, d / 8, 2, 2)?,
            output_hypernetworks_mlps,
            iou_prediction_head: Mlp::load(
                src,
                &format!("{p}.iou_prediction_head"),
                d,
                IOU_HEAD_HIDDEN_DIM,
                num_mask_tokens,
                IOU_HEAD_DEPTH,
            )?,
        })
    }

    /// IoU token followed by the mask tokens, `[1, 1 + num_mask_tokens, dim]`
    #[must_use]
    pub fn output_tokens(&self) -> Vec<f32> {
        let mut tokens = Vec::with_capacity(self.iou_token.len() + self.mask_tokens.len());
        tokens.extend_from_slice(&self.iou_token);
        tokens.extend_from_slice(&self.mask_tokens);
        tokens
    }

    /// Emit mask prediction for a single image
    ///
    /// `image_pe` is the token-major dense positional encoding, `grid` the side
    /// of the square embedding grid. Returns `(masks, iou_pred)` with shapes
    /// `[1, num_mask_tokens, 4 * grid, 4 * grid]` and `[1, num_mask_tokens]`.
    pub fn emit(
        &self,
        g: &mut GraphBuilder,
        image_embeddings: &str,
        image_pe: &str,
        grid: usize,
        sparse: &str,
        dense: &str,
    ) -> (String, String) {
        let d = self.transformer_dim;
        let grid_i = grid as i64;
        g.push_scope("mask_decoder");

        let output_tokens = g.const_f32(
            "output_tokens",
            &[1, 1 + self.num_mask_tokens, d],
            &self.output_tokens(),
        );
        let tokens = g.concat(&[output_tokens.as_str(), sparse], 1);

        let src = g.add(image_embeddings, dense);
        let src = g.reshape(&src, &[1, d as i64, grid_i * grid_i]);
        let src = g.transpose(&src, &[0, 2, 1]);

        let (hs, src) = self.transformer.emit(g, &src, image_pe, &tokens);

        let first = g.scalar_i64(0);
        let iou_token_out = g.gather(&hs, &first, 1);
        let starts = g.const_i64("Slice_starts", &[1], &[1]);
        let ends = g.const_i64("Slice_ends", &[1], &[1 + self.num_mask_tokens as i64]);
        let axes = g.const_i64("Slice_axes", &[1], &[1]);
        let mask_tokens_out = g.slice(&hs, &starts, &ends, &axes);

        let src = g.transpose(&src, &[0, 2, 1]);
        let src = g.reshape(&src, &[1, d as i64, grid_i, grid_i]);

        let x = self.upscale_conv1.emit(g, &src);
        let x = self.upscale_norm.emit(g, &x);
        let x = gelu(g, &x);
        let x = self.upscale_conv2.emit(g, &x);
        let upscaled = gelu(g, &x);

        let mut hyper_in = Vec::with_capacity(self.num_mask_tokens);
        for (i, mlp) in self.output_hypernetworks_mlps.iter().enumerate() {
            let index = g.scalar_i64(i as i64);
            let token = g.gather(&mask_tokens_out, &index, 1);
            let out = mlp.emit(g, &token);
            hyper_in.push(g.unsqueeze(&out, &[1]));
        }
        let hyper_refs: Vec<&str> = hyper_in.iter().map(String::as_str).collect();
        let hyper_in = g.concat(&hyper_refs, 1);

        let side = 4 * grid_i;
        let flat = g.reshape(&upscaled, &[1, (d / 8) as i64, side * side]);
        let masks = g.matmul(&hyper_in, &flat);
        let masks = g.reshape(&masks, &[1, -1, side, side]);

        let iou_pred = self.iou_prediction_head.emit(g, &iou_token_out);

        g.pop_scope();
        (masks, iou_pred)
    }
}
