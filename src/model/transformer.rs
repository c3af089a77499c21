//! Two-way transformer between prompt tokens and image embedding tokens

use super::layers::{LayerNorm, Linear};
use crate::checkpoint::TensorSource;
use crate::error::Result;
use crate::onnx::GraphBuilder;

/// Multi-head attention with an optional downprojected internal width
#[derive(Debug, Clone)]
pub struct Attention {
    pub num_heads: usize,
    pub internal_dim: usize,
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
}

impl Attention {
    pub fn load(
        src: &dyn TensorSource,
        name: &str,
        embed_dim: usize,
        num_heads: usize,
        downsample_rate: usize,
    ) -> Result<Self> {
        let internal_dim = embed_dim / downsample_rate;
        Ok(Self {
            num_heads,
            internal_dim,
            q_proj: Linear::load(src, &format!("{name}.q_proj"), embed_dim, internal_dim)?,
            k_proj: Linear::load(src, &format!("{name}.k_proj"), embed_dim, internal_dim)?,
            v_proj: Linear::load(src, &format!("{name}.v_proj"), embed_dim, internal_dim)?,
            out_proj: Linear::load(src, &format!("{name}.out_proj"), internal_dim, embed_dim)?,
        })
    }

    pub fn emit(&self, g: &mut GraphBuilder, q: &str, k: &str, v: &str) -> String {
        let heads = self.num_heads as i64;
        let head_dim = (self.internal_dim / self.num_heads) as i64;

        let q = self.q_proj.emit(g, q);
        let k = self.k_proj.emit(g, k);
        let v = self.v_proj.emit(g, v);

        // [1, n, c] -> [1, heads, n, c / heads]; keys go straight to [1, heads, c / heads, n]
        let q = g.reshape(&q, &[1, -1, heads, head_dim]);
        let q = g.transpose(&q, &[0, 2, 1, 3]);
        let k = g.reshape(&k, &[1, -1, heads, head_dim]);
        let k = g.transpose(&k, &[0, 2, 3, 1]);
        let v = g.reshape(&v, &[1, -1, heads, head_dim]);
        let v = g.transpose(&v, &[0, 2, 1, 3]);

        let scores = g.matmul(&q, &k);
        let scale = g.scalar_f32((head_dim as f32).sqrt());
        let scores = g.div(&scores, &scale);
        let attn = g.softmax(&scores, -1);

        let out = g.matmul(&attn, &v);
        let out = g.transpose(&out, &[0, 2, 1, 3]);
        let out = g.reshape(&out, &[1, -1, self.internal_dim as i64]);
        self.out_proj.emit(g, &out)
    }
}

/// `lin1 -> ReLU -> lin2`
#[derive(Debug, Clone)]
struct MlpBlock {
    lin1: Linear,
    lin2: Linear,
}

impl MlpBlock {
    fn load(src: &dyn TensorSource, name: &str, dim: usize, mlp_dim: usize) -> Result<Self> {
        Ok(Self {
            lin1: Linear::load(src, &format!("{name}.lin1"), dim, mlp_dim)?,
            lin2: Linear::load(src, &format!("{name}.lin2"), mlp_dim, dim)?,
        })
    }

    fn emit(&self, g: &mut GraphBuilder, x: &str) -> String {
        let h = self.lin1.emit(g, x);
        let h = g.unary("Relu", &h);
        self.lin2.emit(g, &h)
    }
}

/// Self attention on tokens, then cross attention in both directions
#[derive(Debug, Clone)]
pub struct TwoWayAttentionBlock {
    skip_first_layer_pe: bool,
    self_attn: Attention,
    norm1: LayerNorm,
    cross_attn_token_to_image: Attention,
    norm2: LayerNorm,
    mlp: MlpBlock,
    norm3: LayerNorm,
    norm4: LayerNorm,
    cross_attn_image_to_token: Attention,
}

impl TwoWayAttentionBlock {
    fn load(
        src: &dyn TensorSource,
        name: &str,
        cfg: &TransformerConfig,
        skip_first_layer_pe: bool,
    ) -> Result<Self> {
        let d = cfg.embedding_dim;
        let h = cfg.num_heads;
        let r = cfg.attention_downsample_rate;
        Ok(Self {
            skip_first_layer_pe,
            self_attn: Attention::load(src, &format!("{name}.self_attn"), d, h, 1)?,
            norm1: LayerNorm::load(src, &format!("{name}.norm1"), d)?,
            cross_attn_token_to_image: Attention::load(
                src,
                &format!("{name}.cross_attn_token_to_image"),
                d,
                h,
                r,
            )?,
            norm2: LayerNorm::load(src, &format!("{name}.norm2"), d)?,
            mlp: MlpBlock::load(src, &format!("{name}.mlp"), d, cfg.mlp_dim)?,
            norm3: LayerNorm::load(src, &format!("{name}.norm3"), d)?,
            norm4: LayerNorm::load(src, &format!("{name}.norm4"), d)?,
            cross_attn_image_to_token: Attention::load(
                src,
                &format!("{name}.cross_attn_image_to_token"),
                d,
                h,
                r,
            )?,
        })
    }

    /// Returns updated `(queries, keys)`
    fn emit(
        &self,
        g: &mut GraphBuilder,
        queries: &str,
        keys: &str,
        query_pe: &str,
        key_pe: &str,
    ) -> (String, String) {
        let queries = if self.skip_first_layer_pe {
            self.self_attn.emit(g, queries, queries, queries)
        } else {
            let q = g.add(queries, query_pe);
            let attn_out = self.self_attn.emit(g, &q, &q, queries);
            g.add(queries, &attn_out)
        };
        let queries = self.norm1.emit(g, &queries);

        let q = g.add(&queries, query_pe);
        let k = g.add(keys, key_pe);
        let attn_out = self.cross_attn_token_to_image.emit(g, &q, &k, keys);
        let queries = g.add(&queries, &attn_out);
        let queries = self.norm2.emit(g, &queries);

        let mlp_out = self.mlp.emit(g, &queries);
        let queries = g.add(&queries, &mlp_out);
        let queries = self.norm3.emit(g, &queries);

        let q = g.add(&queries, query_pe);
        let k = g.add(keys, key_pe);
        let attn_out = self.cross_attn_image_to_token.emit(g, &k, &q, &queries);
        let keys = g.add(keys, &attn_out);
        let keys = self.norm4.emit(g, &keys);

        (queries, keys)
    }
}

/// Hyperparameters shared by every SAM variant's mask decoder transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformerConfig {
    pub depth: usize,
    pub embedding_dim: usize,
    pub num_heads: usize,
    pub mlp_dim: usize,
    pub attention_downsample_rate: usize,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            depth: 2,
            embedding_dim: 256,
            num_heads: 8,
            mlp_dim: 2048,
            attention_downsample_rate: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TwoWayTransformer {
    pub config: TransformerConfig,
    layers: Vec<TwoWayAttentionBlock>,
    final_attn_token_to_image: Attention,
    norm_final_attn: LayerNorm,
}

impl TwoWayTransformer {
    pub fn load(src: &dyn TensorSource, name: &str, config: TransformerConfig) -> Result<Self> {
        let layers = (0..config.depth)
            .map(|i| TwoWayAttentionBlock::load(src, &format!("{name}.layers.{i}"), &config, i == 0))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            layers,
            final_attn_token_to_image: Attention::load(
                src,
                &format!("{name}.final_attn_token_to_image"),
                config.embedding_dim,
                config.num_heads,
                config.attention_downsample_rate,
            )?,
            norm_final_attn: LayerNorm::load(src, &format!("{name}.norm_final_attn"), config.embedding_dim)?,
        })
    }

    /// `image` and `image_pe` are token-major `[1, h * w, c]`; returns `(hs, keys)`
    pub fn emit(
        &self,
        g: &mut GraphBuilder,
        image: &str,
        image_pe: &str,
        point_embedding: &str,
    ) -> (String, String) {
        g.push_scope("transformer");
        let mut queries = point_embedding.to_string();
        let mut keys = image.to_string();
        for layer in &self.layers {
            (queries, keys) = layer.emit(g, &queries, &keys, point_embedding, image_pe);
        }

        let q = g.add(&queries, point_embedding);
        let k = g.add(&keys, image_pe);
        let attn_out = self.final_attn_token_to_image.emit(g, &q, &k, &keys);
        let queries = g.add(&queries, &attn_out);
        let queries = self.norm_final_attn.emit(g, &queries);
        g.pop_scope();
        (queries, keys)
    }
}
