//! Building blocks shared by the prompt encoder and mask decoder
//!
//! Each layer is loaded from a [`TensorSource`] under its checkpoint prefix and
//! knows how to emit itself into a [`GraphBuilder`]. Initializers keep the
//! checkpoint names so exported graphs can be traced back to the weights.

use crate::checkpoint::TensorSource;
use crate::error::Result;
use crate::onnx::builder::{attr_int, attr_ints};
use crate::onnx::GraphBuilder;

/// Exact (erf-based) GELU
pub fn gelu(g: &mut GraphBuilder, x: &str) -> String {
    let sqrt2 = g.scalar_f32(std::f32::consts::SQRT_2);
    let one = g.scalar_f32(1.0);
    let half = g.scalar_f32(0.5);
    let scaled = g.div(x, &sqrt2);
    let erf = g.unary("Erf", &scaled);
    let shifted = g.add(&erf, &one);
    let gated = g.mul(x, &shifted);
    g.mul(&gated, &half)
}

/// Fully connected layer, exported as `MatMul` + `Add`
#[derive(Debug, Clone)]
pub struct Linear {
    pub name: String,
    pub in_features: usize,
    pub out_features: usize,
    /// Weight transposed to `[in, out]`
    pub weight_t: Vec<f32>,
    pub bias: Vec<f32>,
}

impl Linear {
    pub fn load(
        src: &dyn TensorSource,
        name: &str,
        in_features: usize,
        out_features: usize,
    ) -> Result<Self> {
        let weight = src.require(&format!("{name}.weight"), &[out_features, in_features])?;
        let bias = src.require(&format!("{name}.bias"), &[out_features])?;

        let mut weight_t = vec![0.0; weight.len()];
        for o in 0..out_features {
            for i in 0..in_features {
                weight_t[i * out_features + o] = weight[o * in_features + i];
            }
        }

        Ok(Self {
            name: name.to_string(),
            in_features,
            out_features,
            weight_t,
            bias,
        })
    }

    pub fn emit(&self, g: &mut GraphBuilder, x: &str) -> String {
        let w = g.initializer_f32(
            &format!("{}.weight", self.name),
            &[self.in_features, self.out_features],
            &self.weight_t,
        );
        let b = g.initializer_f32(&format!("{}.bias", self.name), &[self.out_features], &self.bias);
        let y = g.matmul(x, &w);
        g.add(&y, &b)
    }
}

/// Stack of linear layers with ReLU between them
#[derive(Debug, Clone)]
pub struct Mlp {
    pub layers: Vec<Linear>,
}

impl Mlp {
    /// Load `{name}.layers.{i}` for `num_layers` layers
    pub fn load(
        src: &dyn TensorSource,
        name: &str,
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        num_layers: usize,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let fan_in = if i == 0 { input_dim } else { hidden_dim };
            let fan_out = if i + 1 == num_layers {
                output_dim
            } else {
                hidden_dim
            };
            layers.push(Linear::load(
                src,
                &format!("{name}.layers.{i}"),
                fan_in,
                fan_out,
            )?);
        }
        Ok(Self { layers })
    }

    pub fn emit(&self, g: &mut GraphBuilder, x: &str) -> String {
        let mut x = x.to_string();
        let last = self.layers.len().saturating_sub(1);
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.emit(g, &x);
            if i < last {
                x = g.unary("Relu", &x);
            }
        }
        x
    }
}

/// Normalization over the channel axis of an NCHW tensor
fn emit_normalize(g: &mut GraphBuilder, x: &str, axis: i64, eps: f32) -> String {
    let mean = g.reduce("ReduceMean", x, &[axis], true);
    let centered = g.sub(x, &mean);
    let squared = g.mul(&centered, &centered);
    let var = g.reduce("ReduceMean", &squared, &[axis], true);
    let eps = g.scalar_f32(eps);
    let var = g.add(&var, &eps);
    let std = g.unary("Sqrt", &var);
    g.div(&centered, &std)
}

/// `nn.LayerNorm` over the last axis
#[derive(Debug, Clone)]
pub struct LayerNorm {
    pub name: String,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub eps: f32,
}

impl LayerNorm {
    pub fn load(src: &dyn TensorSource, name: &str, dim: usize) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            weight: src.require(&format!("{name}.weight"), &[dim])?,
            bias: src.require(&format!("{name}.bias"), &[dim])?,
            eps: 1e-5,
        })
    }

    pub fn emit(&self, g: &mut GraphBuilder, x: &str) -> String {
        let dim = self.weight.len();
        let normed = emit_normalize(g, x, -1, self.eps);
        let w = g.initializer_f32(&format!("{}.weight", self.name), &[dim], &self.weight);
        let b = g.initializer_f32(&format!("{}.bias", self.name), &[dim], &self.bias);
        let scaled = g.mul(&normed, &w);
        g.add(&scaled, &b)
    }
}

/// Channel-wise layer norm for NCHW feature maps
#[derive(Debug, Clone)]
pub struct LayerNorm2d {
    pub name: String,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub eps: f32,
}

impl LayerNorm2d {
    pub fn load(src: &dyn TensorSource, name: &str, channels: usize) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            weight: src.require(&format!("{name}.weight"), &[channels])?,
            bias: src.require(&format!("{name}.bias"), &[channels])?,
            eps: 1e-6,
        })
    }

    pub fn emit(&self, g: &mut GraphBuilder, x: &str) -> String {
        let channels = self.weight.len();
        let normed = emit_normalize(g, x, 1, self.eps);
        // weight[:, None, None]
        let w = g.initializer_f32(&format!("{}.weight", self.name), &[channels, 1, 1], &self.weight);
        let b = g.initializer_f32(&format!("{}.bias", self.name), &[channels, 1, 1], &self.bias);
        let scaled = g.mul(&normed, &w);
        g.add(&scaled, &b)
    }
}

/// Square-kernel 2D convolution without padding
#[derive(Debug, Clone)]
pub struct Conv2d {
    pub name: String,
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

impl Conv2d {
    pub fn load(
        src: &dyn TensorSource,
        name: &str,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            in_channels,
            out_channels,
            kernel,
            stride,
            weight: src.require(
                &format!("{name}.weight"),
                &[out_channels, in_channels, kernel, kernel],
            )?,
            bias: src.require(&format!("{name}.bias"), &[out_channels])?,
        })
    }

    pub fn emit(&self, g: &mut GraphBuilder, x: &str) -> String {
        let w = g.initializer_f32(
            &format!("{}.weight", self.name),
            &[self.out_channels, self.in_channels, self.kernel, self.kernel],
            &self.weight,
        );
        let b = g.initializer_f32(&format!("{}.bias", self.name), &[self.out_channels], &self.bias);
        g.node("Conv", &[x, w.as_str(), b.as_str()], conv_attributes(self.kernel, self.stride))
    }
}

/// Square-kernel transposed convolution without padding
#[derive(Debug, Clone)]
pub struct ConvTranspose2d {
    pub name: String,
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

impl ConvTranspose2d {
    pub fn load(
        src: &dyn TensorSource,
        name: &str,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            in_channels,
            out_channels,
            kernel,
            stride,
            // torch layout: [in, out, kH, kW]
            weight: src.require(
                &format!("{name}.weight"),
                &[in_channels, out_channels, kernel, kernel],
            )?,
            bias: src.require(&format!("{name}.bias"), &[out_channels])?,
        })
    }

    pub fn emit(&self, g: &mut GraphBuilder, x: &str) -> String {
        let w = g.initializer_f32(
            &format!("{}.weight", self.name),
            &[self.in_channels, self.out_channels, self.kernel, self.kernel],
            &self.weight,
        );
        let b = g.initializer_f32(&format!("{}.bias", self.name), &[self.out_channels], &self.bias);
        g.node(
            "ConvTranspose",
            &[x, w.as_str(), b.as_str()],
            conv_attributes(self.kernel, self.stride),
        )
    }
}

fn conv_attributes(kernel: usize, stride: usize) -> Vec<crate::onnx::proto::AttributeProto> {
    let (k, s) = (kernel as i64, stride as i64);
    vec![
        attr_ints("dilations", &[1, 1]),
        attr_int("group", 1),
        attr_ints("kernel_shape", &[k, k]),
        attr_ints("pads", &[0, 0, 0, 0]),
        attr_ints("strides", &[s, s]),
    ]
}
