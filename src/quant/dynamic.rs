//! Dynamic weight quantization of an ONNX graph
//!
//! Weights feeding `MatMul` and `Conv` are stored as 8-bit integers.
//! Activations are quantized at run time with `DynamicQuantizeLinear`, the
//! integer op runs, and the result is rescaled back to float under the
//! original output name so downstream nodes are untouched.

use std::collections::HashMap;

use super::params::{quantize_weights, QuantParams, QuantizedData, WeightType};
use crate::error::{ExportError, Result};
use crate::onnx::builder::attr_int;
use crate::onnx::proto::{DataType, ModelProto, NodeProto, TensorProto};
use crate::onnx::tensor::{f32_tensor, f32_values, i8_tensor, u8_tensor};
use crate::onnx::optimize;

/// Options for [`DynamicQuantizer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicQuantConfig {
    pub weight_type: WeightType,
    /// Use 7-bit weight range
    pub reduce_range: bool,
    /// Run graph clean-up before quantizing
    pub optimize_model: bool,
}

impl Default for DynamicQuantConfig {
    fn default() -> Self {
        Self {
            weight_type: WeightType::QUInt8,
            reduce_range: false,
            optimize_model: true,
        }
    }
}

/// What a quantization pass rewrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuantReport {
    pub matmuls_quantized: usize,
    pub convs_quantized: usize,
    pub weights_quantized: usize,
    pub activations_quantized: usize,
    pub initializers_removed: usize,
}

/// Names of a quantized weight's initializers
#[derive(Debug, Clone)]
struct QuantizedWeight {
    data: String,
    scale: String,
    zero_point: String,
}

/// Outputs of a `DynamicQuantizeLinear` node
#[derive(Debug, Clone)]
struct QuantizedActivation {
    data: String,
    scale: String,
    zero_point: String,
}

/// Rewrites a model in place
#[derive(Debug, Clone, Default)]
pub struct DynamicQuantizer {
    config: DynamicQuantConfig,
}

impl DynamicQuantizer {
    #[must_use]
    pub fn new(config: DynamicQuantConfig) -> Self {
        Self { config }
    }

    /// Quantize every eligible `MatMul` and `Conv`
    pub fn quantize(&self, model: &mut ModelProto) -> Result<QuantReport> {
        let mut report = QuantReport::default();
        if self.config.optimize_model {
            let cleanup = optimize::optimize(model);
            tracing::debug!(?cleanup, "optimized model before quantization");
        }

        let graph = model
            .graph
            .as_mut()
            .ok_or_else(|| ExportError::graph("model has no graph"))?;

        let float_weights: HashMap<String, usize> = graph
            .initializer
            .iter()
            .enumerate()
            .filter(|(_, t)| t.data_type == DataType::Float as i32)
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        let mut weights: HashMap<String, QuantizedWeight> = HashMap::new();
        let mut activations: HashMap<String, QuantizedActivation> = HashMap::new();
        let mut new_initializers: Vec<TensorProto> = Vec::new();
        let mut nodes = Vec::with_capacity(graph.node.len());

        for node in std::mem::take(&mut graph.node) {
            let kind = match node.op_type.as_str() {
                "MatMul" => IntegerOp::MatMul,
                "Conv" => IntegerOp::Conv,
                _ => {
                    nodes.push(node);
                    continue;
                }
            };
            if node.output.is_empty() {
                return Err(ExportError::graph(format!(
                    "{} node '{}' has no output",
                    node.op_type, node.name
                )));
            }
            let weight_name = match node.input.get(1) {
                Some(name) if float_weights.contains_key(name) => name.clone(),
                _ => {
                    nodes.push(node);
                    continue;
                }
            };
            let activation_name = node.input[0].clone();
            if float_weights.contains_key(&activation_name) {
                // Constant-only product, nothing to do at run time
                nodes.push(node);
                continue;
            }

            if !weights.contains_key(&weight_name) {
                let tensor = &graph.initializer[float_weights[&weight_name]];
                let (quantized, tensors) = self.quantize_initializer(tensor)?;
                new_initializers.extend(tensors);
                weights.insert(weight_name.clone(), quantized);
                report.weights_quantized += 1;
            }
            let weight = &weights[&weight_name];

            if !activations.contains_key(&activation_name) {
                let (quantize_node, activation) = dynamic_quantize_node(&activation_name);
                nodes.push(quantize_node);
                activations.insert(activation_name.clone(), activation);
                report.activations_quantized += 1;
            }
            let activation = &activations[&activation_name];

            match kind {
                IntegerOp::MatMul => report.matmuls_quantized += 1,
                IntegerOp::Conv => report.convs_quantized += 1,
            }
            let bias = match kind {
                IntegerOp::Conv => match node.input.get(2).filter(|b| !b.is_empty()) {
                    Some(bias) => Some(self.reshaped_bias(
                        &graph.initializer,
                        &float_weights,
                        bias,
                        &mut new_initializers,
                    )?),
                    None => None,
                },
                IntegerOp::MatMul => None,
            };
            nodes.extend(integer_nodes(&node, kind, activation, weight, bias.as_deref()));
        }

        graph.node = nodes;
        graph.initializer.extend(new_initializers);
        report.initializers_removed = optimize::prune_initializers(model);

        tracing::debug!(
            matmuls = report.matmuls_quantized,
            convs = report.convs_quantized,
            weights = report.weights_quantized,
            weight_type = %self.config.weight_type,
            "quantized model"
        );
        Ok(report)
    }

    fn quantize_initializer(&self, tensor: &TensorProto) -> Result<(QuantizedWeight, Vec<TensorProto>)> {
        let values = f32_values(tensor)?;
        let dims: Vec<usize> = tensor.dims.iter().map(|&d| d as usize).collect();
        let (data, params) =
            quantize_weights(&values, self.config.weight_type, self.config.reduce_range);

        let names = QuantizedWeight {
            data: format!("{}_quantized", tensor.name),
            scale: format!("{}_scale", tensor.name),
            zero_point: format!("{}_zero_point", tensor.name),
        };
        let tensors = vec![
            quantized_tensor(&names.data, &dims, &data),
            f32_tensor(names.scale.as_str(), &[], &[params.scale]),
            zero_point_tensor(&names.zero_point, self.config.weight_type, params),
        ];
        Ok((names, tensors))
    }

    /// Bias laid out as `[1, C, 1, 1]` so it broadcasts over the conv output
    fn reshaped_bias(
        &self,
        initializers: &[TensorProto],
        float_weights: &HashMap<String, usize>,
        bias: &str,
        new_initializers: &mut Vec<TensorProto>,
    ) -> Result<String> {
        let name = format!("{bias}_reshaped");
        if new_initializers.iter().any(|t| t.name == name) {
            return Ok(name);
        }
        let index = float_weights
            .get(bias)
            .ok_or_else(|| ExportError::graph(format!("conv bias '{bias}' is not an initializer")))?;
        let values = f32_values(&initializers[*index])?;
        new_initializers.push(f32_tensor(name.as_str(), &[1, values.len(), 1, 1], &values));
        Ok(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntegerOp {
    MatMul,
    Conv,
}

fn quantized_tensor(name: &str, dims: &[usize], data: &QuantizedData) -> TensorProto {
    match data {
        QuantizedData::U8(v) => u8_tensor(name, dims, v),
        QuantizedData::I8(v) => i8_tensor(name, dims, v),
    }
}

fn zero_point_tensor(name: &str, weight_type: WeightType, params: QuantParams) -> TensorProto {
    match weight_type {
        WeightType::QUInt8 => u8_tensor(name, &[], &[params.zero_point as u8]),
        WeightType::QInt8 => i8_tensor(name, &[], &[params.zero_point as i8]),
    }
}

fn dynamic_quantize_node(activation: &str) -> (NodeProto, QuantizedActivation) {
    let outputs = QuantizedActivation {
        data: format!("{activation}_quantized"),
        scale: format!("{activation}_scale"),
        zero_point: format!("{activation}_zero_point"),
    };
    let node = NodeProto {
        input: vec![activation.to_string()],
        output: vec![
            outputs.data.clone(),
            outputs.scale.clone(),
            outputs.zero_point.clone(),
        ],
        name: format!("{activation}_QuantizeLinear"),
        op_type: "DynamicQuantizeLinear".to_string(),
        ..Default::default()
    };
    (node, outputs)
}

/// Integer op, cast, rescale (and bias add for convolutions)
fn integer_nodes(
    original: &NodeProto,
    kind: IntegerOp,
    activation: &QuantizedActivation,
    weight: &QuantizedWeight,
    bias: Option<&str>,
) -> Vec<NodeProto> {
    let base = if original.name.is_empty() {
        original.output[0].clone()
    } else {
        original.name.clone()
    };
    let output = original.output[0].clone();
    let integer_out = format!("{output}_output_quantized");
    let cast_out = format!("{integer_out}_cast_output");
    let scales = format!("{base}_scales_mul:0");

    let (op_type, attribute) = match kind {
        IntegerOp::MatMul => ("MatMulInteger", Vec::new()),
        IntegerOp::Conv => ("ConvInteger", original.attribute.clone()),
    };

    let mut nodes = vec![
        NodeProto {
            input: vec![
                activation.data.clone(),
                weight.data.clone(),
                activation.zero_point.clone(),
                weight.zero_point.clone(),
            ],
            output: vec![integer_out.clone()],
            name: format!("{base}_quant"),
            op_type: op_type.to_string(),
            attribute,
            ..Default::default()
        },
        NodeProto {
            input: vec![integer_out],
            output: vec![cast_out.clone()],
            name: format!("{base}_output_quantized_cast"),
            op_type: "Cast".to_string(),
            attribute: vec![attr_int("to", DataType::Float as i64)],
            ..Default::default()
        },
        NodeProto {
            input: vec![activation.scale.clone(), weight.scale.clone()],
            output: vec![scales.clone()],
            name: format!("{base}_scales_mul"),
            op_type: "Mul".to_string(),
            ..Default::default()
        },
    ];

    let scaled = match bias {
        Some(_) => format!("{output}_scaled"),
        None => output.clone(),
    };
    nodes.push(NodeProto {
        input: vec![cast_out, scales],
        output: vec![scaled.clone()],
        name: format!("{base}_output_quantized_mul"),
        op_type: "Mul".to_string(),
        ..Default::default()
    });

    if let Some(bias) = bias {
        nodes.push(NodeProto {
            input: vec![scaled, bias.to_string()],
            output: vec![output],
            name: format!("{base}_bias_add"),
            op_type: "Add".to_string(),
            ..Default::default()
        });
    }
    nodes
}
