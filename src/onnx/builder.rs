//! Graph builder
//!
//! Appends nodes in topological order and hands out unique value names. Node
//! and value names follow the `/scope/Op_n` convention used by tracing
//! exporters so the resulting graphs read the same in viewers.

use std::collections::HashMap;

use super::proto::{
    AttributeProto, AttributeType, DataType, GraphProto, ModelProto, NodeProto,
    OperatorSetIdProto, StringStringEntryProto, TensorProto, ValueInfoProto,
};
use super::tensor::{f32_tensor, i64_tensor, value_info, Dim};
use super::{ir_version_for_opset, PRODUCER_NAME};

/// Integer attribute
#[must_use]
pub fn attr_int(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        i: value,
        r#type: AttributeType::Int as i32,
        ..Default::default()
    }
}

/// Integer list attribute
#[must_use]
pub fn attr_ints(name: &str, values: &[i64]) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        ints: values.to_vec(),
        r#type: AttributeType::Ints as i32,
        ..Default::default()
    }
}

/// Float attribute
#[must_use]
pub fn attr_float(name: &str, value: f32) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        f: value,
        r#type: AttributeType::Float as i32,
        ..Default::default()
    }
}

/// String attribute
#[must_use]
pub fn attr_string(name: &str, value: &str) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        s: value.as_bytes().to_vec(),
        r#type: AttributeType::String as i32,
        ..Default::default()
    }
}

/// Incremental ONNX graph construction
pub struct GraphBuilder {
    name: String,
    opset: i64,
    scope: Vec<String>,
    nodes: Vec<NodeProto>,
    initializers: Vec<TensorProto>,
    inputs: Vec<ValueInfoProto>,
    outputs: Vec<ValueInfoProto>,
    counters: HashMap<String, usize>,
    f32_scalars: HashMap<u32, String>,
    i64_scalars: HashMap<i64, String>,
}

impl GraphBuilder {
    /// Create an empty graph targeting `opset`
    #[must_use]
    pub fn new(name: impl Into<String>, opset: i64) -> Self {
        Self {
            name: name.into(),
            opset,
            scope: Vec::new(),
            nodes: Vec::new(),
            initializers: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            counters: HashMap::new(),
            f32_scalars: HashMap::new(),
            i64_scalars: HashMap::new(),
        }
    }

    /// Number of nodes appended so far
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Enter a naming scope (e.g. a module path)
    pub fn push_scope(&mut self, name: &str) {
        self.scope.push(name.to_string());
    }

    /// Leave the innermost naming scope
    pub fn pop_scope(&mut self) {
        self.scope.pop();
    }

    fn scoped(&self, leaf: &str) -> String {
        let mut path = String::new();
        for part in &self.scope {
            path.push('/');
            path.push_str(part);
        }
        path.push('/');
        path.push_str(leaf);
        path
    }

    fn unique(&mut self, base: String) -> String {
        let count = self.counters.entry(base.clone()).or_insert(0);
        let name = if *count == 0 {
            base
        } else {
            format!("{base}_{count}")
        };
        *count += 1;
        name
    }

    /// Declare a graph input
    pub fn input(&mut self, name: &str, elem_type: DataType, dims: &[Dim]) -> String {
        self.inputs.push(value_info(name, elem_type, dims));
        name.to_string()
    }

    /// Declare a graph output; `name` must already be produced by a node
    pub fn output(&mut self, name: &str, elem_type: DataType, dims: &[Dim]) {
        self.outputs.push(value_info(name, elem_type, dims));
    }

    /// Add a float initializer under an exact name
    pub fn initializer_f32(&mut self, name: &str, dims: &[usize], data: &[f32]) -> String {
        self.initializers.push(f32_tensor(name, dims, data));
        name.to_string()
    }

    /// Add a float constant under a generated name
    pub fn const_f32(&mut self, hint: &str, dims: &[usize], data: &[f32]) -> String {
        let name = self.unique(format!("onnx::{hint}"));
        self.initializer_f32(&name, dims, data)
    }

    /// Add an int64 constant under a generated name
    pub fn const_i64(&mut self, hint: &str, dims: &[usize], data: &[i64]) -> String {
        let name = self.unique(format!("onnx::{hint}"));
        self.initializers.push(i64_tensor(name.as_str(), dims, data));
        name
    }

    /// Rank-0 float constant, shared between uses of the same value
    pub fn scalar_f32(&mut self, value: f32) -> String {
        if let Some(name) = self.f32_scalars.get(&value.to_bits()) {
            return name.clone();
        }
        let name = self.const_f32("Constant_f32", &[], &[value]);
        self.f32_scalars.insert(value.to_bits(), name.clone());
        name
    }

    /// Rank-0 int64 constant, shared between uses of the same value
    pub fn scalar_i64(&mut self, value: i64) -> String {
        if let Some(name) = self.i64_scalars.get(&value) {
            return name.clone();
        }
        let name = self.const_i64("Constant_i64", &[], &[value]);
        self.i64_scalars.insert(value, name.clone());
        name
    }

    /// Append a single-output node and return its output name
    pub fn node(&mut self, op_type: &str, inputs: &[&str], attributes: Vec<AttributeProto>) -> String {
        let node_name = self.unique(self.scoped(op_type));
        let output = format!("{node_name}_output_0");
        self.nodes.push(NodeProto {
            input: inputs.iter().map(|s| (*s).to_string()).collect(),
            output: vec![output.clone()],
            name: node_name,
            op_type: op_type.to_string(),
            attribute: attributes,
            ..Default::default()
        });
        output
    }

    /// Rename a produced value everywhere it appears
    pub fn rename(&mut self, from: &str, to: &str) {
        for node in &mut self.nodes {
            for name in node.input.iter_mut().chain(node.output.iter_mut()) {
                if name == from {
                    *name = to.to_string();
                }
            }
        }
    }

    pub fn add(&mut self, a: &str, b: &str) -> String {
        self.node("Add", &[a, b], vec![])
    }

    pub fn sub(&mut self, a: &str, b: &str) -> String {
        self.node("Sub", &[a, b], vec![])
    }

    pub fn mul(&mut self, a: &str, b: &str) -> String {
        self.node("Mul", &[a, b], vec![])
    }

    pub fn div(&mut self, a: &str, b: &str) -> String {
        self.node("Div", &[a, b], vec![])
    }

    pub fn matmul(&mut self, a: &str, b: &str) -> String {
        self.node("MatMul", &[a, b], vec![])
    }

    pub fn unary(&mut self, op_type: &str, x: &str) -> String {
        self.node(op_type, &[x], vec![])
    }

    pub fn equal(&mut self, a: &str, b: &str) -> String {
        self.node("Equal", &[a, b], vec![])
    }

    pub fn cast(&mut self, x: &str, to: DataType) -> String {
        self.node("Cast", &[x], vec![attr_int("to", to as i64)])
    }

    pub fn reshape(&mut self, x: &str, shape: &[i64]) -> String {
        let shape = self.const_i64("Reshape_shape", &[shape.len()], shape);
        self.node("Reshape", &[x, shape.as_str()], vec![])
    }

    pub fn transpose(&mut self, x: &str, perm: &[i64]) -> String {
        self.node("Transpose", &[x], vec![attr_ints("perm", perm)])
    }

    pub fn unsqueeze(&mut self, x: &str, axes: &[i64]) -> String {
        let axes = self.const_i64("Unsqueeze_axes", &[axes.len()], axes);
        self.node("Unsqueeze", &[x, axes.as_str()], vec![])
    }

    pub fn concat(&mut self, xs: &[&str], axis: i64) -> String {
        self.node("Concat", xs, vec![attr_int("axis", axis)])
    }

    pub fn gather(&mut self, x: &str, indices: &str, axis: i64) -> String {
        self.node("Gather", &[x, indices], vec![attr_int("axis", axis)])
    }

    pub fn slice(&mut self, x: &str, starts: &str, ends: &str, axes: &str) -> String {
        self.node("Slice", &[x, starts, ends, axes], vec![])
    }

    pub fn softmax(&mut self, x: &str, axis: i64) -> String {
        self.node("Softmax", &[x], vec![attr_int("axis", axis)])
    }

    pub fn argmax(&mut self, x: &str, axis: i64, keepdims: bool) -> String {
        self.node(
            "ArgMax",
            &[x],
            vec![attr_int("axis", axis), attr_int("keepdims", i64::from(keepdims))],
        )
    }

    /// `ReduceMean`/`ReduceMax`/...; axes move from attribute to input at opset 18
    pub fn reduce(&mut self, op_type: &str, x: &str, axes: &[i64], keepdims: bool) -> String {
        let keepdims = attr_int("keepdims", i64::from(keepdims));
        if self.opset >= 18 {
            let axes = self.const_i64("Reduce_axes", &[axes.len()], axes);
            self.node(op_type, &[x, axes.as_str()], vec![keepdims])
        } else {
            self.node(op_type, &[x], vec![attr_ints("axes", axes), keepdims])
        }
    }

    /// Bilinear resize to `sizes` with half-pixel sampling (`align_corners = false`)
    pub fn resize_bilinear(&mut self, x: &str, sizes: &str) -> String {
        self.node(
            "Resize",
            &[x, "", "", sizes],
            vec![
                attr_string("coordinate_transformation_mode", "pytorch_half_pixel"),
                attr_float("cubic_coeff_a", -0.75),
                attr_string("mode", "linear"),
                attr_string("nearest_mode", "floor"),
            ],
        )
    }

    /// Finish the graph
    #[must_use]
    pub fn build(self) -> GraphProto {
        GraphProto {
            node: self.nodes,
            name: self.name,
            initializer: self.initializers,
            input: self.inputs,
            output: self.outputs,
            ..Default::default()
        }
    }

    /// Finish the graph and wrap it in a model with the matching IR version
    #[must_use]
    pub fn build_model(self, metadata: Vec<(String, String)>) -> ModelProto {
        let opset = self.opset;
        ModelProto {
            ir_version: ir_version_for_opset(opset),
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: opset,
            }],
            producer_name: PRODUCER_NAME.to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            graph: Some(self.build()),
            metadata_props: metadata
                .into_iter()
                .map(|(key, value)| StringStringEntryProto { key, value })
                .collect(),
            ..Default::default()
        }
    }
}
