//! Constructors and accessors for `TensorProto` and `ValueInfoProto`

use super::proto::{
    tensor_shape_proto::{dimension, Dimension},
    type_proto, DataType, TensorProto, TensorShapeProto, TypeProto, ValueInfoProto,
};
use crate::error::{ExportError, Result};

/// A declared tensor dimension: fixed at export time or symbolic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dim {
    /// Fixed extent
    Fixed(usize),
    /// Named dynamic axis
    Param(String),
}

impl Dim {
    /// Convert a concrete shape into fixed dimensions
    #[must_use]
    pub fn fixed(shape: &[usize]) -> Vec<Dim> {
        shape.iter().map(|&d| Dim::Fixed(d)).collect()
    }
}

fn dims_i64(dims: &[usize]) -> Vec<i64> {
    dims.iter().map(|&d| d as i64).collect()
}

/// Float tensor stored as little-endian raw bytes
#[must_use]
pub fn f32_tensor(name: impl Into<String>, dims: &[usize], data: &[f32]) -> TensorProto {
    TensorProto {
        name: name.into(),
        dims: dims_i64(dims),
        data_type: DataType::Float as i32,
        raw_data: bytemuck::cast_slice(data).to_vec(),
        ..Default::default()
    }
}

/// Int64 tensor stored as little-endian raw bytes
#[must_use]
pub fn i64_tensor(name: impl Into<String>, dims: &[usize], data: &[i64]) -> TensorProto {
    TensorProto {
        name: name.into(),
        dims: dims_i64(dims),
        data_type: DataType::Int64 as i32,
        raw_data: bytemuck::cast_slice(data).to_vec(),
        ..Default::default()
    }
}

/// Uint8 tensor
#[must_use]
pub fn u8_tensor(name: impl Into<String>, dims: &[usize], data: &[u8]) -> TensorProto {
    TensorProto {
        name: name.into(),
        dims: dims_i64(dims),
        data_type: DataType::Uint8 as i32,
        raw_data: data.to_vec(),
        ..Default::default()
    }
}

/// Int8 tensor
#[must_use]
pub fn i8_tensor(name: impl Into<String>, dims: &[usize], data: &[i8]) -> TensorProto {
    TensorProto {
        name: name.into(),
        dims: dims_i64(dims),
        data_type: DataType::Int8 as i32,
        raw_data: bytemuck::cast_slice(data).to_vec(),
        ..Default::default()
    }
}

/// Number of elements described by `dims`
#[must_use]
pub fn element_count(tensor: &TensorProto) -> usize {
    tensor.dims.iter().map(|&d| d.max(0) as usize).product()
}

/// Read a float tensor from either `raw_data` or `float_data`
pub fn f32_values(tensor: &TensorProto) -> Result<Vec<f32>> {
    if tensor.data_type != DataType::Float as i32 {
        return Err(ExportError::graph(format!(
            "tensor '{}' has data type {}, expected FLOAT",
            tensor.name, tensor.data_type
        )));
    }

    let values: Vec<f32> = if tensor.raw_data.is_empty() {
        tensor.float_data.clone()
    } else {
        tensor
            .raw_data
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    };

    let expected = element_count(tensor);
    if values.len() != expected {
        return Err(ExportError::graph(format!(
            "tensor '{}' holds {} values but its dims describe {}",
            tensor.name,
            values.len(),
            expected
        )));
    }
    Ok(values)
}

/// Tensor value info with element type and (possibly symbolic) shape
#[must_use]
pub fn value_info(name: impl Into<String>, elem_type: DataType, dims: &[Dim]) -> ValueInfoProto {
    let dim = dims
        .iter()
        .map(|d| Dimension {
            value: Some(match d {
                Dim::Fixed(v) => dimension::Value::DimValue(*v as i64),
                Dim::Param(p) => dimension::Value::DimParam(p.clone()),
            }),
            ..Default::default()
        })
        .collect();

    ValueInfoProto {
        name: name.into(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: elem_type as i32,
                shape: Some(TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Declared dims of a value info, `None` for unknown types
#[must_use]
pub fn value_info_dims(info: &ValueInfoProto) -> Option<Vec<Dim>> {
    let Some(TypeProto {
        value: Some(type_proto::Value::TensorType(tensor)),
        ..
    }) = &info.r#type
    else {
        return None;
    };
    let shape = tensor.shape.as_ref()?;
    Some(
        shape
            .dim
            .iter()
            .map(|d| match &d.value {
                Some(dimension::Value::DimValue(v)) => Dim::Fixed(*v as usize),
                Some(dimension::Value::DimParam(p)) => Dim::Param(p.clone()),
                None => Dim::Param(String::new()),
            })
            .collect(),
    )
}
