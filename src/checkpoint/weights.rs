//! Named tensor containers.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{ExportError, Result};

/// Anything model parameters can be pulled from by name and shape
pub trait TensorSource {
    /// Fetch `name`, failing unless its shape is exactly `shape`
    fn require(&self, name: &str, shape: &[usize]) -> Result<Vec<f32>>;

    /// Shape of `name`, if present
    fn shape_of(&self, name: &str) -> Option<Vec<usize>>;
}

/// Checkpoint weights, flattened to `f32`
#[derive(Debug, Clone, Default)]
pub struct StateDict {
    /// Tensor data by name
    pub tensors: HashMap<String, Vec<f32>>,
    /// Tensor shapes by name
    pub shapes: HashMap<String, Vec<usize>>,
}

impl StateDict {
    /// Create new empty state dict
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tensor
    pub fn add_tensor(&mut self, name: impl Into<String>, data: Vec<f32>, shape: Vec<usize>) {
        let name = name.into();
        self.tensors.insert(name.clone(), data);
        self.shapes.insert(name, shape);
    }

    /// Record the shape of a tensor whose data was not loaded
    pub fn add_shape(&mut self, name: impl Into<String>, shape: Vec<usize>) {
        self.shapes.insert(name.into(), shape);
    }

    /// Get tensor by name
    #[must_use]
    pub fn get_tensor(&self, name: &str) -> Option<(&Vec<f32>, &Vec<usize>)> {
        let data = self.tensors.get(name)?;
        let shape = self.shapes.get(name)?;
        Some((data, shape))
    }

    /// Remove a tensor
    #[cfg(test)]
    pub fn remove_tensor(&mut self, name: &str) -> Option<Vec<f32>> {
        self.shapes.remove(name);
        self.tensors.remove(name)
    }

    /// Number of tensors with data
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether no tensors were loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Count total parameters
    #[must_use]
    pub fn param_count(&self) -> u64 {
        self.tensors.values().map(|t| t.len() as u64).sum()
    }
}

impl TensorSource for StateDict {
    fn require(&self, name: &str, shape: &[usize]) -> Result<Vec<f32>> {
        let (data, actual) = self
            .get_tensor(name)
            .ok_or_else(|| ExportError::MissingTensor {
                name: name.to_string(),
            })?;
        if actual.as_slice() != shape {
            return Err(ExportError::ShapeMismatch {
                tensor: name.to_string(),
                expected: shape.to_vec(),
                actual: actual.clone(),
            });
        }
        Ok(data.clone())
    }

    fn shape_of(&self, name: &str) -> Option<Vec<usize>> {
        self.shapes.get(name).cloned()
    }
}

/// Records every tensor a model asks for and hands back zeros
///
/// Building a model against a recorder yields the exact list of tensors a
/// checkpoint has to provide.
#[derive(Debug, Default)]
pub struct ShapeRecorder {
    requested: RefCell<Vec<(String, Vec<usize>)>>,
}

impl ShapeRecorder {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested `(name, shape)` pairs in request order
    #[must_use]
    pub fn into_requests(self) -> Vec<(String, Vec<usize>)> {
        self.requested.into_inner()
    }
}

impl TensorSource for ShapeRecorder {
    fn require(&self, name: &str, shape: &[usize]) -> Result<Vec<f32>> {
        self.requested
            .borrow_mut()
            .push((name.to_string(), shape.to_vec()));
        Ok(vec![0.0; shape.iter().product()])
    }

    fn shape_of(&self, _name: &str) -> Option<Vec<usize>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_returns_data_for_matching_shape() {
        let mut sd = StateDict::new();
        sd.add_tensor("w", vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        assert_eq!(sd.require("w", &[2, 2]).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sd.shape_of("w"), Some(vec![2, 2]));
        assert_eq!(sd.param_count(), 4);
    }

    #[test]
    fn test_require_missing_tensor() {
        let sd = StateDict::new();
        assert!(matches!(
            sd.require("absent", &[1]),
            Err(ExportError::MissingTensor { name }) if name == "absent"
        ));
    }

    #[test]
    fn test_require_shape_mismatch() {
        let mut sd = StateDict::new();
        sd.add_tensor("w", vec![0.0; 6], vec![2, 3]);
        match sd.require("w", &[3, 2]) {
            Err(ExportError::ShapeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, vec![3, 2]);
                assert_eq!(actual, vec![2, 3]);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_remove_tensor() {
        let mut sd = StateDict::new();
        sd.add_tensor("w", vec![0.0], vec![1]);
        assert!(sd.remove_tensor("w").is_some());
        assert!(sd.is_empty());
        assert!(sd.shape_of("w").is_none());
    }

    #[test]
    fn test_recorder_tracks_requests() {
        let recorder = ShapeRecorder::new();
        let data = recorder.require("a", &[2, 3]).unwrap();
        assert_eq!(data.len(), 6);
        recorder.require("b", &[4]).unwrap();
        let requests = recorder.into_requests();
        assert_eq!(
            requests,
            vec![("a".to_string(), vec![2, 3]), ("b".to_string(), vec![4])]
        );
    }
}
