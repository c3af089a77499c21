//! Example input shapes
//!
//! The graph is built directly rather than traced, so only the shapes of the
//! example inputs matter: they fix the declared types of the graph inputs.

use crate::onnx::{DataType, Dim};

/// Graph input names, in declaration order
pub const INPUT_NAMES: [&str; 6] = [
    "image_embeddings",
    "point_coords",
    "point_labels",
    "mask_input",
    "has_mask_input",
    "orig_im_size",
];

/// Graph output names, in declaration order
pub const OUTPUT_NAMES: [&str; 3] = ["masks", "iou_predictions", "low_res_masks"];

/// Inputs with a symbolic axis: `(input, axis, name)`
pub const DYNAMIC_AXES: [(&str, usize, &str); 2] = [
    ("point_coords", 1, "num_points"),
    ("point_labels", 1, "num_points"),
];

/// Points in the example prompt
pub const NUM_DUMMY_POINTS: usize = 5;

/// A named example tensor shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyTensor {
    pub name: &'static str,
    pub shape: Vec<usize>,
}

impl DummyTensor {
    /// Declared graph dims: export-time values except for dynamic axes
    #[must_use]
    pub fn dims(&self) -> Vec<Dim> {
        self.shape
            .iter()
            .enumerate()
            .map(|(axis, &size)| {
                DYNAMIC_AXES
                    .iter()
                    .find(|(input, dyn_axis, _)| *input == self.name && *dyn_axis == axis)
                    .map_or(Dim::Fixed(size), |(_, _, param)| Dim::Param((*param).to_string()))
            })
            .collect()
    }

    #[must_use]
    pub fn elem_type(&self) -> DataType {
        DataType::Float
    }
}

/// The six example inputs for one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyInputs {
    pub image_embeddings: DummyTensor,
    pub point_coords: DummyTensor,
    pub point_labels: DummyTensor,
    pub mask_input: DummyTensor,
    pub has_mask_input: DummyTensor,
    pub orig_im_size: DummyTensor,
}

impl DummyInputs {
    /// Shapes for an embedding of `embed_dim` channels on a `grid` x `grid` map
    #[must_use]
    pub fn new(embed_dim: usize, grid: usize) -> Self {
        let mask_side = 4 * grid;
        let tensor = |index: usize, shape: Vec<usize>| DummyTensor {
            name: INPUT_NAMES[index],
            shape,
        };
        Self {
            image_embeddings: tensor(0, vec![1, embed_dim, grid, grid]),
            point_coords: tensor(1, vec![1, NUM_DUMMY_POINTS, 2]),
            point_labels: tensor(2, vec![1, NUM_DUMMY_POINTS]),
            mask_input: tensor(3, vec![1, 1, mask_side, mask_side]),
            has_mask_input: tensor(4, vec![1]),
            orig_im_size: tensor(5, vec![2]),
        }
    }

    /// Inputs in declaration order
    #[must_use]
    pub fn tensors(&self) -> [&DummyTensor; 6] {
        [
            &self.image_embeddings,
            &self.point_coords,
            &self.point_labels,
            &self.mask_input,
            &self.has_mask_input,
            &self.orig_im_size,
        ]
    }
}
