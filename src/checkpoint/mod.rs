//! Checkpoint IO
//!
//! Reads pretrained weights into a flat [`StateDict`]; model construction
//! pulls tensors out of it through the [`TensorSource`] trait.

mod format;
mod load;
mod weights;

pub use format::CheckpointFormat;
pub use load::{load_state_dict, load_state_dict_with};
pub use weights::{ShapeRecorder, StateDict, TensorSource};
