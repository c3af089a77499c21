//! Dataset size discovery
//!
//! The exported graphs are sized per distinct image size, so the only thing
//! read from the dataset is each image's header.

mod scan;

pub use scan::{is_image_name, read_image_size, scan_image_sizes, IMAGES_DIR, IMAGE_EXTENSIONS};

use std::fmt;

/// Image dimensions in pixels, ordered by height then width
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
}

impl ImageSize {
    #[must_use]
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

/// Formats as `<height>_<width>`, the artifact name suffix
impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.height, self.width)
    }
}
