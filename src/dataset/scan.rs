//! Image directory scanning.

use std::collections::BTreeSet;
use std::path::Path;

use image::ImageReader;

use super::ImageSize;
use crate::error::{ExportError, Result};

/// Subdirectory of the dataset root holding the images
pub const IMAGES_DIR: &str = "images";

/// Accepted file name suffixes (case sensitive)
pub const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".JPG", ".png"];

/// Whether a file name carries one of the accepted suffixes
#[must_use]
pub fn is_image_name(name: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Read `(height, width)` from the image header without decoding pixels
pub fn read_image_size(path: &Path) -> Result<ImageSize> {
    let mut reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| ExportError::io(format!("opening image {}", path.display()), e))?;
    // Large scans must not trip decoder size limits
    reader.no_limits();
    let (width, height) = reader
        .into_dimensions()
        .map_err(|source| ExportError::Image {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(ImageSize::new(height, width))
}

/// Collect the distinct sizes of all images under `<root>/images`
///
/// Non-image files are ignored; an unreadable image aborts the scan.
pub fn scan_image_sizes(root: &Path) -> Result<BTreeSet<ImageSize>> {
    let dir = root.join(IMAGES_DIR);
    let entries = std::fs::read_dir(&dir)
        .map_err(|e| ExportError::io(format!("listing {}", dir.display()), e))?;

    let mut sizes = BTreeSet::new();
    let mut images = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| ExportError::io(format!("listing {}", dir.display()), e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_image_name(name) {
            continue;
        }
        let size = read_image_size(&entry.path())?;
        tracing::debug!(image = name, size = %size, "read image header");
        sizes.insert(size);
        images += 1;
    }

    tracing::info!(
        images,
        distinct_sizes = sizes.len(),
        dir = %dir.display(),
        "scanned dataset"
    );
    Ok(sizes)
}
