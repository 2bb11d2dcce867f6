//! Image loading for dataset samples.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use mask_core::{Error, Result};

/// Decodes sample images from disk.
///
/// Relative paths are resolved against `root_dir`. Formats are sniffed from
/// the file contents, since corpus extensions are unconstrained.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    root_dir: PathBuf,
}

impl ImageLoader {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Gets the full path for an image. Paths already under `root_dir` are
    /// returned unchanged.
    pub fn full_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.starts_with(&self.root_dir) {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// Loads the raster image at `path`.
    pub fn load_pixels(&self, path: &Path) -> Result<DynamicImage> {
        let full_path = self.full_path(path);

        if !full_path.is_file() {
            return Err(Error::NotFound(full_path));
        }

        let image = ImageReader::open(&full_path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| Error::Image(format!("Failed to decode {}: {}", full_path.display(), e)))?;

        Ok(image)
    }
}
