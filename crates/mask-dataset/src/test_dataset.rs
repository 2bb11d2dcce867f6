//! Unlabeled images for inference submissions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataset::Dataset;
use image::ImageFormat;
use mask_core::{ChannelStatistics, Error, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::loader::ImageLoader;
use crate::transform::{AugmentationPreset, ImageTensor, Transform};

/// A transformed test image and where it came from
#[derive(Debug, Clone)]
pub struct TestItem {
    pub image: ImageTensor,
    pub path: PathBuf,
}

/// Fixed-transform dataset over a list of image paths
pub struct TestImageDataset {
    paths: Vec<PathBuf>,
    loader: ImageLoader,
    transform: Arc<dyn Transform>,
}

impl std::fmt::Debug for TestImageDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestImageDataset")
            .field("root_dir", &self.loader.root_dir())
            .field("paths", &self.paths.len())
            .finish()
    }
}

impl TestImageDataset {
    /// Paths are resolved against `root_dir`. Images get the crop preset.
    pub fn new(root_dir: impl Into<PathBuf>, paths: Vec<PathBuf>, statistics: ChannelStatistics) -> Self {
        Self {
            paths,
            loader: ImageLoader::new(root_dir),
            transform: Arc::new(AugmentationPreset::Crop.build(statistics)),
        }
    }

    /// Every decodable image file directly inside `dir`, sorted by name
    pub fn from_dir(dir: &Path, statistics: ChannelStatistics) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::NotFound(dir.to_path_buf()));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let path = entry.path();
            if path.is_file() && ImageFormat::from_path(path).is_ok() {
                paths.push(path.to_path_buf());
            }
        }

        info!("Found {} test images in {}", paths.len(), dir.display());
        Ok(Self::new(dir, paths, statistics))
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<TestItem> {
        let path = self.paths.get(index).ok_or(Error::IndexOutOfBounds {
            index,
            len: self.paths.len(),
        })?;

        let image = self.loader.load_pixels(path)?;
        Ok(TestItem {
            image: self.transform.apply(image)?,
            path: path.clone(),
        })
    }
}

impl Dataset<TestItem> for TestImageDataset {
    fn get(&self, index: usize) -> Option<TestItem> {
        TestImageDataset::get(self, index)
            .map_err(|e| warn!("Failed to load test image {}: {}", index, e))
            .ok()
    }

    fn len(&self) -> usize {
        self.paths.len()
    }
}
