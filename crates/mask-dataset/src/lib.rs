//! Face-mask dataset scanning, splitting and loading.
//!
//! This crate walks a corpus of per-subject image folders, assigns samples to
//! train and validation phases, and exposes indexed dataset views that pair
//! transformed images with encoded labels for burn's data loaders.

pub mod batcher;
pub mod dataset;
pub mod loader;
pub mod scanner;
pub mod split;
pub mod statistics;
pub mod test_dataset;
pub mod transform;

pub use batcher::{MaskBatch, MaskBatcher, TestBatch};
pub use dataset::{MaskDataset, MaskDatasetBuilder, MaskItem, Subset};
pub use loader::ImageLoader;
pub use scanner::{CorpusScanner, FileSelector, Sample, Subject};
pub use split::{PhaseStats, SplitAssignment, SplitStats, SubjectPlan};
pub use statistics::{compute_channel_statistics, DatasetStats};
pub use test_dataset::{TestImageDataset, TestItem};
pub use transform::{
    denormalize, normalize, AugmentationPreset, Compose, ImageTensor, Transform,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dataset::{MaskDataset, MaskDatasetBuilder, MaskItem, Subset};
    pub use crate::split::SplitAssignment;
    pub use crate::transform::{AugmentationPreset, Transform};
    pub use mask_core::prelude::*;
}
