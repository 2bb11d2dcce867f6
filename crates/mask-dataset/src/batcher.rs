//! Batching of dataset items into burn tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use mask_core::{Error, Result};

use crate::dataset::MaskItem;
use crate::test_dataset::TestItem;
use crate::transform::ImageTensor;

/// A batch of face images for training
#[derive(Clone, Debug)]
pub struct MaskBatch<B: Backend> {
    /// Images with shape [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,
    /// Encoded labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks transformed items. Items in one batch must share a shape (see
/// [`MaskBatcher::common_shape`]); the transform already normalized them.
#[derive(Clone, Debug)]
pub struct MaskBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> MaskBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Shape shared by every image, or an error naming the first image that
    /// differs from the first one. An empty batch has shape `[0, 0, 0]`.
    pub fn common_shape<'a>(images: impl IntoIterator<Item = &'a ImageTensor>) -> Result<[usize; 3]> {
        let mut images = images.into_iter();
        let Some(first) = images.next() else {
            return Ok([0; 3]);
        };

        let shape = first.shape();
        for (position, image) in images.enumerate() {
            if image.shape() != shape {
                return Err(Error::InvalidArgument(format!(
                    "Batch item {} has shape {:?}, expected {:?}",
                    position + 1,
                    image.shape(),
                    shape
                )));
            }
        }
        Ok(shape)
    }

    /// # Panics
    ///
    /// Panics when the images do not all share one shape. Batches drawn from
    /// one dataset under one transform always do.
    fn stack<'a>(&self, images: impl ExactSizeIterator<Item = &'a ImageTensor> + Clone) -> Tensor<B, 4> {
        let batch_size = images.len();
        let shape = match Self::common_shape(images.clone()) {
            Ok(shape) => shape,
            Err(e) => panic!("Cannot stack images into one batch: {}", e),
        };

        let mut data = Vec::with_capacity(batch_size * shape.iter().product::<usize>());
        for image in images {
            data.extend_from_slice(image.data());
        }

        Tensor::<B, 4>::from_floats(
            TensorData::new(data, [batch_size, shape[0], shape[1], shape[2]]),
            &self.device,
        )
    }
}

impl<B: Backend> Batcher<MaskItem, MaskBatch<B>> for MaskBatcher<B> {
    fn batch(&self, items: Vec<MaskItem>) -> MaskBatch<B> {
        let images = self.stack(items.iter().map(|item| &item.image));

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [items.len()]),
            &self.device,
        );

        MaskBatch { images, targets }
    }
}

/// A batch of unlabeled images for inference
#[derive(Clone, Debug)]
pub struct TestBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub paths: Vec<String>,
}

impl<B: Backend> Batcher<TestItem, TestBatch<B>> for MaskBatcher<B> {
    fn batch(&self, items: Vec<TestItem>) -> TestBatch<B> {
        let images = self.stack(items.iter().map(|item| &item.image));
        let paths = items
            .iter()
            .map(|item| item.path.to_string_lossy().to_string())
            .collect();

        TestBatch { images, paths }
    }
}
