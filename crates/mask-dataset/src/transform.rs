//! Image transforms applied when a sample is fetched.
//!
//! A [`Compose`] runs its image stage (center crop, resize) on the decoded
//! raster, converts to a CHW float tensor in `[0, 1]`, then runs its tensor
//! stage (normalize, gaussian noise). [`AugmentationPreset`] builds the
//! pipelines used for training and inference.

use std::fmt;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use mask_core::{ChannelStatistics, Error, Result};
use rand::thread_rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Side of the square center crop used by the crop-based presets
pub const CROP_SIZE: u32 = 384;

/// Input side expected by ViT backbones
pub const VIT_SIZE: u32 = 224;

/// Float image in CHW layout
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    shape: [usize; 3],
}

impl ImageTensor {
    pub fn new(data: Vec<f32>, shape: [usize; 3]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::InvalidArgument(format!(
                "Tensor data has {} values, shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { data, shape })
    }

    /// Converts an image to RGB and scales pixels to `[0, 1]`
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        let plane = width * height;
        let mut data = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for c in 0..3 {
                data[c * plane + offset] = pixel[c] as f32 / 255.0;
            }
        }

        Self {
            data,
            shape: [3, height, width],
        }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// `[channels, height, width]`
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    fn channel_planes_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        let plane = (self.shape[1] * self.shape[2]).max(1);
        self.data.chunks_exact_mut(plane)
    }
}

/// Turns a decoded image into a model-ready tensor.
///
/// Implementations are shared between loader workers.
pub trait Transform: Send + Sync {
    fn apply(&self, image: DynamicImage) -> Result<ImageTensor>;
}

impl<F> Transform for F
where
    F: Fn(DynamicImage) -> Result<ImageTensor> + Send + Sync,
{
    fn apply(&self, image: DynamicImage) -> Result<ImageTensor> {
        self(image)
    }
}

/// Operation on the decoded raster
pub trait ImageOp: Send + Sync + fmt::Debug {
    fn apply(&self, image: DynamicImage) -> DynamicImage;
}

/// Operation on the float tensor
pub trait TensorOp: Send + Sync + fmt::Debug {
    fn apply(&self, tensor: ImageTensor) -> Result<ImageTensor>;
}

/// Crops the central `width x height` region, padding with black when the
/// image is smaller than the crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CenterCrop {
    pub width: u32,
    pub height: u32,
}

impl CenterCrop {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }
}

impl ImageOp for CenterCrop {
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        let (width, height) = (image.width(), image.height());

        if width >= self.width && height >= self.height {
            let left = (width - self.width) / 2;
            let top = (height - self.height) / 2;
            return image.crop_imm(left, top, self.width, self.height);
        }

        let mut canvas = RgbImage::new(self.width, self.height);
        let x = (i64::from(self.width) - i64::from(width)) / 2;
        let y = (i64::from(self.height) - i64::from(height)) / 2;
        imageops::overlay(&mut canvas, &image.to_rgb8(), x, y);
        DynamicImage::ImageRgb8(canvas)
    }
}

/// Bilinear resize to exactly `width x height`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl ImageOp for Resize {
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        image.resize_exact(self.width, self.height, FilterType::Triangle)
    }
}

/// Converts to a CHW tensor in `[0, 1]` without further processing
#[derive(Debug, Clone, Copy, Default)]
pub struct ToTensor;

impl Transform for ToTensor {
    fn apply(&self, image: DynamicImage) -> Result<ImageTensor> {
        Ok(ImageTensor::from_image(&image))
    }
}

/// Per-channel `(x - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub statistics: ChannelStatistics,
}

impl Normalize {
    pub fn new(statistics: ChannelStatistics) -> Self {
        Self { statistics }
    }
}

impl TensorOp for Normalize {
    fn apply(&self, mut tensor: ImageTensor) -> Result<ImageTensor> {
        if tensor.channels() != 3 {
            return Err(Error::InvalidArgument(format!(
                "Normalize expects 3 channels, got {}",
                tensor.channels()
            )));
        }

        let ChannelStatistics { mean, std } = self.statistics;
        for (c, plane) in tensor.channel_planes_mut().enumerate() {
            for v in plane.iter_mut() {
                *v = (*v - mean[c]) / std[c];
            }
        }
        Ok(tensor)
    }
}

/// Adds `N(0, std) + mean` to every value
#[derive(Debug, Clone, Copy)]
pub struct AddGaussianNoise {
    mean: f32,
    std: f32,
    distribution: Normal<f32>,
}

impl AddGaussianNoise {
    pub fn new(mean: f32, std: f32) -> Result<Self> {
        let distribution = Normal::new(0.0, std)
            .map_err(|e| Error::InvalidArgument(format!("Invalid noise std {}: {}", std, e)))?;
        Ok(Self {
            mean,
            std,
            distribution,
        })
    }

    pub fn mean(&self) -> f32 {
        self.mean
    }

    pub fn std(&self) -> f32 {
        self.std
    }
}

impl TensorOp for AddGaussianNoise {
    fn apply(&self, mut tensor: ImageTensor) -> Result<ImageTensor> {
        let mut rng = thread_rng();
        for v in tensor.data.iter_mut() {
            *v += self.distribution.sample(&mut rng) + self.mean;
        }
        Ok(tensor)
    }
}

/// Image ops, then to-tensor, then tensor ops
#[derive(Debug, Default)]
pub struct Compose {
    image_ops: Vec<Box<dyn ImageOp>>,
    tensor_ops: Vec<Box<dyn TensorOp>>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_op(mut self, op: impl ImageOp + 'static) -> Self {
        self.image_ops.push(Box::new(op));
        self
    }

    pub fn tensor_op(mut self, op: impl TensorOp + 'static) -> Self {
        self.tensor_ops.push(Box::new(op));
        self
    }

    pub fn len(&self) -> usize {
        self.image_ops.len() + self.tensor_ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Transform for Compose {
    fn apply(&self, image: DynamicImage) -> Result<ImageTensor> {
        let image = self
            .image_ops
            .iter()
            .fold(image, |image, op| op.apply(image));

        self.tensor_ops
            .iter()
            .try_fold(ImageTensor::from_image(&image), |tensor, op| op.apply(tensor))
    }
}

/// Named pipelines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AugmentationPreset {
    /// To-tensor and normalize at native resolution
    #[default]
    Base,
    /// 384 center crop, to-tensor, normalize
    Crop,
    /// 384 center crop, resize to 224, to-tensor, normalize
    #[serde(rename = "vit")]
    ViT,
    /// 384 center crop and to-tensor only
    Custom,
}

impl AugmentationPreset {
    pub const ALL: [AugmentationPreset; 4] = [
        AugmentationPreset::Base,
        AugmentationPreset::Crop,
        AugmentationPreset::ViT,
        AugmentationPreset::Custom,
    ];

    pub fn build(self, statistics: ChannelStatistics) -> Compose {
        let normalize = Normalize::new(statistics);
        match self {
            AugmentationPreset::Base => Compose::new().tensor_op(normalize),
            AugmentationPreset::Crop => Compose::new()
                .image_op(CenterCrop::square(CROP_SIZE))
                .tensor_op(normalize),
            AugmentationPreset::ViT => Compose::new()
                .image_op(CenterCrop::square(CROP_SIZE))
                .image_op(Resize::new(VIT_SIZE, VIT_SIZE))
                .tensor_op(normalize),
            AugmentationPreset::Custom => Compose::new().image_op(CenterCrop::square(CROP_SIZE)),
        }
    }
}

impl fmt::Display for AugmentationPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AugmentationPreset::Base => "base",
            AugmentationPreset::Crop => "crop",
            AugmentationPreset::ViT => "vit",
            AugmentationPreset::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for AugmentationPreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "base" => Ok(AugmentationPreset::Base),
            "crop" => Ok(AugmentationPreset::Crop),
            "vit" => Ok(AugmentationPreset::ViT),
            "custom" => Ok(AugmentationPreset::Custom),
            _ => Err(Error::InvalidArgument(format!(
                "Unknown augmentation preset: {}",
                s
            ))),
        }
    }
}

/// Scales an 8-bit image to `[0, 1]` and normalizes it per channel
pub fn normalize(image: &RgbImage, statistics: &ChannelStatistics) -> Result<ImageTensor> {
    let tensor = ImageTensor::from_image(&DynamicImage::ImageRgb8(image.clone()));
    Normalize::new(*statistics).apply(tensor)
}

/// Inverse of [`normalize`]: `(x * std + mean) * 255`, rounded and clamped to
/// `[0, 255]`.
pub fn denormalize(tensor: &ImageTensor, statistics: &ChannelStatistics) -> Result<RgbImage> {
    if tensor.channels() != 3 {
        return Err(Error::InvalidArgument(format!(
            "Denormalize expects 3 channels, got {}",
            tensor.channels()
        )));
    }

    let (height, width) = (tensor.height(), tensor.width());
    let plane = height * width;
    let ChannelStatistics { mean, std } = statistics;

    let image = RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let offset = y as usize * width + x as usize;
        let mut pixel = [0u8; 3];
        for c in 0..3 {
            let value = (tensor.data[c * plane + offset] * std[c] + mean[c]) * 255.0;
            pixel[c] = value.round().clamp(0.0, 255.0) as u8;
        }
        image::Rgb(pixel)
    });

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
        })
    }

    #[test]
    fn test_to_tensor_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 51]));

        let tensor = ToTensor.apply(DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(tensor.shape(), [3, 1, 2]);
        assert_eq!(tensor.data(), &[1.0, 0.0, 0.0, 1.0, 0.0, 0.2]);
    }

    #[test]
    fn test_center_crop_larger_image() {
        let img = DynamicImage::ImageRgb8(gradient(10, 8));
        let cropped = CenterCrop::new(4, 2).apply(img.clone());
        assert_eq!((cropped.width(), cropped.height()), (4, 2));
        assert_eq!(
            cropped.to_rgb8().get_pixel(0, 0),
            img.to_rgb8().get_pixel(3, 3)
        );
    }

    #[test]
    fn test_center_crop_pads_small_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([200, 100, 50])));
        let cropped = CenterCrop::square(4).apply(img).to_rgb8();
        assert_eq!(cropped.dimensions(), (4, 4));
        assert_eq!(cropped.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(cropped.get_pixel(1, 1), &Rgb([200, 100, 50]));
    }

    #[test]
    fn test_resize() {
        let img = DynamicImage::ImageRgb8(gradient(20, 10));
        let resized = Resize::new(5, 6).apply(img);
        assert_eq!((resized.width(), resized.height()), (5, 6));
    }

    #[test]
    fn test_normalize_values() {
        let stats = ChannelStatistics::new([0.5, 0.5, 0.5], [0.25, 0.5, 1.0]);
        let tensor = ImageTensor::new(vec![1.0, 1.0, 1.0], [3, 1, 1]).unwrap();
        let normalized = Normalize::new(stats).apply(tensor).unwrap();
        assert_eq!(normalized.data(), &[2.0, 1.0, 0.5]);
    }

    #[test]
    fn test_normalize_rejects_wrong_channels() {
        let tensor = ImageTensor::new(vec![0.0; 4], [1, 2, 2]).unwrap();
        let result = Normalize::new(ChannelStatistics::default()).apply(tensor);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_denormalize_inverts_normalize() {
        let img = gradient(9, 7);
        let stats = ChannelStatistics::default();

        let tensor = normalize(&img, &stats).unwrap();
        let restored = denormalize(&tensor, &stats).unwrap();

        assert_eq!(restored, img);
    }

    #[test]
    fn test_denormalize_clamps() {
        let stats = ChannelStatistics::new([0.0; 3], [1.0; 3]);
        let tensor = ImageTensor::new(vec![2.0, -1.0, 0.5], [3, 1, 1]).unwrap();
        let img = denormalize(&tensor, &stats).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 0, 128]));
    }

    #[test]
    fn test_gaussian_noise() {
        let noise = AddGaussianNoise::new(0.0, 1.0).unwrap();
        let tensor = ImageTensor::new(vec![0.5; 300], [3, 10, 10]).unwrap();
        let noisy = noise.apply(tensor.clone()).unwrap();
        assert_ne!(noisy, tensor);

        let zero = AddGaussianNoise::new(0.25, 0.0).unwrap();
        let shifted = zero.apply(tensor).unwrap();
        assert!(shifted.data().iter().all(|v| (*v - 0.75).abs() < 1e-6));

        assert!(AddGaussianNoise::new(0.0, -1.0).is_err());
    }

    #[test]
    fn test_presets_output_shape() {
        let img = DynamicImage::ImageRgb8(gradient(512, 400));
        let stats = ChannelStatistics::default();

        let base = AugmentationPreset::Base.build(stats).apply(img.clone()).unwrap();
        assert_eq!(base.shape(), [3, 400, 512]);

        let crop = AugmentationPreset::Crop.build(stats).apply(img.clone()).unwrap();
        assert_eq!(crop.shape(), [3, 384, 384]);

        let vit = AugmentationPreset::ViT.build(stats).apply(img.clone()).unwrap();
        assert_eq!(vit.shape(), [3, 224, 224]);

        let custom = AugmentationPreset::Custom.build(stats).apply(img).unwrap();
        assert_eq!(custom.shape(), [3, 384, 384]);
        assert!(custom.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_preset_parse() {
        for preset in AugmentationPreset::ALL {
            let parsed: AugmentationPreset = preset.to_string().parse().unwrap();
            assert_eq!(parsed, preset);
        }
        assert!("random".parse::<AugmentationPreset>().is_err());
    }

    #[test]
    fn test_closure_transform() {
        let transform = |image: DynamicImage| -> Result<ImageTensor> {
            Ok(ImageTensor::from_image(&image.grayscale()))
        };
        let tensor = transform
            .apply(DynamicImage::ImageRgb8(gradient(3, 3)))
            .unwrap();
        assert_eq!(tensor.shape(), [3, 3, 3]);
    }
}
