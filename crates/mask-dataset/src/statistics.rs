//! Channel statistics estimation and class distribution summaries.

use std::collections::HashSet;
use std::path::Path;

use mask_core::{
    AgeBracket, ChannelStatistics, Error, Gender, LabelProjection, MaskState, Result,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::loader::ImageLoader;
use crate::scanner::Sample;

/// Per-image channel means of pixel values and of their squares, in `[0, 255]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMoments {
    pub mean: [f64; 3],
    pub mean_sq: [f64; 3],
}

impl ChannelMoments {
    pub fn from_image(image: &image::RgbImage) -> Self {
        let count = (image.width() as f64 * image.height() as f64).max(1.0);
        let mut sum = [0.0f64; 3];
        let mut sum_sq = [0.0f64; 3];

        for pixel in image.pixels() {
            for c in 0..3 {
                let v = pixel[c] as f64;
                sum[c] += v;
                sum_sq[c] += v * v;
            }
        }

        Self {
            mean: sum.map(|s| s / count),
            mean_sq: sum_sq.map(|s| s / count),
        }
    }
}

/// Averages per-image moments into `[0, 1]` scale statistics.
///
/// `mean = E[m] / 255` and `std = sqrt(E[x^2] - E[m]^2) / 255`, with the
/// variance clamped at zero.
pub fn reduce_moments(moments: &[ChannelMoments]) -> Result<ChannelStatistics> {
    if moments.is_empty() {
        return Err(Error::InvalidArgument(
            "Cannot estimate channel statistics without images".to_string(),
        ));
    }

    let n = moments.len() as f64;
    let mut mean = [0.0f32; 3];
    let mut std = [0.0f32; 3];

    for c in 0..3 {
        let m = moments.iter().map(|x| x.mean[c]).sum::<f64>() / n;
        let sq = moments.iter().map(|x| x.mean_sq[c]).sum::<f64>() / n;
        mean[c] = (m / 255.0) as f32;
        std[c] = ((sq - m * m).max(0.0).sqrt() / 255.0) as f32;
    }

    Ok(ChannelStatistics::new(mean, std))
}

/// Estimates channel statistics from the first `sample_cap` samples
pub fn compute_channel_statistics(
    loader: &ImageLoader,
    samples: &[Sample],
    sample_cap: usize,
) -> Result<ChannelStatistics> {
    compute_channel_statistics_with_progress(loader, samples, sample_cap, |_| {})
}

/// Like [`compute_channel_statistics`], calling `on_image` once per decoded
/// image. Images are decoded in parallel; the reduction runs in sample order.
pub fn compute_channel_statistics_with_progress<F>(
    loader: &ImageLoader,
    samples: &[Sample],
    sample_cap: usize,
    on_image: F,
) -> Result<ChannelStatistics>
where
    F: Fn(&Path) + Sync,
{
    let selected = &samples[..sample_cap.min(samples.len())];
    info!(
        "Estimating channel statistics over {} of {} images",
        selected.len(),
        samples.len()
    );

    let moments = selected
        .par_iter()
        .map(|sample| -> Result<ChannelMoments> {
            let image = loader.load_pixels(&sample.image_path)?;
            let moments = ChannelMoments::from_image(&image.to_rgb8());
            on_image(&sample.image_path);
            Ok(moments)
        })
        .collect::<Result<Vec<_>>>()?;

    let statistics = reduce_moments(&moments)?;
    debug!(
        "Channel statistics: mean {:?}, std {:?}",
        statistics.mean, statistics.std
    );
    Ok(statistics)
}

/// Class distribution of a sample set under one projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub projection: LabelProjection,
    pub total_samples: usize,
    pub num_subjects: usize,
    /// Counts per encoded class id
    pub class_counts: Vec<usize>,
    /// Counts per attribute value, indexed by the attribute's own index
    pub mask_counts: [usize; 3],
    pub gender_counts: [usize; 2],
    pub age_counts: [usize; 3],
}

impl DatasetStats {
    pub fn from_samples<'a>(
        samples: impl IntoIterator<Item = &'a Sample>,
        projection: LabelProjection,
    ) -> Self {
        let mut stats = Self {
            projection,
            total_samples: 0,
            num_subjects: 0,
            class_counts: vec![0; projection.num_classes()],
            mask_counts: [0; 3],
            gender_counts: [0; 2],
            age_counts: [0; 3],
        };
        let mut subjects = HashSet::new();

        for sample in samples {
            stats.total_samples += 1;
            stats.class_counts[projection.encode(&sample.attributes())] += 1;
            stats.mask_counts[sample.mask_state.index()] += 1;
            stats.gender_counts[sample.gender.index()] += 1;
            stats.age_counts[sample.age_bracket.index()] += 1;
            subjects.insert(sample.subject_id.as_str());
        }
        stats.num_subjects = subjects.len();
        stats
    }

    /// Print statistics to console
    pub fn print(&self) {
        print!("{}", self);
    }
}

impl std::fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Dataset Statistics ({} projection):", self.projection)?;
        writeln!(f, "  Total samples: {}", self.total_samples)?;
        writeln!(f, "  Subjects: {}", self.num_subjects)?;

        let share = |count: usize| {
            if self.total_samples == 0 {
                0.0
            } else {
                100.0 * count as f64 / self.total_samples as f64
            }
        };

        writeln!(f, "  Mask state:")?;
        for state in MaskState::ALL {
            let count = self.mask_counts[state.index()];
            writeln!(f, "    {:10} {:6} ({:.1}%)", state.to_string(), count, share(count))?;
        }
        writeln!(f, "  Gender:")?;
        for gender in Gender::ALL {
            let count = self.gender_counts[gender.index()];
            writeln!(f, "    {:10} {:6} ({:.1}%)", gender.to_string(), count, share(count))?;
        }
        writeln!(f, "  Age:")?;
        for age in AgeBracket::ALL {
            let count = self.age_counts[age.index()];
            writeln!(f, "    {:10} {:6} ({:.1}%)", age.to_string(), count, share(count))?;
        }

        writeln!(f, "  Samples per class:")?;
        for (label, count) in self.class_counts.iter().enumerate() {
            let name = self
                .projection
                .decode(label)
                .map(|d| d.to_string())
                .unwrap_or_default();
            let bar = "#".repeat((share(*count) / 100.0 * 40.0) as usize);
            writeln!(f, "    {:3}. {:45} {:6} {}", label, name, count, bar)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn sample(path: &str, subject: &str, mask: MaskState, gender: Gender, age: AgeBracket) -> Sample {
        Sample {
            image_path: PathBuf::from(path),
            subject_id: subject.to_string(),
            race: "asian".to_string(),
            mask_state: mask,
            gender,
            age_bracket: age,
        }
    }

    #[test]
    fn test_moments_of_solid_image() {
        let img = RgbImage::from_pixel(4, 4, Rgb([51, 102, 255]));
        let moments = ChannelMoments::from_image(&img);
        assert_eq!(moments.mean, [51.0, 102.0, 255.0]);
        assert_eq!(moments.mean_sq, [2601.0, 10404.0, 65025.0]);
    }

    #[test]
    fn test_reduce_empty() {
        assert!(matches!(reduce_moments(&[]), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_reduce_two_solid_images() {
        let black = ChannelMoments::from_image(&RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])));
        let white = ChannelMoments::from_image(&RgbImage::from_pixel(2, 2, Rgb([255, 255, 255])));
        let stats = reduce_moments(&[black, white]).unwrap();
        for c in 0..3 {
            assert!((stats.mean[c] - 0.5).abs() < 1e-6);
            assert!((stats.std[c] - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_compute_over_solid_images() {
        let dir = TempDir::new().unwrap();
        let mut samples = Vec::new();
        for i in 0..4 {
            let name = format!("img{}.png", i);
            RgbImage::from_pixel(6, 6, Rgb([51, 102, 204]))
                .save(dir.path().join(&name))
                .unwrap();
            samples.push(sample(&name, "s", MaskState::Mask, Gender::Male, AgeBracket::Young));
        }

        let loader = ImageLoader::new(dir.path());
        let seen = AtomicUsize::new(0);
        let stats = compute_channel_statistics_with_progress(&loader, &samples, 3, |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        assert_eq!(seen.load(Ordering::Relaxed), 3);
        assert!((stats.mean[0] - 0.2).abs() < 1e-6);
        assert!((stats.mean[1] - 0.4).abs() < 1e-6);
        assert!((stats.mean[2] - 0.8).abs() < 1e-6);
        assert!(stats.std.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_compute_propagates_missing_image() {
        let dir = TempDir::new().unwrap();
        let samples = vec![sample("gone.png", "s", MaskState::Mask, Gender::Male, AgeBracket::Young)];
        let result = compute_channel_statistics(&ImageLoader::new(dir.path()), &samples, 10);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_dataset_stats() {
        let samples = vec![
            sample("a/mask1.jpg", "a", MaskState::Mask, Gender::Male, AgeBracket::Young),
            sample("a/normal.jpg", "a", MaskState::Normal, Gender::Male, AgeBracket::Young),
            sample("b/incorrect_mask.jpg", "b", MaskState::Incorrect, Gender::Female, AgeBracket::Old),
        ];

        let stats = DatasetStats::from_samples(&samples, LabelProjection::Full);
        assert_eq!(stats.total_samples, 3);
        assert_eq!(stats.num_subjects, 2);
        assert_eq!(stats.class_counts.len(), 18);
        assert_eq!(stats.class_counts[0], 1);
        assert_eq!(stats.class_counts[12], 1);
        assert_eq!(stats.class_counts[6 + 3 + 2], 1);
        assert_eq!(stats.mask_counts, [1, 1, 1]);
        assert_eq!(stats.gender_counts, [2, 1]);
        assert_eq!(stats.age_counts, [2, 0, 1]);

        let masks = DatasetStats::from_samples(&samples, LabelProjection::MaskOnly);
        assert_eq!(masks.class_counts, vec![1, 1, 1]);
        assert!(masks.to_string().contains("Total samples: 3"));
    }
}
