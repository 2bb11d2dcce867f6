//! Indexed dataset view over a scanned corpus.
//!
//! [`MaskDataset`] owns the samples, their split assignment, the label
//! projection and the active transform. [`Subset`]s restrict it to one phase.
//! A subset holds the dataset through a shared reference (or an `Arc`), so
//! [`MaskDataset::set_transform`] cannot run while any subset is alive.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataset::Dataset;
use mask_core::{
    AgeBracket, ChannelStatistics, DatasetConfig, DecodedLabel, Error, Gender, LabelProjection,
    MaskState, Phase, Result, SampleFilter, SplitConfig, SplitPolicy,
};
use tracing::{info, warn};

use crate::loader::ImageLoader;
use crate::scanner::{CorpusScanner, FileSelector, Sample};
use crate::split::{SplitAssignment, SplitStats, SubjectPlan};
use crate::statistics::{compute_channel_statistics, DatasetStats};
use crate::transform::{AugmentationPreset, ImageTensor, Transform};

/// A transformed image paired with its encoded label
#[derive(Debug, Clone)]
pub struct MaskItem {
    pub image: ImageTensor,
    pub label: usize,
    pub path: PathBuf,
}

/// Labeled face-mask dataset
pub struct MaskDataset {
    samples: Vec<Sample>,
    assignment: SplitAssignment,
    projection: LabelProjection,
    statistics: Option<ChannelStatistics>,
    transform: Option<Arc<dyn Transform>>,
    loader: ImageLoader,
}

impl std::fmt::Debug for MaskDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskDataset")
            .field("root_dir", &self.loader.root_dir())
            .field("samples", &self.samples.len())
            .field("policy", &self.assignment.policy())
            .field("projection", &self.projection)
            .field("statistics", &self.statistics)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

impl MaskDataset {
    pub fn builder(data_dir: impl Into<PathBuf>) -> MaskDatasetBuilder {
        MaskDatasetBuilder::new(data_dir)
    }

    /// Total number of samples across all phases
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Loads, transforms and labels the sample at `index`
    pub fn get(&self, index: usize) -> Result<MaskItem> {
        let transform = self.transform.as_ref().ok_or(Error::TransformNotSet)?;
        let sample = self.sample(index)?;

        let image = self.loader.load_pixels(&sample.image_path)?;
        let image = transform.apply(image)?;

        Ok(MaskItem {
            image,
            label: self.projection.encode(&sample.attributes()),
            path: sample.image_path.clone(),
        })
    }

    /// Replaces the active transform for every subsequent fetch
    pub fn set_transform(&mut self, transform: Arc<dyn Transform>) {
        self.transform = Some(transform);
    }

    /// Binds a preset pipeline built from this dataset's statistics
    pub fn set_preset(&mut self, preset: AugmentationPreset) {
        let statistics = self.statistics.unwrap_or_default();
        self.set_transform(Arc::new(preset.build(statistics)));
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// One subset per phase of the assignment, `Train` first
    pub fn split(&self) -> Vec<Subset<&Self>> {
        self.assignment
            .phases()
            .map(|phase| Subset::new(self, phase))
            .collect()
    }

    /// Like [`split`](Self::split), for datasets shared across threads
    pub fn split_shared(self: &Arc<Self>) -> Vec<Subset<Arc<Self>>> {
        self.assignment
            .phases()
            .map(|phase| Subset::new(Arc::clone(self), phase))
            .collect()
    }

    pub fn subset(&self, phase: Phase) -> Subset<&Self> {
        Subset::new(self, phase)
    }

    pub fn train_subset(&self) -> Subset<&Self> {
        self.subset(Phase::Train)
    }

    pub fn val_subset(&self) -> Subset<&Self> {
        self.subset(Phase::Val)
    }

    /// Estimates channel statistics from the first `sample_cap` images when
    /// none are set. Returns the statistics in effect.
    pub fn compute_statistics(&mut self, sample_cap: usize) -> Result<ChannelStatistics> {
        if let Some(statistics) = self.statistics {
            return Ok(statistics);
        }

        warn!("No channel statistics supplied, estimating from the corpus");
        let statistics = compute_channel_statistics(&self.loader, &self.samples, sample_cap)?;
        self.statistics = Some(statistics);
        Ok(statistics)
    }

    pub fn statistics(&self) -> Option<ChannelStatistics> {
        self.statistics
    }

    pub fn projection(&self) -> LabelProjection {
        self.projection
    }

    pub fn num_classes(&self) -> usize {
        self.projection.num_classes()
    }

    pub fn decode(&self, label: usize) -> Result<DecodedLabel> {
        self.projection.decode(label)
    }

    pub fn sample(&self, index: usize) -> Result<&Sample> {
        self.samples.get(index).ok_or(Error::IndexOutOfBounds {
            index,
            len: self.samples.len(),
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Encoded label of a sample without loading its image
    pub fn label(&self, index: usize) -> Result<usize> {
        Ok(self.projection.encode(&self.sample(index)?.attributes()))
    }

    pub fn mask_state(&self, index: usize) -> Result<MaskState> {
        Ok(self.sample(index)?.mask_state)
    }

    pub fn gender(&self, index: usize) -> Result<Gender> {
        Ok(self.sample(index)?.gender)
    }

    pub fn age_bracket(&self, index: usize) -> Result<AgeBracket> {
        Ok(self.sample(index)?.age_bracket)
    }

    pub fn assignment(&self) -> &SplitAssignment {
        &self.assignment
    }

    pub fn split_stats(&self) -> SplitStats {
        self.assignment.stats(&self.samples)
    }

    pub fn class_stats(&self) -> DatasetStats {
        DatasetStats::from_samples(&self.samples, self.projection)
    }

    pub fn root_dir(&self) -> &Path {
        self.loader.root_dir()
    }
}

impl Dataset<MaskItem> for MaskDataset {
    fn get(&self, index: usize) -> Option<MaskItem> {
        MaskDataset::get(self, index)
            .map_err(|e| warn!("Failed to load sample {}: {}", index, e))
            .ok()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// The samples of one phase, addressed by position within the phase
#[derive(Debug, Clone)]
pub struct Subset<D> {
    dataset: D,
    phase: Phase,
    indices: Vec<usize>,
}

impl<D> Subset<D>
where
    D: Deref<Target = MaskDataset>,
{
    fn new(dataset: D, phase: Phase) -> Self {
        let indices = dataset.assignment.indices(phase).to_vec();
        Self {
            dataset,
            phase,
            indices,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Positions in the parent dataset, in phase order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn dataset(&self) -> &MaskDataset {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Parent dataset index of the `position`-th element
    pub fn dataset_index(&self, position: usize) -> Result<usize> {
        self.indices
            .get(position)
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                index: position,
                len: self.indices.len(),
            })
    }

    pub fn get(&self, position: usize) -> Result<MaskItem> {
        self.dataset.get(self.dataset_index(position)?)
    }

    pub fn label(&self, position: usize) -> Result<usize> {
        self.dataset.label(self.dataset_index(position)?)
    }

    pub fn class_stats(&self) -> DatasetStats {
        DatasetStats::from_samples(
            self.indices.iter().map(|&i| &self.dataset.samples[i]),
            self.dataset.projection,
        )
    }
}

impl<D> Dataset<MaskItem> for Subset<D>
where
    D: Deref<Target = MaskDataset> + Send + Sync,
{
    fn get(&self, index: usize) -> Option<MaskItem> {
        Subset::get(self, index)
            .map_err(|e| warn!("Failed to load {} sample {}: {}", self.phase, index, e))
            .ok()
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Builder for [`MaskDataset`]
#[derive(Clone, Default)]
pub struct MaskDatasetBuilder {
    config: DatasetConfig,
    transform: Option<Arc<dyn Transform>>,
}

impl MaskDatasetBuilder {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(DatasetConfig::new(data_dir))
    }

    pub fn from_config(config: DatasetConfig) -> Self {
        Self {
            config,
            transform: None,
        }
    }

    pub fn projection(mut self, projection: LabelProjection) -> Self {
        self.config.projection = projection;
        self
    }

    pub fn filter(mut self, filter: SampleFilter) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn split(mut self, split: SplitConfig) -> Self {
        self.config.split = split;
        self
    }

    /// Normalization statistics; `None` estimates them from the corpus
    pub fn statistics(mut self, statistics: Option<ChannelStatistics>) -> Self {
        self.config.statistics = statistics.into();
        self
    }

    pub fn stats_sample_cap(mut self, cap: usize) -> Self {
        self.config.stats_sample_cap = cap;
        self
    }

    pub fn sorted_listing(mut self, sorted: bool) -> Self {
        self.config.sorted_listing = sorted;
        self
    }

    pub fn transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Scans the corpus, assigns phases and settles statistics.
    pub fn build(self) -> Result<MaskDataset> {
        let config = self.config;
        config.validate()?;

        let scanner = CorpusScanner::new(&config.data_dir).sorted(config.sorted_listing);
        let (samples, assignment) = match config.split.policy {
            SplitPolicy::SubjectDisjoint => scan_by_subject(&scanner, &config)?,
            SplitPolicy::RandomSample => {
                let samples = scanner.scan(&config.filter)?;
                let assignment = SplitAssignment::random_sample(samples.len(), config.split)?;
                (samples, assignment)
            }
            SplitPolicy::None => {
                let samples = scanner.scan(&config.filter)?;
                let assignment = SplitAssignment::unsplit(samples.len(), config.split);
                (samples, assignment)
            }
        };

        for phase in assignment.phases() {
            info!("{} phase: {} samples", phase, assignment.indices(phase).len());
        }

        let mut dataset = MaskDataset {
            samples,
            assignment,
            projection: config.projection,
            statistics: config.statistics.fixed(),
            transform: self.transform,
            loader: ImageLoader::new(&config.data_dir),
        };

        if dataset.statistics.is_none() {
            if dataset.is_empty() {
                warn!("Corpus is empty, channel statistics left unset");
            } else {
                dataset.compute_statistics(config.stats_sample_cap)?;
            }
        }

        Ok(dataset)
    }
}

/// Draws subjects first, then enumerates train subjects followed by val
/// subjects so each phase owns a contiguous index range.
fn scan_by_subject(
    scanner: &CorpusScanner,
    config: &DatasetConfig,
) -> Result<(Vec<Sample>, SplitAssignment)> {
    let subjects = scanner.list_subjects()?;
    let plan = SubjectPlan::draw(subjects.len(), &config.split)?;
    info!(
        "Subject split: {} train / {} val subjects",
        plan.train.len(),
        plan.val.len()
    );

    let mut selector = FileSelector::new(&config.filter)?;
    let mut samples = Vec::new();
    let mut phases: BTreeMap<Phase, Vec<usize>> = BTreeMap::new();
    phases.insert(Phase::Train, Vec::new());
    phases.insert(Phase::Val, Vec::new());

    for (phase, subject_index) in plan.ordered() {
        let scanned = scanner.scan_subject(&subjects[subject_index], &mut selector)?;
        let start = samples.len();
        samples.extend(scanned);
        phases
            .entry(phase)
            .or_default()
            .extend(start..samples.len());
    }

    let assignment = SplitAssignment::from_phases(config.split, phases)?;
    Ok((samples, assignment))
}
