//! Configuration structures for building a face-mask dataset.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::encoding::LabelProjection;
use crate::error::{Error, Result};
use crate::taxonomy::MaskState;

/// Default fraction of the corpus held out for validation
pub const DEFAULT_VAL_RATIO: f64 = 0.2;

/// Default seed for every random decision
pub const DEFAULT_SEED: u64 = 42;

/// Default number of images streamed when estimating channel statistics
pub const DEFAULT_STATS_SAMPLE_CAP: usize = 3000;

/// Per-channel normalization statistics in `[0, 1]` pixel scale
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChannelStatistics {
    /// Means [R, G, B]
    pub mean: [f32; 3],
    /// Standard deviations [R, G, B]
    pub std: [f32; 3],
}

impl ChannelStatistics {
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { mean, std }
    }

    /// Rejects zero or negative standard deviations, which would make
    /// normalization divide by zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(c) = self.std.iter().position(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(Error::Config(format!(
                "Channel {} std must be positive, got {}",
                c, self.std[c]
            )));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(Error::Config("Channel means must be finite".to_string()));
        }
        Ok(())
    }
}

impl Default for ChannelStatistics {
    /// Statistics measured on the face-mask training corpus
    fn default() -> Self {
        Self {
            mean: [0.548, 0.504, 0.479],
            std: [0.237, 0.247, 0.246],
        }
    }
}

/// Where normalization statistics come from
///
/// In TOML this is a table tagged by `kind`:
///
/// ```toml
/// [statistics]
/// kind = "fixed"
/// mean = [0.5, 0.5, 0.5]
/// std = [0.25, 0.25, 0.25]
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatisticsSource {
    /// The statistics measured on the face-mask training corpus
    #[default]
    Default,
    /// Caller-supplied statistics
    Fixed(ChannelStatistics),
    /// Estimated from the scanned corpus at build time
    Estimate,
}

impl StatisticsSource {
    /// Statistics known without reading any image; `None` for [`StatisticsSource::Estimate`]
    pub fn fixed(&self) -> Option<ChannelStatistics> {
        match self {
            StatisticsSource::Default => Some(ChannelStatistics::default()),
            StatisticsSource::Fixed(stats) => Some(*stats),
            StatisticsSource::Estimate => None,
        }
    }
}

impl From<Option<ChannelStatistics>> for StatisticsSource {
    fn from(statistics: Option<ChannelStatistics>) -> Self {
        match statistics {
            Some(stats) => StatisticsSource::Fixed(stats),
            None => StatisticsSource::Estimate,
        }
    }
}

/// Which scanned files qualify for a dataset variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleFilter {
    /// Every recognized mask stem
    #[default]
    All,
    /// Only stems starting with `prefix` (`mask`, `incorrect_mask`, `normal`)
    LabelPrefix { prefix: String },
    /// Each recognized file kept independently with probability `ratio`
    Ratio { ratio: f64, seed: u64 },
    /// Prefix restriction followed by per-file sampling
    PrefixRatio { prefix: String, ratio: f64, seed: u64 },
}

impl SampleFilter {
    pub fn validate(&self) -> Result<()> {
        if let Some(prefix) = self.prefix() {
            MaskState::from_label_prefix(prefix)?;
        }
        if let Some(ratio) = self.ratio() {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::Config(format!(
                    "Data ratio must be between 0.0 and 1.0, got {}",
                    ratio
                )));
            }
        }
        Ok(())
    }

    pub fn prefix(&self) -> Option<&str> {
        match self {
            SampleFilter::LabelPrefix { prefix } | SampleFilter::PrefixRatio { prefix, .. } => {
                Some(prefix)
            }
            _ => None,
        }
    }

    pub fn ratio(&self) -> Option<f64> {
        match self {
            SampleFilter::Ratio { ratio, .. } | SampleFilter::PrefixRatio { ratio, .. } => {
                Some(*ratio)
            }
            _ => None,
        }
    }
}

/// How samples are assigned to train and validation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Uniform split over individual images; a subject may land on both sides
    #[default]
    RandomSample,
    /// Split over subjects first; no subject lands on both sides
    SubjectDisjoint,
    /// No split; every sample belongs to the evaluation phase
    None,
}

impl std::fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitPolicy::RandomSample => write!(f, "random_sample"),
            SplitPolicy::SubjectDisjoint => write!(f, "subject_disjoint"),
            SplitPolicy::None => write!(f, "none"),
        }
    }
}

/// How validation subjects are drawn under [`SplitPolicy::SubjectDisjoint`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubjectDraw {
    /// Exactly `floor(subjects * val_ratio)` distinct subjects
    #[default]
    Exact,
    /// `floor(subjects * val_ratio)` draws with replacement, deduplicated.
    /// The realized validation share can fall below the nominal ratio.
    WithReplacement,
}

/// Configuration for train/validation splitting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplitConfig {
    /// Splitting policy
    pub policy: SplitPolicy,
    /// Fraction of samples (or subjects) held out for validation
    pub val_ratio: f64,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Subject drawing mode for the subject-disjoint policy
    pub subject_draw: SubjectDraw,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            policy: SplitPolicy::default(),
            val_ratio: DEFAULT_VAL_RATIO,
            seed: DEFAULT_SEED,
            subject_draw: SubjectDraw::default(),
        }
    }
}

impl SplitConfig {
    pub fn new(policy: SplitPolicy, val_ratio: f64, seed: u64) -> Result<Self> {
        let config = Self {
            policy,
            val_ratio,
            seed,
            subject_draw: SubjectDraw::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_subject_draw(mut self, draw: SubjectDraw) -> Self {
        self.subject_draw = draw;
        self
    }

    /// Validates that the ratio lies strictly between 0 and 1
    pub fn validate(&self) -> Result<()> {
        if self.policy == SplitPolicy::None {
            return Ok(());
        }
        if !(self.val_ratio > 0.0 && self.val_ratio < 1.0) {
            return Err(Error::Config(format!(
                "Validation ratio must be strictly between 0.0 and 1.0, got {}",
                self.val_ratio
            )));
        }
        Ok(())
    }

    /// Number of held-out items out of `total`: `floor(total * val_ratio)`
    pub fn val_count(&self, total: usize) -> usize {
        ((total as f64 * self.val_ratio).floor() as usize).min(total)
    }
}

/// Everything needed to construct a dataset view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Root directory of per-subject folders
    pub data_dir: PathBuf,
    /// Label projection
    #[serde(default)]
    pub projection: LabelProjection,
    /// Images streamed when estimating statistics
    #[serde(default = "default_stats_sample_cap")]
    pub stats_sample_cap: usize,
    /// Sort directory listings by name instead of using platform order
    #[serde(default)]
    pub sorted_listing: bool,
    /// Sample-filter predicate
    #[serde(default)]
    pub filter: SampleFilter,
    /// Split configuration
    #[serde(default)]
    pub split: SplitConfig,
    /// Source of the normalization statistics
    #[serde(default)]
    pub statistics: StatisticsSource,
}

fn default_stats_sample_cap() -> usize {
    DEFAULT_STATS_SAMPLE_CAP
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/train/images"),
            projection: LabelProjection::default(),
            stats_sample_cap: DEFAULT_STATS_SAMPLE_CAP,
            sorted_listing: false,
            filter: SampleFilter::default(),
            split: SplitConfig::default(),
            statistics: StatisticsSource::default(),
        }
    }
}

impl DatasetConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;
        self.filter.validate()?;
        match &self.statistics {
            StatisticsSource::Default => {}
            StatisticsSource::Fixed(stats) => stats.validate()?,
            StatisticsSource::Estimate if self.stats_sample_cap == 0 => {
                return Err(Error::Config(
                    "stats_sample_cap must be positive when statistics are estimated".to_string(),
                ))
            }
            StatisticsSource::Estimate => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dataset_config() {
        let config = DatasetConfig::default();
        assert_eq!(config.projection, LabelProjection::Full);
        assert_eq!(config.split.val_ratio, 0.2);
        assert_eq!(config.split.seed, 42);
        assert_eq!(config.split.policy, SplitPolicy::RandomSample);
        assert_eq!(config.statistics, StatisticsSource::Default);
        assert_eq!(config.statistics.fixed(), Some(ChannelStatistics::default()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_split_ratio_validation() {
        assert!(SplitConfig::new(SplitPolicy::RandomSample, 0.2, 1).is_ok());
        assert!(SplitConfig::new(SplitPolicy::RandomSample, 0.0, 1).is_err());
        assert!(SplitConfig::new(SplitPolicy::SubjectDisjoint, 1.0, 1).is_err());
        assert!(SplitConfig::new(SplitPolicy::SubjectDisjoint, f64::NAN, 1).is_err());
        // Ratio is irrelevant without a split
        assert!(SplitConfig::new(SplitPolicy::None, 0.0, 1).is_ok());
    }

    #[test]
    fn test_val_count_floors() {
        let config = SplitConfig::new(SplitPolicy::RandomSample, 0.2, 1).unwrap();
        assert_eq!(config.val_count(100), 20);
        assert_eq!(config.val_count(7), 1);
        assert_eq!(config.val_count(4), 0);
        assert_eq!(config.val_count(0), 0);
    }

    #[test]
    fn test_filter_validation() {
        assert!(SampleFilter::All.validate().is_ok());
        assert!(SampleFilter::LabelPrefix { prefix: "normal".into() }.validate().is_ok());
        assert!(SampleFilter::LabelPrefix { prefix: "hat".into() }.validate().is_err());
        assert!(SampleFilter::Ratio { ratio: 1.5, seed: 0 }.validate().is_err());
        assert!(SampleFilter::PrefixRatio {
            prefix: "mask".into(),
            ratio: 0.5,
            seed: 0
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_statistics_validation() {
        assert!(ChannelStatistics::default().validate().is_ok());
        let bad = ChannelStatistics::new([0.5; 3], [0.2, 0.0, 0.2]);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_missing_statistics_need_a_cap() {
        let mut config = DatasetConfig::new("data");
        config.statistics = StatisticsSource::Estimate;
        config.stats_sample_cap = 0;
        assert!(config.validate().is_err());
        config.stats_sample_cap = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = DatasetConfig::new("/data/faces");
        config.projection = LabelProjection::GenderAge;
        config.filter = SampleFilter::LabelPrefix { prefix: "mask".into() };
        config.split.subject_draw = SubjectDraw::WithReplacement;

        let text = toml::to_string(&config).unwrap();
        let parsed: DatasetConfig = toml::from_str(&text).unwrap();

        assert_eq!(parsed.data_dir, PathBuf::from("/data/faces"));
        assert_eq!(parsed.projection, LabelProjection::GenderAge);
        assert_eq!(parsed.filter, config.filter);
        assert_eq!(parsed.split, config.split);
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let parsed: DatasetConfig = toml::from_str(r#"data_dir = "faces""#).unwrap();
        assert_eq!(parsed.projection, LabelProjection::Full);
        assert_eq!(parsed.filter, SampleFilter::All);
        assert_eq!(parsed.split.policy, SplitPolicy::RandomSample);
        assert_eq!(parsed.stats_sample_cap, DEFAULT_STATS_SAMPLE_CAP);
        assert_eq!(parsed.statistics, StatisticsSource::Default);
    }

    #[test]
    fn test_estimate_statistics_survive_toml() {
        let mut config = DatasetConfig::new("/data/faces");
        config.statistics = StatisticsSource::Estimate;

        let text = toml::to_string(&config).unwrap();
        let parsed: DatasetConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.statistics, StatisticsSource::Estimate);
        assert_eq!(parsed.statistics.fixed(), None);

        let written: DatasetConfig = toml::from_str(
            r#"
            data_dir = "faces"

            [statistics]
            kind = "estimate"
            "#,
        )
        .unwrap();
        assert_eq!(written.statistics, StatisticsSource::Estimate);
    }

    #[test]
    fn test_fixed_statistics_from_toml() {
        let parsed: DatasetConfig = toml::from_str(
            r#"
            data_dir = "faces"

            [statistics]
            kind = "fixed"
            mean = [0.5, 0.5, 0.5]
            std = [0.25, 0.25, 0.25]
            "#,
        )
        .unwrap();
        let expected = ChannelStatistics::new([0.5; 3], [0.25; 3]);
        assert_eq!(parsed.statistics, StatisticsSource::Fixed(expected));
        assert!(parsed.validate().is_ok());

        let mut config = parsed.clone();
        config.statistics = StatisticsSource::Fixed(ChannelStatistics::new([0.5; 3], [0.0; 3]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_subject_disjoint_is_opt_in() {
        let parsed: DatasetConfig = toml::from_str(
            r#"
            data_dir = "faces"

            [split]
            policy = "subject_disjoint"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.split.policy, SplitPolicy::SubjectDisjoint);
        assert_eq!(parsed.split.val_ratio, DEFAULT_VAL_RATIO);
        assert_eq!(SplitConfig::default().policy, SplitPolicy::RandomSample);
    }
}
