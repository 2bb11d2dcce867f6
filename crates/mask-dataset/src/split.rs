//! Train/validation split policies.
//!
//! ## Random-sample split
//!
//! Operates on the flat sample list: `floor(len * val_ratio)` indices go to
//! validation, the rest to training. A subject's photos may land on both
//! sides.
//!
//! ## Subject-disjoint split
//!
//! Operates on subject directories before their files are enumerated:
//! `floor(subjects * val_ratio)` subjects are drawn for validation and all
//! their images follow them. No subject appears on both sides.
//!
//! Every random decision takes an explicit seed.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use mask_core::{Error, Phase, Result, SplitConfig, SplitPolicy, SubjectDraw};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::scanner::Sample;

/// Sample indices per phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitAssignment {
    /// Configuration used to create the assignment; its policy is the
    /// policy that produced it
    pub config: SplitConfig,
    /// Ordered sample indices per phase
    pub phases: BTreeMap<Phase, Vec<usize>>,
    /// Total number of samples covered
    pub total: usize,
}

impl SplitAssignment {
    /// Every sample in a single evaluation phase. The recorded policy is
    /// always [`SplitPolicy::None`].
    pub fn unsplit(total: usize, config: SplitConfig) -> Self {
        let mut phases = BTreeMap::new();
        phases.insert(Phase::Eval, (0..total).collect());

        Self {
            config: SplitConfig {
                policy: SplitPolicy::None,
                ..config
            },
            phases,
            total,
        }
    }

    /// Uniform random partition of `0..total` into exactly
    /// `total - floor(total * val_ratio)` train and `floor(total * val_ratio)`
    /// val indices.
    pub fn random_sample(total: usize, config: SplitConfig) -> Result<Self> {
        config.validate()?;

        let n_val = config.val_count(total);
        let n_train = total - n_val;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut permutation: Vec<usize> = (0..total).collect();
        permutation.shuffle(&mut rng);

        let mut train = permutation[..n_train].to_vec();
        let mut val = permutation[n_train..].to_vec();
        train.sort_unstable();
        val.sort_unstable();

        let mut phases = BTreeMap::new();
        phases.insert(Phase::Train, train);
        phases.insert(Phase::Val, val);

        Ok(Self {
            config: SplitConfig {
                policy: SplitPolicy::RandomSample,
                ..config
            },
            phases,
            total,
        })
    }

    /// Builds an assignment from per-phase index lists that were recorded
    /// while samples were scanned under `config.policy`.
    pub fn from_phases(config: SplitConfig, phases: BTreeMap<Phase, Vec<usize>>) -> Result<Self> {
        let total = phases.values().map(Vec::len).sum();
        let assignment = Self {
            config,
            phases,
            total,
        };
        assignment.check_partition()?;
        Ok(assignment)
    }

    /// Policy that produced the assignment
    pub fn policy(&self) -> SplitPolicy {
        self.config.policy
    }

    /// Indices of one phase; empty when the phase is absent
    pub fn indices(&self, phase: Phase) -> &[usize] {
        self.phases.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn train(&self) -> &[usize] {
        self.indices(Phase::Train)
    }

    pub fn val(&self) -> &[usize] {
        self.indices(Phase::Val)
    }

    /// Phases present, in `Train`, `Val`, `Eval` order
    pub fn phases(&self) -> impl Iterator<Item = Phase> + '_ {
        self.phases.keys().copied()
    }

    /// Phase of a sample index
    pub fn phase_of(&self, index: usize) -> Option<Phase> {
        self.phases
            .iter()
            .find(|(_, indices)| indices.contains(&index))
            .map(|(phase, _)| *phase)
    }

    /// Checks that the phases are disjoint and together cover `0..total`
    /// exactly once.
    pub fn check_partition(&self) -> Result<()> {
        let mut seen = vec![false; self.total];
        for (phase, indices) in &self.phases {
            for &index in indices {
                match seen.get_mut(index) {
                    Some(slot) if !*slot => *slot = true,
                    Some(_) => {
                        return Err(Error::InvalidArgument(format!(
                            "Sample {} assigned twice (last in phase {})",
                            index, phase
                        )))
                    }
                    None => {
                        return Err(Error::IndexOutOfBounds {
                            index,
                            len: self.total,
                        })
                    }
                }
            }
        }

        if let Some(missing) = seen.iter().position(|covered| !covered) {
            return Err(Error::InvalidArgument(format!(
                "Sample {} of {} is not assigned to any phase",
                missing, self.total
            )));
        }
        Ok(())
    }

    /// Statistics about the split over the given samples
    pub fn stats(&self, samples: &[Sample]) -> SplitStats {
        let mut phase_subjects: HashMap<&str, HashSet<Phase>> = HashMap::new();
        let mut phases = Vec::new();

        for (phase, indices) in &self.phases {
            let mut subjects = HashSet::new();
            for sample in indices.iter().filter_map(|&i| samples.get(i)) {
                subjects.insert(sample.subject_id.as_str());
                phase_subjects
                    .entry(sample.subject_id.as_str())
                    .or_default()
                    .insert(*phase);
            }
            phases.push(PhaseStats {
                phase: *phase,
                samples: indices.len(),
                subjects: subjects.len(),
            });
        }

        SplitStats {
            policy: self.policy(),
            total_samples: self.total,
            total_subjects: phase_subjects.len(),
            leaked_subjects: phase_subjects.values().filter(|p| p.len() > 1).count(),
            phases,
        }
    }

    /// Save the assignment to a JSON file for reproducibility
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load an assignment from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let assignment: Self = serde_json::from_str(&json)?;
        assignment.check_partition()?;
        Ok(assignment)
    }
}

/// Subject indices per phase, before any file is enumerated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPlan {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

impl SubjectPlan {
    /// Draws validation subjects out of `num_subjects`.
    ///
    /// With [`SubjectDraw::WithReplacement`], `floor(num_subjects * val_ratio)`
    /// draws may collide, so the validation side can hold fewer subjects than
    /// nominal. [`SubjectDraw::Exact`] always draws that many distinct ones.
    pub fn draw(num_subjects: usize, config: &SplitConfig) -> Result<Self> {
        config.validate()?;

        let n_val = config.val_count(num_subjects);
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let val: BTreeSet<usize> = match config.subject_draw {
            SubjectDraw::Exact => {
                rand::seq::index::sample(&mut rng, num_subjects, n_val).into_iter().collect()
            }
            SubjectDraw::WithReplacement => {
                (0..n_val).map(|_| rng.gen_range(0..num_subjects)).collect()
            }
        };

        let train = (0..num_subjects).filter(|i| !val.contains(i)).collect();

        Ok(Self {
            train,
            val: val.into_iter().collect(),
        })
    }

    /// Subjects in the order their samples are indexed: every train subject,
    /// then every val subject.
    pub fn ordered(&self) -> impl Iterator<Item = (Phase, usize)> + '_ {
        self.train
            .iter()
            .map(|&s| (Phase::Train, s))
            .chain(self.val.iter().map(|&s| (Phase::Val, s)))
    }
}

/// Per-phase counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseStats {
    pub phase: Phase,
    pub samples: usize,
    pub subjects: usize,
}

/// Statistics about a split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitStats {
    pub policy: SplitPolicy,
    pub total_samples: usize,
    pub total_subjects: usize,
    /// Subjects with images in more than one phase
    pub leaked_subjects: usize,
    pub phases: Vec<PhaseStats>,
}

impl std::fmt::Display for SplitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Split Statistics ({}):", self.policy)?;
        writeln!(f, "  Total samples: {}", self.total_samples)?;
        writeln!(f, "  Total subjects: {}", self.total_subjects)?;
        for phase in &self.phases {
            let share = if self.total_samples == 0 {
                0.0
            } else {
                100.0 * phase.samples as f64 / self.total_samples as f64
            };
            writeln!(
                f,
                "  {}: {} samples ({:.1}%), {} subjects",
                phase.phase, phase.samples, share, phase.subjects
            )?;
        }
        writeln!(f, "  Subjects on both sides: {}", self.leaked_subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mask_core::{AgeBracket, Gender, MaskState};
    use std::path::PathBuf;

    fn random_config(val_ratio: f64, seed: u64) -> SplitConfig {
        SplitConfig::new(SplitPolicy::RandomSample, val_ratio, seed).unwrap()
    }

    fn subject_config(val_ratio: f64, seed: u64, draw: SubjectDraw) -> SplitConfig {
        SplitConfig::new(SplitPolicy::SubjectDisjoint, val_ratio, seed)
            .unwrap()
            .with_subject_draw(draw)
    }

    fn samples_for(subjects: usize, per_subject: usize) -> Vec<Sample> {
        let mut samples = Vec::new();
        for s in 0..subjects {
            for i in 0..per_subject {
                samples.push(Sample {
                    image_path: PathBuf::from(format!("{:03}_male_asian_20/mask{}.jpg", s, i + 1)),
                    subject_id: format!("{:03}_male_asian_20", s),
                    race: "asian".to_string(),
                    mask_state: MaskState::Mask,
                    gender: Gender::Male,
                    age_bracket: AgeBracket::Young,
                });
            }
        }
        samples
    }

    #[test]
    fn test_random_split_sizes() {
        let assignment = SplitAssignment::random_sample(100, random_config(0.2, 42)).unwrap();
        assert_eq!(assignment.val().len(), 20);
        assert_eq!(assignment.train().len(), 80);
    }

    #[test]
    fn test_random_split_is_partition() {
        let assignment = SplitAssignment::random_sample(137, random_config(0.3, 7)).unwrap();
        assert!(assignment.check_partition().is_ok());

        let mut all: Vec<usize> = assignment
            .train()
            .iter()
            .chain(assignment.val())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..137).collect::<Vec<_>>());
    }

    #[test]
    fn test_random_split_reproducible() {
        let a = SplitAssignment::random_sample(50, random_config(0.2, 3)).unwrap();
        let b = SplitAssignment::random_sample(50, random_config(0.2, 3)).unwrap();
        let c = SplitAssignment::random_sample(50, random_config(0.2, 4)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.val(), c.val());
    }

    #[test]
    fn test_random_split_degenerate() {
        let empty_val = SplitAssignment::random_sample(3, random_config(0.2, 1)).unwrap();
        assert!(empty_val.val().is_empty());
        assert_eq!(empty_val.train(), &[0, 1, 2]);

        let empty = SplitAssignment::random_sample(0, random_config(0.2, 1)).unwrap();
        assert!(empty.train().is_empty() && empty.val().is_empty());
    }

    #[test]
    fn test_subject_plan_exact() {
        let plan = SubjectPlan::draw(10, &subject_config(0.3, 5, SubjectDraw::Exact)).unwrap();
        assert_eq!(plan.val.len(), 3);
        assert_eq!(plan.train.len(), 7);
        assert!(plan.val.iter().all(|v| !plan.train.contains(v)));
    }

    #[test]
    fn test_subject_plan_with_replacement_never_exceeds_nominal() {
        for seed in 0..50 {
            let plan =
                SubjectPlan::draw(20, &subject_config(0.5, seed, SubjectDraw::WithReplacement))
                    .unwrap();
            assert!(plan.val.len() <= 10);
            assert!(!plan.val.is_empty());
            assert_eq!(plan.val.len() + plan.train.len(), 20);
        }
    }

    #[test]
    fn test_subject_plan_ordering() {
        let plan = SubjectPlan {
            train: vec![0, 2],
            val: vec![1],
        };
        let ordered: Vec<_> = plan.ordered().collect();
        assert_eq!(
            ordered,
            vec![(Phase::Train, 0), (Phase::Train, 2), (Phase::Val, 1)]
        );
    }

    #[test]
    fn test_subject_plan_empty_corpus() {
        let plan = SubjectPlan::draw(0, &subject_config(0.2, 1, SubjectDraw::Exact)).unwrap();
        assert!(plan.train.is_empty() && plan.val.is_empty());
    }

    #[test]
    fn test_from_phases_rejects_overlap() {
        let mut phases = BTreeMap::new();
        phases.insert(Phase::Train, vec![0, 1]);
        phases.insert(Phase::Val, vec![1]);
        let config = subject_config(0.2, 1, SubjectDraw::Exact);
        let result = SplitAssignment::from_phases(config, phases);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_phases_records_config_policy() {
        let mut phases = BTreeMap::new();
        phases.insert(Phase::Train, vec![0, 2]);
        phases.insert(Phase::Val, vec![1]);
        let config = subject_config(0.2, 1, SubjectDraw::Exact);
        let assignment = SplitAssignment::from_phases(config, phases).unwrap();

        assert_eq!(assignment.total, 3);
        assert_eq!(assignment.policy(), SplitPolicy::SubjectDisjoint);
        assert_eq!(assignment.stats(&[]).policy, SplitPolicy::SubjectDisjoint);
    }

    #[test]
    fn test_check_partition_rejects_gaps() {
        let mut phases = BTreeMap::new();
        phases.insert(Phase::Train, vec![0, 1]);
        phases.insert(Phase::Val, vec![2, 3]);
        let assignment = SplitAssignment {
            config: random_config(0.2, 1),
            phases,
            total: 10,
        };

        let err = assignment.check_partition().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref msg) if msg.contains("Sample 4")));
    }

    #[test]
    fn test_load_rejects_missing_indices() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("split.json");

        let mut assignment = SplitAssignment::random_sample(10, random_config(0.2, 11)).unwrap();
        assignment.phases.insert(Phase::Train, vec![0, 1]);
        assignment.phases.insert(Phase::Val, vec![2, 3]);
        assignment.save(&path).unwrap();

        let result = SplitAssignment::load(&path);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_phase_of() {
        let assignment = SplitAssignment::random_sample(10, random_config(0.5, 1)).unwrap();
        for &i in assignment.val() {
            assert_eq!(assignment.phase_of(i), Some(Phase::Val));
        }
        assert_eq!(assignment.phase_of(10), None);
    }

    #[test]
    fn test_stats_counts_leakage() {
        let samples = samples_for(10, 7);
        let assignment = SplitAssignment::random_sample(samples.len(), random_config(0.5, 2)).unwrap();
        let stats = assignment.stats(&samples);

        assert_eq!(stats.total_samples, 70);
        assert_eq!(stats.total_subjects, 10);
        // 35 of 70 images shuffled out of 10 subjects with 7 each: some subject straddles
        assert!(stats.leaked_subjects > 0);
        assert!(stats.to_string().contains("Subjects on both sides"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("split.json");

        let assignment = SplitAssignment::random_sample(25, random_config(0.2, 11)).unwrap();
        assignment.save(&path).unwrap();
        let loaded = SplitAssignment::load(&path).unwrap();

        assert_eq!(loaded, assignment);
        assert_eq!(loaded.policy(), SplitPolicy::RandomSample);
    }

    #[test]
    fn test_unsplit() {
        let assignment = SplitAssignment::unsplit(4, random_config(0.2, 1));
        assert_eq!(assignment.policy(), SplitPolicy::None);
        assert_eq!(assignment.config.policy, SplitPolicy::None);
        assert_eq!(assignment.config.seed, 1);
        assert_eq!(assignment.indices(Phase::Eval), &[0, 1, 2, 3]);
        assert!(assignment.train().is_empty());
        assert_eq!(assignment.phases().collect::<Vec<_>>(), vec![Phase::Eval]);
    }
}
