//! Corpus discovery.
//!
//! The corpus root holds one directory per subject, named
//! `{id}_{gender}_{race}_{age}`:
//!
//! ```text
//! root/
//! ├── 000001_female_Asian_45/
//! │   ├── mask1.jpg .. mask5.jpg
//! │   ├── incorrect_mask.jpg
//! │   └── normal.jpg
//! └── ...
//! ```
//!
//! A malformed subject directory aborts the scan. Files whose stem is not a
//! recognized mask stem, and hidden entries, are skipped silently.

use std::path::{Path, PathBuf};

use mask_core::{
    AgeBracket, Attributes, Error, Gender, MaskState, Result, SampleFilter,
};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// A parsed subject directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    /// Directory name, unchanged
    pub dir_name: String,
    pub id: String,
    pub gender: Gender,
    /// Carried through but not used for labels
    pub race: String,
    pub age: u32,
    pub age_bracket: AgeBracket,
}

impl Subject {
    /// Parses `id_gender_race_age`.
    pub fn parse(dir_name: &str) -> Result<Self> {
        let fields: Vec<&str> = dir_name.split('_').collect();
        let [id, gender, race, age] = fields.as_slice() else {
            return Err(Error::InvalidSubject {
                name: dir_name.to_string(),
                reason: format!("expected 4 '_'-separated fields, found {}", fields.len()),
            });
        };

        let gender = Gender::from_str_label(gender)?;
        let age = age
            .parse::<u32>()
            .map_err(|_| Error::InvalidAge(age.to_string()))?;
        let age_bracket = AgeBracket::from_age(age);

        Ok(Self {
            dir_name: dir_name.to_string(),
            id: id.to_string(),
            gender,
            race: race.to_string(),
            age,
            age_bracket,
        })
    }
}

/// One image of one subject with its derived labels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sample {
    /// Path to the image file
    pub image_path: PathBuf,
    /// Subject directory name; shared by every image of one person
    pub subject_id: String,
    pub race: String,
    pub mask_state: MaskState,
    pub gender: Gender,
    pub age_bracket: AgeBracket,
}

impl Sample {
    pub fn attributes(&self) -> Attributes {
        Attributes::new(self.mask_state, self.gender, self.age_bracket)
    }
}

/// Stateful form of a [`SampleFilter`]; the sampling RNG persists across
/// subjects so a whole scan draws from one seeded stream.
#[derive(Debug, Clone)]
pub struct FileSelector {
    prefix: Option<String>,
    sampler: Option<(f64, ChaCha8Rng)>,
}

impl FileSelector {
    pub fn new(filter: &SampleFilter) -> Result<Self> {
        filter.validate()?;

        let sampler = match filter {
            SampleFilter::Ratio { ratio, seed } | SampleFilter::PrefixRatio { ratio, seed, .. } => {
                Some((*ratio, ChaCha8Rng::seed_from_u64(*seed)))
            }
            _ => None,
        };

        Ok(Self {
            prefix: filter.prefix().map(str::to_string),
            sampler,
        })
    }

    /// Returns the mask state for a file stem if the file qualifies.
    pub fn select(&mut self, stem: &str) -> Option<MaskState> {
        let state = MaskState::from_file_stem(stem).ok()?;

        if let Some(prefix) = &self.prefix {
            if !stem.starts_with(prefix.as_str()) {
                return None;
            }
        }

        if let Some((ratio, rng)) = &mut self.sampler {
            if !rng.gen_bool(*ratio) {
                return None;
            }
        }

        Some(state)
    }
}

/// Walks a corpus root and yields labeled samples
#[derive(Debug, Clone)]
pub struct CorpusScanner {
    root_dir: PathBuf,
    sorted: bool,
}

impl CorpusScanner {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            sorted: false,
        }
    }

    /// Sort directory listings by file name instead of platform order
    pub fn sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn listing(&self, dir: &Path) -> WalkDir {
        let walker = WalkDir::new(dir).min_depth(1).max_depth(1);
        if self.sorted {
            walker.sort_by_file_name()
        } else {
            walker
        }
    }

    /// Lists and parses subject directories without touching their files.
    pub fn list_subjects(&self) -> Result<Vec<Subject>> {
        if !self.root_dir.exists() {
            return Err(Error::NotFound(self.root_dir.clone()));
        }
        if !self.root_dir.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "Corpus root is not a directory: {}",
                self.root_dir.display()
            )));
        }

        let mut subjects = Vec::new();
        for entry in self.listing(&self.root_dir) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if is_hidden(&entry) || !entry.path().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            subjects.push(Subject::parse(&name)?);
        }

        info!(
            "Found {} subjects in {}",
            subjects.len(),
            self.root_dir.display()
        );
        Ok(subjects)
    }

    /// Enumerates the qualifying images of one subject.
    pub fn scan_subject(&self, subject: &Subject, selector: &mut FileSelector) -> Result<Vec<Sample>> {
        let subject_dir = self.root_dir.join(&subject.dir_name);
        let mut samples = Vec::new();

        for entry in self.listing(&subject_dir) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if is_hidden(&entry) || !entry.path().is_file() {
                continue;
            }

            let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(mask_state) = selector.select(stem) else {
                continue;
            };

            samples.push(Sample {
                image_path: entry.path().to_path_buf(),
                subject_id: subject.dir_name.clone(),
                race: subject.race.clone(),
                mask_state,
                gender: subject.gender,
                age_bracket: subject.age_bracket,
            });
        }

        debug!("Subject '{}': {} samples", subject.dir_name, samples.len());
        Ok(samples)
    }

    /// Scans the whole corpus in listing order.
    pub fn scan(&self, filter: &SampleFilter) -> Result<Vec<Sample>> {
        let mut selector = FileSelector::new(filter)?;
        let subjects = self.list_subjects()?;

        let mut samples = Vec::new();
        for subject in &subjects {
            samples.extend(self.scan_subject(subject, &mut selector)?);
        }

        info!("Scanned {} samples from {} subjects", samples.len(), subjects.len());
        Ok(samples)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
