//! Label taxonomy: the three categorical attributes of a sample and the
//! rules that derive them from directory and file names.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Age boundary between the young and middle brackets
pub const MIDDLE_AGE_START: u32 = 30;

/// Age boundary between the middle and old brackets
pub const OLD_AGE_START: u32 = 60;

/// File stems that carry a mask state, in canonical order.
pub const MASK_FILE_STEMS: [&str; 7] = [
    "mask1",
    "mask2",
    "mask3",
    "mask4",
    "mask5",
    "incorrect_mask",
    "normal",
];

/// How the mask is worn in one image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaskState {
    /// Mask worn properly
    Mask = 0,
    /// Mask worn incorrectly
    Incorrect = 1,
    /// No mask
    Normal = 2,
}

impl MaskState {
    pub const ALL: [MaskState; 3] = [MaskState::Mask, MaskState::Incorrect, MaskState::Normal];

    /// Maps a file stem (file name without extension) to a mask state.
    ///
    /// Anything outside [`MASK_FILE_STEMS`] yields [`Error::UnknownFile`],
    /// which callers treat as "skip this file".
    pub fn from_file_stem(stem: &str) -> Result<Self> {
        match stem {
            "mask1" | "mask2" | "mask3" | "mask4" | "mask5" => Ok(MaskState::Mask),
            "incorrect_mask" => Ok(MaskState::Incorrect),
            "normal" => Ok(MaskState::Normal),
            other => Err(Error::UnknownFile(other.to_string())),
        }
    }

    /// Maps a variant label prefix (`mask`, `incorrect_mask`, `normal`) to
    /// the mask state shared by every stem carrying that prefix.
    pub fn from_label_prefix(prefix: &str) -> Result<Self> {
        match prefix {
            "mask" => Ok(MaskState::Mask),
            "incorrect_mask" => Ok(MaskState::Incorrect),
            "normal" => Ok(MaskState::Normal),
            other => Err(Error::InvalidArgument(format!(
                "Unknown mask label prefix '{}', expected one of: mask, incorrect_mask, normal",
                other
            ))),
        }
    }

    /// Ordinal used by the label encoder
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`MaskState::index`]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for MaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaskState::Mask => write!(f, "mask"),
            MaskState::Incorrect => write!(f, "incorrect"),
            MaskState::Normal => write!(f, "normal"),
        }
    }
}

/// Gender of a subject
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gender {
    Male = 0,
    Female = 1,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    /// Parses the gender field of a subject directory, case-insensitively.
    pub fn from_str_label(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            _ => Err(Error::InvalidGender(value.to_string())),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_str_label(s)
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

/// Age bracket of a subject
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgeBracket {
    /// Under 30
    Young = 0,
    /// 30 up to (not including) 60
    Middle = 1,
    /// 60 and over
    Old = 2,
}

impl AgeBracket {
    pub const ALL: [AgeBracket; 3] = [AgeBracket::Young, AgeBracket::Middle, AgeBracket::Old];

    /// Parses the age field of a subject directory and buckets it.
    pub fn from_number(value: &str) -> Result<Self> {
        value
            .parse::<u32>()
            .map(Self::from_age)
            .map_err(|_| Error::InvalidAge(value.to_string()))
    }

    /// Buckets an age in years.
    pub fn from_age(age: u32) -> Self {
        if age < MIDDLE_AGE_START {
            AgeBracket::Young
        } else if age < OLD_AGE_START {
            AgeBracket::Middle
        } else {
            AgeBracket::Old
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for AgeBracket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgeBracket::Young => write!(f, "<30"),
            AgeBracket::Middle => write!(f, "30-59"),
            AgeBracket::Old => write!(f, ">=60"),
        }
    }
}

/// Partition a sample belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Training data
    Train,
    /// Validation data
    Val,
    /// Unsplit evaluation data
    Eval,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Val => write!(f, "val"),
            Phase::Eval => write!(f, "eval"),
        }
    }
}
