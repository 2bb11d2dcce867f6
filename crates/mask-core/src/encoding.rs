//! Label encoding between attribute triples and single class ids.
//!
//! Three projections share the same raw attributes:
//!
//! | projection | classes | id |
//! |---|---|---|
//! | `Full` | 18 | `mask * 6 + gender * 3 + age` |
//! | `MaskOnly` | 3 | `mask` |
//! | `GenderAge` | 6 | `gender * 3 + age` |
//!
//! Every projection is a bijection between its attribute domain and
//! `0..num_classes()`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::taxonomy::{AgeBracket, Gender, MaskState};

/// Number of classes of the full mask × gender × age projection
pub const NUM_MULTI_CLASSES: usize = 18;

const MASK_STRIDE: usize = 6;
const GENDER_STRIDE: usize = 3;

/// The three attributes of one sample
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Attributes {
    pub mask: MaskState,
    pub gender: Gender,
    pub age: AgeBracket,
}

impl Attributes {
    pub fn new(mask: MaskState, gender: Gender, age: AgeBracket) -> Self {
        Self { mask, gender, age }
    }
}

/// Encodes a full attribute triple into `0..18`.
pub fn encode_multi_class(mask: MaskState, gender: Gender, age: AgeBracket) -> usize {
    mask.index() * MASK_STRIDE + gender.index() * GENDER_STRIDE + age.index()
}

/// Decodes a full class id back into its attribute triple.
pub fn decode_multi_class(label: usize) -> Result<(MaskState, Gender, AgeBracket)> {
    if label >= NUM_MULTI_CLASSES {
        return Err(Error::LabelOutOfRange {
            label,
            num_classes: NUM_MULTI_CLASSES,
        });
    }

    let mask = (label / MASK_STRIDE) % MaskState::ALL.len();
    let gender = (label / GENDER_STRIDE) % Gender::ALL.len();
    let age = label % AgeBracket::ALL.len();

    Ok((MaskState::ALL[mask], Gender::ALL[gender], AgeBracket::ALL[age]))
}

/// Which attributes feed the encoded label
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LabelProjection {
    /// mask × gender × age, 18 classes
    #[default]
    Full,
    /// mask state only, 3 classes
    MaskOnly,
    /// gender × age, 6 classes
    GenderAge,
}

/// Attributes recovered from a class id; `None` for attributes the
/// projection does not carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedLabel {
    pub mask: Option<MaskState>,
    pub gender: Option<Gender>,
    pub age: Option<AgeBracket>,
}

impl std::fmt::Display for DecodedLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if let Some(mask) = self.mask {
            parts.push(format!("mask: {}", mask));
        }
        if let Some(gender) = self.gender {
            parts.push(format!("gender: {}", gender));
        }
        if let Some(age) = self.age {
            parts.push(format!("age: {}", age));
        }
        write!(f, "{}", parts.join(", "))
    }
}

impl LabelProjection {
    pub const ALL: [LabelProjection; 3] = [
        LabelProjection::Full,
        LabelProjection::MaskOnly,
        LabelProjection::GenderAge,
    ];

    /// Number of classes the projection encodes into
    pub fn num_classes(self) -> usize {
        match self {
            LabelProjection::Full => NUM_MULTI_CLASSES,
            LabelProjection::MaskOnly => MaskState::ALL.len(),
            LabelProjection::GenderAge => Gender::ALL.len() * AgeBracket::ALL.len(),
        }
    }

    pub fn encode(self, attributes: &Attributes) -> usize {
        match self {
            LabelProjection::Full => {
                encode_multi_class(attributes.mask, attributes.gender, attributes.age)
            }
            LabelProjection::MaskOnly => attributes.mask.index(),
            LabelProjection::GenderAge => {
                attributes.gender.index() * GENDER_STRIDE + attributes.age.index()
            }
        }
    }

    pub fn decode(self, label: usize) -> Result<DecodedLabel> {
        let num_classes = self.num_classes();
        if label >= num_classes {
            return Err(Error::LabelOutOfRange { label, num_classes });
        }

        let decoded = match self {
            LabelProjection::Full => {
                let (mask, gender, age) = decode_multi_class(label)?;
                DecodedLabel {
                    mask: Some(mask),
                    gender: Some(gender),
                    age: Some(age),
                }
            }
            LabelProjection::MaskOnly => DecodedLabel {
                mask: MaskState::from_index(label),
                gender: None,
                age: None,
            },
            LabelProjection::GenderAge => DecodedLabel {
                mask: None,
                gender: Gender::from_index(label / GENDER_STRIDE),
                age: AgeBracket::from_index(label % GENDER_STRIDE),
            },
        };

        Ok(decoded)
    }
}

impl std::fmt::Display for LabelProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelProjection::Full => write!(f, "full"),
            LabelProjection::MaskOnly => write!(f, "mask_only"),
            LabelProjection::GenderAge => write!(f, "gender_age"),
        }
    }
}
