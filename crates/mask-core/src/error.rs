//! Error types for the face-mask dataset pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for corpus scanning, splitting and label encoding.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Subject directory name does not follow `id_gender_race_age`
    #[error("Invalid subject directory '{name}': {reason}")]
    InvalidSubject { name: String, reason: String },

    /// Gender field is neither `male` nor `female`
    #[error("Gender value should be either 'male' or 'female', got '{0}'")]
    InvalidGender(String),

    /// Age field is not a non-negative integer
    #[error("Age value should be numeric, got '{0}'")]
    InvalidAge(String),

    /// File stem is not one of the recognized mask stems; the file is skipped
    #[error("Unrecognized file stem '{0}'")]
    UnknownFile(String),

    /// A sample was read before any transform was bound
    #[error("No transform set; call set_transform before reading samples")]
    TransformNotSet,

    /// Sample index outside the dataset
    #[error("Index {index} out of bounds for dataset of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Class id outside `[0, num_classes)` for the active projection
    #[error("Label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not found error
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),
}

impl Error {
    /// Whether the error only means "leave this file out of the corpus".
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::UnknownFile(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

/// Specialized Result type for dataset operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidGender("nonbinary".to_string());
        assert_eq!(
            err.to_string(),
            "Gender value should be either 'male' or 'female', got 'nonbinary'"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_skippable() {
        assert!(Error::UnknownFile("readme".to_string()).is_skippable());
        assert!(!Error::TransformNotSet.is_skippable());
        assert!(!Error::InvalidAge("x".to_string()).is_skippable());
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound(PathBuf::from("/data/train"));
        assert_eq!(err.to_string(), "Not found: /data/train");
    }
}
