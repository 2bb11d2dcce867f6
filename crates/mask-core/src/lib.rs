//! Core types for the face-mask classification dataset.
//!
//! This crate provides the label taxonomy (mask state, gender, age bracket),
//! the label encoder for the three label projections, configuration and
//! the shared error type used across the workspace.

pub mod cli;
pub mod config;
pub mod encoding;
pub mod error;
pub mod taxonomy;

pub use cli::*;
pub use config::*;
pub use encoding::*;
pub use error::{Error, Result};
pub use taxonomy::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::config::*;
    pub use crate::encoding::*;
    pub use crate::error::{Error, Result};
    pub use crate::taxonomy::*;
}
