//! Settings errors.

use std::path::PathBuf;

use thiserror::Error;

/// Why a settings document could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The file (or the merged document) is not valid settings JSON.
    #[error("malformed settings in {}: {source}", path.display())]
    Malformed {
        /// File that was being parsed.
        path: PathBuf,
        /// Parser failure.
        source: serde_json::Error,
    },
    /// Values parse but contradict each other.
    #[error("{field}: {reason}")]
    Inconsistent {
        /// Dotted path of the offending setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    /// Dotted setting path for [`SettingsError::Inconsistent`].
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Inconsistent { field, .. } => Some(field),
            Self::Read { .. } | Self::Malformed { .. } => None,
        }
    }
}

/// Settings result.
pub type Result<T> = std::result::Result<T, SettingsError>;
