//! Asset Error Types
//!
//! Structured error handling for loading and serving cached assets.
//! Maps each failure to the HTTP status surfaced to the end consumer.

use std::io;
use std::path::PathBuf;

/// Asset loading and serving errors
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Compression failed: {0}")]
    Compression(#[source] io::Error),

    #[error("Hashing failed: {0}")]
    Hash(#[source] io::Error),

    #[error("Failed to write response: {0}")]
    Write(#[source] io::Error),
}

impl AssetError {
    /// Whether this error should be reported as a missing asset
    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound(_))
    }

    /// Map the error to the HTTP status shown to the requester
    ///
    /// Only `NotFound` is distinct; everything else is a generic failure.
    pub fn status_code(&self) -> u16 {
        match self {
            AssetError::NotFound(_) => 404,
            AssetError::Read { .. }
            | AssetError::Compression(_)
            | AssetError::Hash(_)
            | AssetError::Write(_) => 500,
        }
    }
}
