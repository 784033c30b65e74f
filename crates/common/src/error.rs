//! Common error types for podscout.

use thiserror::Error;

/// Common error type for podscout operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Bundle not found: {0}")]
    BundleNotFound(String),

    #[error("Artifact generation failed: {0}")]
    ArtifactGeneration(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
