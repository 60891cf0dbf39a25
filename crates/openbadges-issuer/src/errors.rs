use openbadges_core::CoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while embedding or extracting an assertion.
#[derive(Error, Debug)]
pub enum BakeError {
    /// Carrier bytes are not an image format the baker supports.
    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),
    /// Embedding would violate the carrier format's structure.
    #[error("cannot bake badge: {0}")]
    BakeFailure(String),
    /// No baked assertion was found while extracting.
    #[error("image carries no baked assertion")]
    MissingAssertion,
}

/// Errors raised while placing the artifact on disk.
#[derive(Error, Debug)]
pub enum OutputError {
    /// An artifact already exists at the resolved path.
    #[error("badge already issued at {}", .0.display())]
    DuplicateBadge(PathBuf),
    /// I/O error while writing the artifact.
    #[error("I/O error writing {}: {source}", path.display())]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Local input files the pipeline reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFile {
    /// Carrier image.
    Image,
    /// Issuer private key.
    PrivateKey,
}

impl fmt::Display for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputFile::Image => write!(f, "badge image"),
            InputFile::PrivateKey => write!(f, "private key"),
        }
    }
}

/// Errors from a complete issuance request.
#[derive(Error, Debug)]
pub enum IssueError {
    /// A required input file does not exist.
    #[error("{kind} file {} does not exist", path.display())]
    MissingFile {
        /// Which input was missing.
        kind: InputFile,
        /// Path that was looked up.
        path: PathBuf,
    },
    /// A required input file exists but could not be read.
    #[error("cannot read {kind} file {}: {source}", path.display())]
    Read {
        /// Which input failed.
        kind: InputFile,
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Invalid identifier or recipient.
    #[error("validation error: {0}")]
    Validation(#[from] openbadges_canonical::ValidationError),
    /// Key, assertion or signing failure.
    #[error(transparent)]
    Core(#[from] CoreError),
    /// Baking failure.
    #[error(transparent)]
    Bake(#[from] BakeError),
    /// Output placement failure, including duplicates.
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl IssueError {
    /// True when the recipient already holds this badge.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, IssueError::Output(OutputError::DuplicateBadge(_)))
    }
}
