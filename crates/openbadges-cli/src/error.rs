use crate::mail::MailError;
use openbadges_core::CoreError;
use openbadges_issuer::{IssueError, OutputError};
use std::path::PathBuf;
use thiserror::Error;

/// Usage error detected after argument parsing (clap uses the same code).
pub const EXIT_USAGE: i32 = 2;
/// Configuration missing or invalid.
pub const EXIT_CONFIG: i32 = 3;
/// Requested badge not defined in the configuration.
pub const EXIT_BADGE_NOT_DEFINED: i32 = 4;
/// Badge image or private key file missing.
pub const EXIT_MISSING_FILE: i32 = 5;
/// Badge already issued to this recipient.
pub const EXIT_DUPLICATE: i32 = 6;
/// Private key unusable.
pub const EXIT_KEY: i32 = 7;
/// Signing, baking or output failure.
pub const EXIT_PIPELINE: i32 = 8;
/// Mail delivery failed after the badge was written.
pub const EXIT_MAIL: i32 = 9;

/// Top-level error for the signer binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("badge '{badge}' is not defined in {}", config.display())]
    BadgeNotDefined { badge: String, config: PathBuf },

    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error("badge was issued but mail delivery failed: {0}")]
    Mail(#[from] MailError),
}

impl From<toml::de::Error> for CliError {
    fn from(e: toml::de::Error) -> Self {
        CliError::Config(format!("TOML parse error: {}", e))
    }
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => EXIT_CONFIG,
            CliError::BadgeNotDefined { .. } => EXIT_BADGE_NOT_DEFINED,
            CliError::Mail(_) => EXIT_MAIL,
            CliError::Issue(err) => match err {
                IssueError::MissingFile { .. } | IssueError::Read { .. } => EXIT_MISSING_FILE,
                IssueError::Output(OutputError::DuplicateBadge(_)) => EXIT_DUPLICATE,
                IssueError::Validation(_) => EXIT_USAGE,
                IssueError::Core(
                    CoreError::InvalidEvidenceSpec(_) | CoreError::InvalidExpiration(_),
                ) => EXIT_USAGE,
                IssueError::Core(core) if core.is_key_error() => EXIT_KEY,
                _ => EXIT_PIPELINE,
            },
        }
    }
}
