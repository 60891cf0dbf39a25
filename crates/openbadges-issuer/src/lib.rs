//! Baking and issuance for Open Badges.
//!
//! This crate provides:
//! - Embedding of a signed assertion into an SVG carrier image, and extraction back out
//! - Deterministic, collision-checked placement of the baked artifact
//! - The [`issue`] pipeline tying key loading, signing, baking and output together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use openbadges_canonical::{BadgeId, HttpUrl};
//! use openbadges_core::BadgeDefinition;
//! use openbadges_issuer::{issue, IssueContext, IssueRequest};
//! use std::path::{Path, PathBuf};
//!
//! let definition = BadgeDefinition {
//!     id: BadgeId::parse("bio101")?,
//!     name: "Biology 101".to_string(),
//!     json_url: HttpUrl::parse("https://example.org/badges/bio101.json")?,
//!     image_url: HttpUrl::parse("https://example.org/badges/bio101.svg")?,
//!     verify_key_url: HttpUrl::parse("https://example.org/keys/issuer.pem")?,
//!     local_image: PathBuf::from("bio101.svg"),
//!     private_key: PathBuf::from("issuer.pem"),
//! };
//!
//! let ctx = IssueContext::new(&definition.id);
//! let issued = issue(
//!     &ctx,
//!     &IssueRequest {
//!         definition: &definition,
//!         recipient: "alice@example.org",
//!         evidence: None,
//!         no_evidence: true,
//!         expires_days: Some(30),
//!         output_dir: Path::new("out"),
//!     },
//! )?;
//! println!("{issued}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]

/// Per-request context.
pub mod context;
/// Error types for baking, output and issuance.
pub mod errors;
/// Output path resolution and atomic placement.
pub mod output;
/// Issuance pipeline.
pub mod pipeline;
/// SVG baking and extraction.
pub mod svg;

pub use context::IssueContext;
pub use errors::{BakeError, InputFile, IssueError, OutputError};
pub use output::{ensure_absent, finalize, resolve_path, OutputPath};
pub use pipeline::{issue, IssueRequest, IssuedBadge};
pub use svg::{bake, detect_format, extract, BakedBadge, EmbeddedAssertion, ImageFormat};
