//! Output path resolution and collision-checked placement.
//!
//! Artifacts land at `<output_dir>/<badge_id>_<uid>.<ext>`. The uid is
//! derived from the badge and recipient under the issuer's key, so issuing the
//! same badge to the same recipient twice resolves to the same path and the
//! second attempt is refused.

use crate::errors::OutputError;
use crate::svg::{BakedBadge, ImageFormat};
use openbadges_canonical::{derive_uid, Uid, UidKey, ValidationError};
use openbadges_core::BadgeDefinition;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Resolved destination of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    uid: Uid,
    path: PathBuf,
}

impl OutputPath {
    /// Uid of the badge/recipient pair.
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Full destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Computes the destination for `recipient`'s copy of `definition`.
///
/// The extension follows the carrier image's local file, defaulting to `svg`.
/// No filesystem access happens here.
pub fn resolve_path(
    uid_key: &UidKey,
    definition: &BadgeDefinition,
    recipient: &str,
    output_dir: &Path,
) -> Result<OutputPath, ValidationError> {
    let uid = derive_uid(uid_key, &definition.id, recipient)?;
    let ext = definition
        .local_image
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| ImageFormat::Svg.extension().to_string());
    let path = output_dir.join(format!("{}_{}.{}", definition.id, uid, ext));
    Ok(OutputPath { uid, path })
}

/// Fails with [`OutputError::DuplicateBadge`] if something already exists at `path`.
pub fn ensure_absent(path: &Path) -> Result<(), OutputError> {
    match path.symlink_metadata() {
        Ok(_) => Err(OutputError::DuplicateBadge(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(OutputError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `badge` to `path` without ever replacing an existing file.
///
/// The bytes go to a temporary file in the destination directory, which is
/// then linked into place only if `path` is still free. A reader never sees
/// a partial artifact, and a concurrent issuer for the same pair loses with
/// [`OutputError::DuplicateBadge`].
pub fn finalize(path: &Path, badge: &BakedBadge) -> Result<(), OutputError> {
    let io_err = |source: io::Error| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".openbadges-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err)?;
    tmp.write_all(badge.bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    tmp.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            OutputError::DuplicateBadge(path.to_path_buf())
        } else {
            io_err(e.error)
        }
    })?;
    Ok(())
}
