//! End-to-end issuance: load, build, sign, bake, place.

use crate::context::IssueContext;
use crate::errors::{InputFile, IssueError};
use crate::output::{ensure_absent, finalize, resolve_path};
use crate::svg;
use openbadges_canonical::{BadgeId, Uid};
use openbadges_core::{
    validate_expiration, Assertion, AssertionRequest, BadgeDefinition, Evidence, JwsAlgorithm,
    KeyMaterial, Signer,
};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// One signing request.
#[derive(Debug, Clone)]
pub struct IssueRequest<'a> {
    /// Badge being awarded.
    pub definition: &'a BadgeDefinition,
    /// Recipient email, plaintext. Only its salted hash reaches the artifact.
    pub recipient: &'a str,
    /// Evidence URL.
    pub evidence: Option<&'a str>,
    /// Explicit no-evidence flag; exclusive with `evidence`.
    pub no_evidence: bool,
    /// Days until the badge expires.
    pub expires_days: Option<i64>,
    /// Directory the artifact is written to.
    pub output_dir: &'a Path,
}

/// Outcome of a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedBadge {
    /// Badge identifier.
    pub badge_id: BadgeId,
    /// Recipient as given on the request.
    pub recipient: String,
    /// Assertion uid.
    pub uid: Uid,
    /// Where the artifact was written.
    pub path: PathBuf,
    /// Signature algorithm used.
    pub alg: JwsAlgorithm,
    /// Expiration timestamp, if any.
    pub expires: Option<i64>,
}

impl fmt::Display for IssuedBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} SIGNED for {} UID {} at {}",
            self.badge_id,
            self.recipient,
            self.uid,
            self.path.display()
        )
    }
}

/// Issues one badge.
///
/// Request arguments are checked before any file is touched. The output path
/// depends on the issuer key, so the key is loaded first, but the duplicate
/// check still runs before anything is signed. The key bytes are wiped once
/// the signature exists. On any error nothing is written.
///
/// # Errors
///
/// - [`IssueError::Core`] for evidence, expiration, key and signing failures
/// - [`IssueError::MissingFile`] / [`IssueError::Read`] for unreadable inputs
/// - [`IssueError::Bake`] if the carrier image cannot carry the assertion
/// - [`IssueError::Output`] for duplicates and write failures
pub fn issue(ctx: &IssueContext, request: &IssueRequest<'_>) -> Result<IssuedBadge, IssueError> {
    let _entered = ctx.span().enter();
    let definition = request.definition;

    Evidence::resolve(request.evidence, request.no_evidence)?;
    validate_expiration(request.expires_days)?;

    let carrier = read_input(InputFile::Image, &definition.local_image)?;
    svg::detect_format(&carrier)?;

    let (assertion, signature, target) = {
        let key_bytes = Zeroizing::new(read_input(InputFile::PrivateKey, &definition.private_key)?);
        let key = KeyMaterial::load(&key_bytes)?;
        tracing::debug!(key_type = %key.key_type(), "loaded issuer key");

        let uid_key = key.uid_key();
        let target = resolve_path(&uid_key, definition, request.recipient, request.output_dir)?;
        ctx.record_uid(target.uid());
        ensure_absent(target.path())?;
        tracing::debug!(path = %target.path().display(), "output path is free");

        let assertion = Assertion::build(
            definition,
            &AssertionRequest {
                identity: request.recipient,
                uid_key: &uid_key,
                evidence: request.evidence,
                no_evidence: request.no_evidence,
                expires_days: request.expires_days,
                issued_at: ctx.issued_at(),
            },
        )?;
        let signature = Signer::for_key(&key).sign(&assertion, &key)?;
        (assertion, signature, target)
    };
    tracing::debug!(alg = %signature.alg(), "signed assertion");

    let baked = svg::bake(&carrier, &assertion, &signature)?;
    finalize(target.path(), &baked)?;

    tracing::info!(
        path = %target.path().display(),
        alg = %signature.alg(),
        "badge issued"
    );

    Ok(IssuedBadge {
        badge_id: definition.id.clone(),
        recipient: request.recipient.to_string(),
        uid: assertion.uid,
        path: target.path().to_path_buf(),
        alg: signature.alg(),
        expires: assertion.expires,
    })
}

fn read_input(kind: InputFile, path: &Path) -> Result<Vec<u8>, IssueError> {
    std::fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            IssueError::MissingFile {
                kind,
                path: path.to_path_buf(),
            }
        } else {
            IssueError::Read {
                kind,
                path: path.to_path_buf(),
                source,
            }
        }
    })
}
