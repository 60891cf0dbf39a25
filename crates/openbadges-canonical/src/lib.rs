//! Canonical primitives shared by every Open Badges artifact this workspace produces.
//!
//! Anything that participates in signing lives here: the RFC 8785 canonical
//! JSON encoder, validated identifier newtypes, the salted recipient hash and
//! the issuer-keyed assertion UID.
//!
#![deny(missing_docs)]

/// Canonicalization helpers for deterministic signing input.
pub mod canonicalizer;
/// Recipient hashing, salts and UID derivation.
pub mod digest;
/// Validated identifier newtypes.
pub mod identifiers;
/// Validation errors used by canonical types.
pub mod validation;

pub use canonicalizer::{to_canonical_bytes, CanonicalizationError, Canonicalizer};
pub use digest::{derive_uid, hash_identity, normalize_identity, IdentityHash, Salt, UidKey};
pub use identifiers::{BadgeId, HttpUrl, Uid};
pub use validation::ValidationError;
