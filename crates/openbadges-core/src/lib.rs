//! Key loading, assertion construction and signing for Open Badges.
//!
//! This crate provides:
//! - Structural classification of issuer private keys (RSA, ECDSA P-256)
//! - The Open Badges assertion document and its builder
//! - JWS (RS256 / ES256) signing over the canonical assertion bytes
//! - Verification of a JWS against a published public key
//!
//! Core invariants:
//! - Recipient identities only ever appear hashed and salted
//! - The assertion UID is derived from (badge, recipient) and never changes after building
//! - A signer never signs with key material of another family
//!
#![deny(missing_docs)]

/// Assertion document and builder.
pub mod assertion;
/// Badge definition record.
pub mod definition;
/// Error types for core operations.
pub mod errors;
/// Private key loading.
pub mod keys;
/// JWS signer.
pub mod signer;
/// JWS verification.
pub mod verification;

pub use assertion::{
    validate_expiration, Assertion, AssertionRequest, Evidence, Recipient, VerificationMethod,
};
pub use definition::BadgeDefinition;
pub use errors::CoreError;
pub use keys::{detect_key_type, load_key, KeyMaterial, KeyType};
pub use signer::{JwsAlgorithm, Signature, Signer};
pub use verification::{verify_jws, VerifyingKey};
