use thiserror::Error;

use crate::keys::KeyType;

/// Core error types.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Key bytes do not belong to any supported algorithm family.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),
    /// Key family was recognized but its encoding is invalid.
    #[error("malformed {family} key: {reason}")]
    MalformedKey {
        /// Family detected from the key's structural markers.
        family: KeyType,
        /// Reason for invalidity.
        reason: String,
    },
    /// Signer and key material belong to different algorithm families.
    #[error("signer expects a {expected} key but was handed a {actual} key")]
    KeyAlgorithmMismatch {
        /// Family the signer was constructed for.
        expected: KeyType,
        /// Family of the supplied key material.
        actual: KeyType,
    },
    /// The cryptographic backend failed to produce a usable signature.
    #[error("signing failed: {0}")]
    SigningFailure(String),
    /// Evidence and no-evidence were both set or both absent.
    #[error("invalid evidence specification: {0}")]
    InvalidEvidenceSpec(String),
    /// Expiration was requested with a non-positive number of days.
    #[error("invalid expiration: {0}")]
    InvalidExpiration(String),
    /// A signature did not verify, or a JWS could not be decoded.
    #[error("verification failed: {0}")]
    Verification(String),
    /// Field validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] openbadges_canonical::ValidationError),
    /// Canonicalization error.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] openbadges_canonical::CanonicalizationError),
}

impl CoreError {
    /// True for the key-related failures (`UnsupportedKeyType`, `MalformedKey`, `KeyAlgorithmMismatch`).
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            CoreError::UnsupportedKeyType(_)
                | CoreError::MalformedKey { .. }
                | CoreError::KeyAlgorithmMismatch { .. }
        )
    }
}
