//! JWS signing of assertions.
//!
//! Signatures are JWS compact serializations (`header.payload.signature`,
//! base64url without padding) over the RFC 8785 bytes of the assertion, which
//! is what Open Badges signed verification expects to find in a baked image.

use crate::assertion::Assertion;
use crate::errors::CoreError;
use crate::keys::{KeyMaterial, KeyType};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use openbadges_canonical::{to_canonical_bytes, Uid};
use p256::ecdsa::signature::Signer as _;
use rsa::pkcs1v15;
use rsa::signature::{SignatureEncoding, Signer as _};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::fmt;

/// Length of a JOSE ES256 signature (`r || s`, 32 bytes each).
pub const ES256_SIGNATURE_LEN: usize = 64;

/// JWS algorithms this issuer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JwsAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RS256,
    /// ECDSA P-256 with SHA-256.
    ES256,
}

impl JwsAlgorithm {
    /// The JOSE `alg` value.
    pub fn as_str(self) -> &'static str {
        match self {
            JwsAlgorithm::RS256 => "RS256",
            JwsAlgorithm::ES256 => "ES256",
        }
    }

    /// Key family that produces this algorithm.
    pub fn key_type(self) -> KeyType {
        match self {
            JwsAlgorithm::RS256 => KeyType::Rsa,
            JwsAlgorithm::ES256 => KeyType::Ecdsa,
        }
    }

    fn for_key_type(family: KeyType) -> Option<Self> {
        match family {
            KeyType::Rsa => Some(JwsAlgorithm::RS256),
            KeyType::Ecdsa => Some(JwsAlgorithm::ES256),
            KeyType::Unknown => None,
        }
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detached signature over one assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    alg: JwsAlgorithm,
    uid: Uid,
    signing_input: String,
    bytes: Vec<u8>,
}

impl Signature {
    /// Algorithm tag; always matches the signing key's family.
    pub fn alg(&self) -> JwsAlgorithm {
        self.alg
    }

    /// UID of the assertion this signature covers.
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Raw signature bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// JWS compact serialization.
    pub fn to_compact(&self) -> String {
        format!(
            "{}.{}",
            self.signing_input,
            URL_SAFE_NO_PAD.encode(&self.bytes)
        )
    }

    /// True if this signature's payload is exactly the canonical form of `assertion`.
    pub fn covers(&self, assertion: &Assertion) -> Result<bool, CoreError> {
        let payload = URL_SAFE_NO_PAD.encode(assertion.canonical_bytes()?);
        let signed_payload = self.signing_input.split('.').nth(1).unwrap_or_default();
        Ok(self.uid == assertion.uid && signed_payload == payload)
    }
}

/// Signer bound to one key family.
///
/// Construct it for the family the configuration expects; handing it key
/// material of the other family fails instead of silently switching
/// algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signer {
    alg: JwsAlgorithm,
}

impl Signer {
    /// Creates a signer for `family`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedKeyType`] for [`KeyType::Unknown`].
    pub fn new(family: KeyType) -> Result<Self, CoreError> {
        JwsAlgorithm::for_key_type(family)
            .map(|alg| Self { alg })
            .ok_or_else(|| CoreError::UnsupportedKeyType(format!("no signer for {family} keys")))
    }

    /// Creates a signer matching the family of `key`.
    pub fn for_key(key: &KeyMaterial) -> Self {
        match key {
            KeyMaterial::Rsa(_) => Self {
                alg: JwsAlgorithm::RS256,
            },
            KeyMaterial::Ecdsa(_) => Self {
                alg: JwsAlgorithm::ES256,
            },
        }
    }

    /// Algorithm this signer emits.
    pub fn alg(&self) -> JwsAlgorithm {
        self.alg
    }

    /// Signs the canonical form of `assertion`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::KeyAlgorithmMismatch`] if `key` is not of this signer's family
    /// - [`CoreError::SigningFailure`] if the backend fails or returns a signature of the wrong length
    pub fn sign(&self, assertion: &Assertion, key: &KeyMaterial) -> Result<Signature, CoreError> {
        let expected = self.alg.key_type();
        if key.key_type() != expected {
            return Err(CoreError::KeyAlgorithmMismatch {
                expected,
                actual: key.key_type(),
            });
        }

        let header = to_canonical_bytes(&json!({ "alg": self.alg.as_str() }))?;
        let payload = assertion.canonical_bytes()?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let bytes = match key {
            KeyMaterial::Rsa(key) => sign_rs256(key, signing_input.as_bytes())?,
            KeyMaterial::Ecdsa(key) => sign_es256(key, signing_input.as_bytes())?,
        };

        Ok(Signature {
            alg: self.alg,
            uid: assertion.uid.clone(),
            signing_input,
            bytes,
        })
    }
}

fn sign_rs256(key: &rsa::RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>, CoreError> {
    let expected_len = key.size();
    let signing_key = pkcs1v15::SigningKey::<Sha256>::new(key.clone());
    let signature = signing_key
        .try_sign(message)
        .map_err(|e| CoreError::SigningFailure(e.to_string()))?;
    let bytes = signature.to_vec();
    if bytes.len() != expected_len {
        return Err(CoreError::SigningFailure(format!(
            "RS256 signature is {} bytes, expected {}",
            bytes.len(),
            expected_len
        )));
    }
    Ok(bytes)
}

fn sign_es256(key: &p256::SecretKey, message: &[u8]) -> Result<Vec<u8>, CoreError> {
    let signing_key = p256::ecdsa::SigningKey::from(key);
    let signature: p256::ecdsa::Signature = signing_key
        .try_sign(message)
        .map_err(|e| CoreError::SigningFailure(e.to_string()))?;
    let bytes = signature.to_bytes().to_vec();
    if bytes.len() != ES256_SIGNATURE_LEN {
        return Err(CoreError::SigningFailure(format!(
            "ES256 signature is {} bytes, expected {}",
            bytes.len(),
            ES256_SIGNATURE_LEN
        )));
    }
    Ok(bytes)
}
