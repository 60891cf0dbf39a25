//! Signature verification against a published public key.
//!
//! This is the check a badge consumer performs after extracting the JWS from
//! a baked image. The issuer uses it to confirm its own output.

use crate::assertion::Assertion;
use crate::errors::CoreError;
use crate::keys::{KeyMaterial, KeyType};
use crate::signer::{JwsAlgorithm, ES256_SIGNATURE_LEN};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::ecdsa::signature::Verifier as _;
use pkcs8::DecodePublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15;
use rsa::signature::Verifier as _;
use rsa::RsaPublicKey;
use serde::Deserialize;
use sha2::Sha256;

/// Public half of an issuer key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyingKey {
    /// RSA public key.
    Rsa(RsaPublicKey),
    /// P-256 public key.
    Ecdsa(p256::PublicKey),
}

impl VerifyingKey {
    /// Parses a SubjectPublicKeyInfo PEM (`PUBLIC KEY`) or PKCS#1 `RSA PUBLIC KEY`.
    pub fn from_pem(pem: &str) -> Result<Self, CoreError> {
        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(VerifyingKey::Rsa(key));
        }
        if let Ok(key) = p256::PublicKey::from_public_key_pem(pem) {
            return Ok(VerifyingKey::Ecdsa(key));
        }
        RsaPublicKey::from_pkcs1_pem(pem)
            .map(VerifyingKey::Rsa)
            .map_err(|_| {
                CoreError::UnsupportedKeyType("not an RSA or P-256 public key".to_string())
            })
    }

    /// Public key of a loaded private key.
    pub fn from_key_material(key: &KeyMaterial) -> Self {
        match key {
            KeyMaterial::Rsa(key) => VerifyingKey::Rsa(RsaPublicKey::from(key)),
            KeyMaterial::Ecdsa(key) => VerifyingKey::Ecdsa(key.public_key()),
        }
    }

    /// Algorithm family of this key.
    pub fn key_type(&self) -> KeyType {
        match self {
            VerifyingKey::Rsa(_) => KeyType::Rsa,
            VerifyingKey::Ecdsa(_) => KeyType::Ecdsa,
        }
    }
}

#[derive(Deserialize)]
struct JwsHeader {
    alg: JwsAlgorithm,
}

/// Verifies a JWS compact serialization and returns the signed assertion.
///
/// # Errors
///
/// - [`CoreError::KeyAlgorithmMismatch`] if the header's `alg` does not fit `key`
/// - [`CoreError::Verification`] for malformed input or a bad signature
pub fn verify_jws(compact: &str, key: &VerifyingKey) -> Result<Assertion, CoreError> {
    let parts: Vec<&str> = compact.trim().split('.').collect();
    let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
        return Err(CoreError::Verification(format!(
            "JWS has {} segments, expected 3",
            parts.len()
        )));
    };

    let header: JwsHeader = serde_json::from_slice(&decode_segment("header", header_b64)?)
        .map_err(|e| CoreError::Verification(format!("JWS header: {e}")))?;
    if header.alg.key_type() != key.key_type() {
        return Err(CoreError::KeyAlgorithmMismatch {
            expected: key.key_type(),
            actual: header.alg.key_type(),
        });
    }

    let signature = decode_segment("signature", signature_b64)?;
    let signing_input = format!("{}.{}", header_b64, payload_b64);

    match key {
        VerifyingKey::Rsa(public) => {
            let signature = pkcs1v15::Signature::try_from(signature.as_slice())
                .map_err(|e| CoreError::Verification(e.to_string()))?;
            pkcs1v15::VerifyingKey::<Sha256>::new(public.clone())
                .verify(signing_input.as_bytes(), &signature)
                .map_err(|_| CoreError::Verification("RS256 signature mismatch".to_string()))?;
        }
        VerifyingKey::Ecdsa(public) => {
            if signature.len() != ES256_SIGNATURE_LEN {
                return Err(CoreError::Verification(format!(
                    "ES256 signature is {} bytes, expected {}",
                    signature.len(),
                    ES256_SIGNATURE_LEN
                )));
            }
            let signature = p256::ecdsa::Signature::from_slice(&signature)
                .map_err(|e| CoreError::Verification(e.to_string()))?;
            p256::ecdsa::VerifyingKey::from(public)
                .verify(signing_input.as_bytes(), &signature)
                .map_err(|_| CoreError::Verification("ES256 signature mismatch".to_string()))?;
        }
    }

    Assertion::from_json(&decode_segment("payload", payload_b64)?)
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, CoreError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CoreError::Verification(format!("JWS {name}: {e}")))
}
