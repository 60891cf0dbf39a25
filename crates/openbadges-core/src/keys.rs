//! Private key classification and loading.
//!
//! Keys are classified by what the bytes say about themselves: the PEM label,
//! and for PKCS#8 containers the algorithm OID and curve parameters. File names
//! are never consulted.

use crate::errors::CoreError;
use openbadges_canonical::UidKey;
use pkcs8::der::{pem, Decode, Header, SliceReader};
use pkcs8::spki::AlgorithmIdentifierRef;
use pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding, ObjectIdentifier, PrivateKeyInfo};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::traits::PrivateKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use zeroize::Zeroizing;

/// `rsaEncryption` (PKCS #1).
const RSA_ENCRYPTION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// `id-ecPublicKey` (RFC 5480).
const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
/// `secp256r1` / NIST P-256.
const P256_CURVE_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

const PEM_BEGIN: &str = "-----BEGIN ";
const PEM_DASHES: &str = "-----";
/// OpenSSL writes this block ahead of SEC1 keys; it carries no key material.
const EC_PARAMETERS_LABEL: &str = "EC PARAMETERS";

/// Supported key algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// RSA, signed as RS256.
    Rsa,
    /// ECDSA over P-256, signed as ES256.
    Ecdsa,
    /// Bytes that match no supported family.
    Unknown,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Rsa => write!(f, "RSA"),
            KeyType::Ecdsa => write!(f, "ECDSA"),
            KeyType::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Pkcs1,
    Sec1,
    Pkcs8,
}

/// Result of structural classification, DER already extracted.
struct Classified {
    family: KeyType,
    encoding: Encoding,
    der: Zeroizing<Vec<u8>>,
}

/// A loaded issuer private key.
///
/// Only the two supported families are representable, so every signing
/// routine is selected by an exhaustive match. Both inner key types zeroize
/// their secrets on drop.
pub enum KeyMaterial {
    /// RSA private key.
    Rsa(RsaPrivateKey),
    /// P-256 private key.
    Ecdsa(p256::SecretKey),
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial::{}(<redacted>)", self.key_type())
    }
}

impl KeyMaterial {
    /// Parses and classifies raw private key bytes.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedKeyType`] if the bytes match no supported family
    /// - [`CoreError::MalformedKey`] if the family is recognized but the encoding is invalid
    pub fn load(raw: &[u8]) -> Result<Self, CoreError> {
        let classified = classify(raw)?;
        let der = classified.der.as_slice();

        match classified.family {
            KeyType::Rsa => {
                let key = match classified.encoding {
                    Encoding::Pkcs1 => RsaPrivateKey::from_pkcs1_der(der)
                        .map_err(|e| malformed(KeyType::Rsa, e))?,
                    _ => RsaPrivateKey::from_pkcs8_der(der)
                        .map_err(|e| malformed(KeyType::Rsa, e))?,
                };
                key.validate().map_err(|e| malformed(KeyType::Rsa, e))?;
                Ok(KeyMaterial::Rsa(key))
            }
            KeyType::Ecdsa => {
                let key = match classified.encoding {
                    Encoding::Sec1 => p256::SecretKey::from_sec1_der(der)
                        .map_err(|e| malformed(KeyType::Ecdsa, e))?,
                    _ => p256::SecretKey::from_pkcs8_der(der)
                        .map_err(|e| malformed(KeyType::Ecdsa, e))?,
                };
                Ok(KeyMaterial::Ecdsa(key))
            }
            KeyType::Unknown => Err(CoreError::UnsupportedKeyType(
                "no supported algorithm family".to_string(),
            )),
        }
    }

    /// Algorithm family of this key.
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyMaterial::Rsa(_) => KeyType::Rsa,
            KeyMaterial::Ecdsa(_) => KeyType::Ecdsa,
        }
    }

    /// Issuer secret for UID derivation, taken from the private scalar or exponent.
    ///
    /// Independent of the file encoding: the same key as PKCS#1, SEC1 or PKCS#8
    /// yields the same UIDs.
    pub fn uid_key(&self) -> UidKey {
        match self {
            KeyMaterial::Rsa(key) => UidKey::derive(&Zeroizing::new(key.d().to_bytes_be())),
            KeyMaterial::Ecdsa(key) => UidKey::derive(&key.to_bytes()),
        }
    }

    /// SubjectPublicKeyInfo PEM of the matching public key, as published at the verify URL.
    pub fn public_key_pem(&self) -> Result<String, CoreError> {
        let pem = match self {
            KeyMaterial::Rsa(key) => RsaPublicKey::from(key).to_public_key_pem(LineEnding::LF),
            KeyMaterial::Ecdsa(key) => key.public_key().to_public_key_pem(LineEnding::LF),
        };
        pem.map_err(|e| CoreError::SigningFailure(format!("public key encoding: {e}")))
    }
}

/// Loads a private key; shorthand for [`KeyMaterial::load`].
pub fn load_key(raw: &[u8]) -> Result<KeyMaterial, CoreError> {
    KeyMaterial::load(raw)
}

/// Reports the algorithm family of raw key bytes without building key material.
///
/// Returns [`KeyType::Unknown`] for anything [`KeyMaterial::load`] would reject
/// before attempting a family-specific parse.
pub fn detect_key_type(raw: &[u8]) -> KeyType {
    match classify(raw) {
        Ok(classified) => classified.family,
        Err(CoreError::MalformedKey { family, .. }) => family,
        Err(_) => KeyType::Unknown,
    }
}

fn malformed(family: KeyType, reason: impl fmt::Display) -> CoreError {
    CoreError::MalformedKey {
        family,
        reason: reason.to_string(),
    }
}

fn classify(raw: &[u8]) -> Result<Classified, CoreError> {
    if let Some(text) = std::str::from_utf8(raw)
        .ok()
        .filter(|text| text.contains(PEM_BEGIN))
    {
        return classify_pem(text);
    }

    // Unarmored input is only accepted as PKCS#8 DER.
    if raw.first() == Some(&0x30) {
        match PrivateKeyInfo::try_from(raw) {
            Ok(info) => {
                let family = family_from_algorithm(&info.algorithm)?;
                return Ok(Classified {
                    family,
                    encoding: Encoding::Pkcs8,
                    der: Zeroizing::new(raw.to_vec()),
                });
            }
            Err(e) => {
                if let Some(family) = family_from_pkcs8_prefix(raw) {
                    return Err(malformed(family, e));
                }
            }
        }
    }

    Err(CoreError::UnsupportedKeyType(
        "neither a PEM private key nor PKCS#8 DER".to_string(),
    ))
}

fn classify_pem(text: &str) -> Result<Classified, CoreError> {
    let (label, block) = find_pem_block(text)?;

    let (family, encoding) = match label {
        "RSA PRIVATE KEY" => (KeyType::Rsa, Encoding::Pkcs1),
        "EC PRIVATE KEY" => (KeyType::Ecdsa, Encoding::Sec1),
        "PRIVATE KEY" => (KeyType::Unknown, Encoding::Pkcs8),
        other => {
            return Err(CoreError::UnsupportedKeyType(format!(
                "PEM label '{other}'"
            )))
        }
    };

    let block = block.ok_or_else(|| malformed(family, format!("missing END {label} marker")))?;
    let (_, der) = pem::decode_vec(block.as_bytes()).map_err(|e| malformed(family, e))?;
    let der = Zeroizing::new(der);

    let family = match encoding {
        Encoding::Pkcs8 => {
            let info = PrivateKeyInfo::try_from(der.as_slice())
                .map_err(|e| malformed(KeyType::Unknown, e))?;
            family_from_algorithm(&info.algorithm)?
        }
        Encoding::Sec1 => {
            let ec = sec1::EcPrivateKey::try_from(der.as_slice())
                .map_err(|e| malformed(KeyType::Ecdsa, e))?;
            match ec.parameters.and_then(|p| p.named_curve()) {
                Some(curve) if curve != P256_CURVE_OID => {
                    return Err(CoreError::UnsupportedKeyType(format!(
                        "elliptic curve {curve}"
                    )))
                }
                _ => KeyType::Ecdsa,
            }
        }
        Encoding::Pkcs1 => family,
    };

    Ok(Classified {
        family,
        encoding,
        der,
    })
}

fn family_from_algorithm(algorithm: &AlgorithmIdentifierRef<'_>) -> Result<KeyType, CoreError> {
    let oid = algorithm.oid;
    if oid == RSA_ENCRYPTION_OID {
        Ok(KeyType::Rsa)
    } else if oid == EC_PUBLIC_KEY_OID {
        let curve = algorithm
            .parameters_oid()
            .map_err(|e| malformed(KeyType::Ecdsa, e))?;
        if curve == P256_CURVE_OID {
            Ok(KeyType::Ecdsa)
        } else {
            Err(CoreError::UnsupportedKeyType(format!(
                "elliptic curve {curve}"
            )))
        }
    } else {
        Err(CoreError::UnsupportedKeyType(format!("algorithm {oid}")))
    }
}

/// Reads `version` and `privateKeyAlgorithm` off the front of a PKCS#8
/// document whose body is incomplete. The outer length is not checked.
fn family_from_pkcs8_prefix(raw: &[u8]) -> Option<KeyType> {
    let mut reader = SliceReader::new(raw).ok()?;
    Header::decode(&mut reader).ok()?;
    u8::decode(&mut reader).ok()?;
    let algorithm = AlgorithmIdentifierRef::decode(&mut reader).ok()?;
    family_from_algorithm(&algorithm).ok()
}

/// Finds the first key-bearing PEM block: its label and, if terminated, the
/// full `BEGIN..END` text.
fn find_pem_block(text: &str) -> Result<(&str, Option<&str>), CoreError> {
    let mut offset = 0;
    while let Some(found) = text[offset..].find(PEM_BEGIN) {
        let start = offset + found;
        let after = &text[start + PEM_BEGIN.len()..];
        let label_len = after
            .find(PEM_DASHES)
            .ok_or_else(|| malformed(KeyType::Unknown, "unterminated PEM header"))?;
        let label = &after[..label_len];

        if label == EC_PARAMETERS_LABEL {
            offset = start + PEM_BEGIN.len() + label_len;
            continue;
        }

        let end_marker = format!("-----END {label}-----");
        let block = text[start..]
            .find(&end_marker)
            .map(|end| &text[start..start + end + end_marker.len()]);
        return Ok((label, block));
    }

    Err(CoreError::UnsupportedKeyType(
        "no private key PEM block".to_string(),
    ))
}
