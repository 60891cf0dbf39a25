//! Recipient hashing and UID derivation.
//!
//! Recipient identities are published as `sha256$<hex>` where the hex is
//! `sha256(identity || salt)`, the format Open Badges verifiers recompute.
//! The salt travels in the assertion next to the hash.
//!
//! UIDs are `hmac_sha256(uid_key, domain_separator || badge_id || 0x00 || identity)`
//! truncated to 128 bits. Under one issuer key a (badge, recipient) pair always
//! maps to the same UID and therefore the same output file, while a holder of
//! the published badge cannot test guessed identities against it.

use crate::identifiers::{BadgeId, Uid};
use crate::validation::ValidationError;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Domain separator for UID derivation: `b"openbadges:uid:v1\0"`.
const UID_DOMAIN_SEPARATOR: &[u8] = b"openbadges:uid:v1\0";

/// Label hashed ahead of the issuer secret when deriving a [`UidKey`].
const UID_KEY_LABEL: &[u8] = b"openbadges:uid-key:v1\0";

/// Prefix identifying the hash algorithm in hashed recipient identities.
pub const IDENTITY_HASH_PREFIX: &str = "sha256$";

/// Number of random bytes in a freshly generated salt.
pub const SALT_LEN: usize = 16;

/// Number of UID bytes kept from the SHA-256 output.
const UID_LEN: usize = 16;

/// Salt mixed into the recipient hash, serialized as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Salt(String);

impl Salt {
    /// Draws a fresh salt from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wraps an existing salt, e.g. one read back from a baked assertion.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::Empty { field: "salt" });
        }
        Ok(Self(value))
    }

    /// Returns the salt text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hashed recipient identity (`sha256$<64 hex>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityHash(String);

impl IdentityHash {
    /// Returns the hash text including its algorithm prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks whether `identity` hashes to this value under `salt`.
    pub fn matches(&self, identity: &str, salt: &Salt) -> bool {
        match normalize_identity(identity) {
            Ok(normalized) => hash_normalized(&normalized, salt) == *self,
            Err(_) => false,
        }
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issuer-held key for UID derivation.
pub struct UidKey(Zeroizing<[u8; 32]>);

impl UidKey {
    /// Derives a UID key from issuer secret material, such as private key bytes.
    pub fn derive(secret: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(UID_KEY_LABEL);
        hasher.update(secret);

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&hasher.finalize());
        Self(key)
    }
}

impl fmt::Debug for UidKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UidKey(<redacted>)")
    }
}

/// Trims and lowercases a recipient identity.
pub fn normalize_identity(identity: &str) -> Result<String, ValidationError> {
    let trimmed = identity.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty {
            field: "recipient identity",
        });
    }
    Ok(trimmed.to_lowercase())
}

/// Hashes a recipient identity with the given salt.
pub fn hash_identity(identity: &str, salt: &Salt) -> Result<IdentityHash, ValidationError> {
    let normalized = normalize_identity(identity)?;
    Ok(hash_normalized(&normalized, salt))
}

fn hash_normalized(normalized: &str, salt: &Salt) -> IdentityHash {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(salt.as_str().as_bytes());
    IdentityHash(format!(
        "{}{}",
        IDENTITY_HASH_PREFIX,
        hex::encode(hasher.finalize())
    ))
}

/// Derives the UID for a badge/recipient pair under the issuer's key.
pub fn derive_uid(key: &UidKey, badge_id: &BadgeId, identity: &str) -> Result<Uid, ValidationError> {
    let normalized = normalize_identity(identity)?;

    let mut mac = HmacSha256::new_from_slice(key.0.as_slice())
        .map_err(|_| ValidationError::Empty { field: "uid key" })?;
    mac.update(UID_DOMAIN_SEPARATOR);
    mac.update(badge_id.as_str().as_bytes());
    mac.update(&[0u8]);
    mac.update(normalized.as_bytes());
    let tag = mac.finalize().into_bytes();

    Uid::parse(hex::encode(&tag[..UID_LEN]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn badge(id: &str) -> BadgeId {
        BadgeId::parse(id).unwrap()
    }

    fn issuer_key() -> UidKey {
        UidKey::derive(b"issuer private key bytes")
    }

    #[test]
    fn identity_hash_matches_open_badges_format() {
        let salt = Salt::new("deadsea").unwrap();
        let hash = hash_identity("mayze@example.org", &salt).unwrap();

        let expected = Sha256::digest(b"mayze@example.orgdeadsea");
        assert_eq!(
            hash.as_str(),
            format!("sha256${}", hex::encode(expected))
        );
    }

    #[test]
    fn identity_hash_ignores_case_and_surrounding_whitespace() {
        let salt = Salt::new("abc").unwrap();
        let a = hash_identity("Alice@Example.org", &salt).unwrap();
        let b = hash_identity("  alice@example.org\n", &salt).unwrap();
        assert_eq!(a, b);
        assert!(a.matches("ALICE@example.org", &salt));
        assert!(!a.matches("bob@example.org", &salt));
    }

    #[test]
    fn fresh_salts_differ() {
        let a = Salt::generate();
        let b = Salt::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), SALT_LEN * 2);
    }

    #[test]
    fn uid_is_stable_per_pair() {
        let key = issuer_key();
        let a = derive_uid(&key, &badge("bio101"), "alice@example.org").unwrap();
        let b = derive_uid(&key, &badge("bio101"), " Alice@example.org").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn uid_separates_badges_and_recipients() {
        let key = issuer_key();
        let base = derive_uid(&key, &badge("bio101"), "alice@example.org").unwrap();
        assert_ne!(base, derive_uid(&key, &badge("bio102"), "alice@example.org").unwrap());
        assert_ne!(base, derive_uid(&key, &badge("bio101"), "bob@example.org").unwrap());
        // The separator byte keeps `ab` + `c...` apart from `a` + `bc...`.
        assert_ne!(
            derive_uid(&key, &badge("ab"), "c@example.org").unwrap(),
            derive_uid(&key, &badge("a"), "bc@example.org").unwrap()
        );
    }

    #[test]
    fn uid_cannot_be_recomputed_without_the_issuer_key() {
        let uid = derive_uid(&issuer_key(), &badge("bio101"), "alice@example.org").unwrap();

        // Everything but the key is public: separator, badge id and a guessed email.
        let mut unkeyed = Sha256::new();
        unkeyed.update(UID_DOMAIN_SEPARATOR);
        unkeyed.update(b"bio101");
        unkeyed.update([0u8]);
        unkeyed.update(b"alice@example.org");
        assert_ne!(uid.as_str(), hex::encode(&unkeyed.finalize()[..UID_LEN]));

        let other_issuer = UidKey::derive(b"someone else");
        assert_ne!(
            uid,
            derive_uid(&other_issuer, &badge("bio101"), "alice@example.org").unwrap()
        );
    }

    #[test]
    fn uid_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", issuer_key()), "UidKey(<redacted>)");
    }

    #[test]
    fn empty_identity_is_rejected() {
        assert!(derive_uid(&issuer_key(), &badge("bio101"), "   ").is_err());
        assert!(hash_identity("", &Salt::generate()).is_err());
    }
}
