//! Open Badges assertion document and its builder.

use crate::definition::BadgeDefinition;
use crate::errors::CoreError;
use chrono::{DateTime, Utc};
use openbadges_canonical::{
    derive_uid, hash_identity, to_canonical_bytes, HttpUrl, IdentityHash, Salt, Uid, UidKey,
};
use serde::{Deserialize, Serialize};

/// Seconds in one day of expiration.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Evidence input, resolved from the mutually exclusive evidence flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// Public URL documenting the recipient's work.
    Url(HttpUrl),
    /// The issuer explicitly declined to attach evidence.
    Absent,
}

impl Evidence {
    /// Resolves the `evidence` / `no_evidence` pair; exactly one must be set.
    pub fn resolve(evidence: Option<&str>, no_evidence: bool) -> Result<Self, CoreError> {
        match (evidence, no_evidence) {
            (Some(_), true) => Err(CoreError::InvalidEvidenceSpec(
                "an evidence URL and the no-evidence flag are mutually exclusive".to_string(),
            )),
            (None, false) => Err(CoreError::InvalidEvidenceSpec(
                "either an evidence URL or the no-evidence flag is required".to_string(),
            )),
            (Some(url), false) => HttpUrl::parse(url)
                .map(Evidence::Url)
                .map_err(|e| CoreError::InvalidEvidenceSpec(e.to_string())),
            (None, true) => Ok(Evidence::Absent),
        }
    }

    fn into_url(self) -> Option<HttpUrl> {
        match self {
            Evidence::Url(url) => Some(url),
            Evidence::Absent => None,
        }
    }
}

/// Validates an expiration request; `None` means the badge never expires.
pub fn validate_expiration(expires_days: Option<i64>) -> Result<Option<i64>, CoreError> {
    match expires_days {
        Some(days) if days <= 0 => Err(CoreError::InvalidExpiration(format!(
            "expiration must be a positive number of days, got {days}"
        ))),
        Some(days) => days
            .checked_mul(SECONDS_PER_DAY)
            .map(|_| Some(days))
            .ok_or_else(|| CoreError::InvalidExpiration(format!("{days} days is out of range"))),
        None => Ok(None),
    }
}

/// Kind of recipient identity being hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    /// Email address.
    Email,
}

/// Hashed recipient object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Identity type (always `email`).
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    /// Whether `identity` is hashed (always `true` for assertions built here).
    pub hashed: bool,
    /// Salt appended to the identity before hashing.
    pub salt: Salt,
    /// `sha256$<hex>` hash of identity + salt.
    pub identity: IdentityHash,
}

impl Recipient {
    /// True if `identity` is the recipient this object was built for.
    pub fn matches(&self, identity: &str) -> bool {
        self.hashed && self.identity.matches(identity, &self.salt)
    }
}

/// Verification method type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationType {
    /// Signed assertion verified against a public key.
    Signed,
}

/// How a consumer verifies the assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMethod {
    /// Always `signed`.
    #[serde(rename = "type")]
    pub verification_type: VerificationType,
    /// URL of the issuer's public key.
    pub url: HttpUrl,
}

/// Signed badge assertion.
///
/// Field names follow the Open Badges 1.0 assertion vocabulary; timestamps
/// are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Issuer-keyed identifier for the badge/recipient pair.
    pub uid: Uid,
    /// Hashed recipient.
    pub recipient: Recipient,
    /// URL of the BadgeClass JSON.
    pub badge: HttpUrl,
    /// Verification method.
    pub verify: VerificationMethod,
    /// Issuance time.
    #[serde(rename = "issuedOn")]
    pub issued_on: i64,
    /// URL of the badge image.
    pub image: HttpUrl,
    /// Evidence URL; omitted when the issuer declared no evidence.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub evidence: Option<HttpUrl>,
    /// Expiration time; omitted when the badge does not expire.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires: Option<i64>,
}

/// Inputs for [`Assertion::build`] besides the badge definition.
#[derive(Debug, Clone)]
pub struct AssertionRequest<'a> {
    /// Plaintext recipient identity (email).
    pub identity: &'a str,
    /// Issuer key the UID is derived under.
    pub uid_key: &'a UidKey,
    /// Evidence URL, if any.
    pub evidence: Option<&'a str>,
    /// Explicit no-evidence flag.
    pub no_evidence: bool,
    /// Days until expiration, if the badge expires.
    pub expires_days: Option<i64>,
    /// Issuance time.
    pub issued_at: DateTime<Utc>,
}

impl Assertion {
    /// Builds an assertion with a freshly generated salt.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidEvidenceSpec`] if evidence and no-evidence are both set or both absent
    /// - [`CoreError::InvalidExpiration`] if `expires_days` is not positive
    /// - [`CoreError::Validation`] if the identity is empty
    pub fn build(
        definition: &BadgeDefinition,
        request: &AssertionRequest<'_>,
    ) -> Result<Self, CoreError> {
        Self::build_with_salt(definition, request, Salt::generate())
    }

    /// Builds an assertion with a caller-supplied salt.
    pub fn build_with_salt(
        definition: &BadgeDefinition,
        request: &AssertionRequest<'_>,
        salt: Salt,
    ) -> Result<Self, CoreError> {
        let evidence = Evidence::resolve(request.evidence, request.no_evidence)?;
        let expires_days = validate_expiration(request.expires_days)?;

        let uid = derive_uid(request.uid_key, &definition.id, request.identity)?;
        let identity = hash_identity(request.identity, &salt)?;

        let issued_on = request.issued_at.timestamp();
        let expires = match expires_days {
            Some(days) => Some(
                issued_on
                    .checked_add(days * SECONDS_PER_DAY)
                    .ok_or_else(|| CoreError::InvalidExpiration(format!("{days} days is out of range")))?,
            ),
            None => None,
        };

        Ok(Assertion {
            uid,
            recipient: Recipient {
                identity_type: IdentityType::Email,
                hashed: true,
                salt,
                identity,
            },
            badge: definition.json_url.clone(),
            verify: VerificationMethod {
                verification_type: VerificationType::Signed,
                url: definition.verify_key_url.clone(),
            },
            issued_on,
            image: definition.image_url.clone(),
            evidence: evidence.into_url(),
            expires,
        })
    }

    /// RFC 8785 encoding used as JWS payload and as the baked CDATA text.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(to_canonical_bytes(self)?)
    }

    /// Parses an assertion from JSON, e.g. a verified JWS payload.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        let assertion: Assertion = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::Verification(format!("assertion JSON: {e}")))?;
        Ok(assertion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use openbadges_canonical::BadgeId;
    use std::path::PathBuf;

    fn definition() -> BadgeDefinition {
        BadgeDefinition {
            id: BadgeId::parse("bio101").unwrap(),
            name: "Biology 101".to_string(),
            json_url: HttpUrl::parse("https://example.org/badges/bio101.json").unwrap(),
            image_url: HttpUrl::parse("https://example.org/badges/bio101.svg").unwrap(),
            verify_key_url: HttpUrl::parse("https://example.org/keys/issuer.pem").unwrap(),
            local_image: PathBuf::from("bio101.svg"),
            private_key: PathBuf::from("issuer.pem"),
        }
    }

    static UID_KEY: std::sync::OnceLock<UidKey> = std::sync::OnceLock::new();

    fn request(evidence: Option<&str>, no_evidence: bool, expires: Option<i64>) -> AssertionRequest<'_> {
        AssertionRequest {
            identity: "alice@example.org",
            uid_key: UID_KEY.get_or_init(|| UidKey::derive(b"issuer")),
            evidence,
            no_evidence,
            expires_days: expires,
            issued_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn evidence_flags_must_be_exclusive() {
        let def = definition();
        for (evidence, no_evidence) in [(Some("https://e.org/w"), true), (None, false)] {
            let err = Assertion::build(&def, &request(evidence, no_evidence, None)).unwrap_err();
            assert!(matches!(err, CoreError::InvalidEvidenceSpec(_)));
        }
    }

    #[test]
    fn evidence_url_is_embedded() {
        let assertion = Assertion::build(
            &definition(),
            &request(Some("https://example.org/work/42"), false, None),
        )
        .unwrap();
        assert_eq!(
            assertion.evidence.as_ref().map(|u| u.as_str()),
            Some("https://example.org/work/42")
        );
    }

    #[test]
    fn evidence_must_be_http_url() {
        let err = Evidence::resolve(Some("file:///etc/passwd"), false).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEvidenceSpec(_)));
    }

    #[test]
    fn expiration_is_whole_days_after_issuance() {
        let assertion = Assertion::build(&definition(), &request(None, true, Some(30))).unwrap();
        assert_eq!(assertion.expires, Some(assertion.issued_on + 30 * 86_400));
    }

    #[test]
    fn non_positive_expiration_is_rejected() {
        for days in [0, -1] {
            let err = Assertion::build(&definition(), &request(None, true, Some(days))).unwrap_err();
            assert!(matches!(err, CoreError::InvalidExpiration(_)));
        }
        assert!(validate_expiration(Some(i64::MAX)).is_err());
    }

    #[test]
    fn identity_is_hashed_not_plaintext() {
        let assertion = Assertion::build(&definition(), &request(None, true, None)).unwrap();
        let json = String::from_utf8(assertion.canonical_bytes().unwrap()).unwrap();
        assert!(!json.contains("alice@example.org"));
        assert!(assertion.recipient.matches("alice@example.org"));
        assert!(json.contains(assertion.recipient.salt.as_str()));
    }

    #[test]
    fn absent_optional_fields_are_omitted() {
        let assertion = Assertion::build(&definition(), &request(None, true, None)).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&assertion.canonical_bytes().unwrap()).unwrap();
        assert!(json.get("evidence").is_none());
        assert!(json.get("expires").is_none());
        assert_eq!(json["verify"]["type"], "signed");
        assert_eq!(json["recipient"]["type"], "email");
        assert_eq!(json["issuedOn"], 1_704_067_200);
    }

    #[test]
    fn uid_is_stable_for_the_same_pair() {
        let a = Assertion::build(&definition(), &request(None, true, None)).unwrap();
        let b = Assertion::build(&definition(), &request(None, true, Some(5))).unwrap();
        assert_eq!(a.uid, b.uid);
        assert_ne!(a.recipient.salt, b.recipient.salt);
    }

    #[test]
    fn uid_depends_on_the_issuer_key() {
        let other_key = UidKey::derive(b"another issuer");
        let a = Assertion::build(&definition(), &request(None, true, None)).unwrap();
        let b = Assertion::build(
            &definition(),
            &AssertionRequest {
                uid_key: &other_key,
                ..request(None, true, None)
            },
        )
        .unwrap();
        assert_ne!(a.uid, b.uid);
    }
}
