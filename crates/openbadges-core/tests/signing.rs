use chrono::{TimeZone, Utc};
use openbadges_canonical::{BadgeId, HttpUrl, UidKey};
use openbadges_core::{
    verify_jws, Assertion, AssertionRequest, BadgeDefinition, CoreError, JwsAlgorithm,
    KeyMaterial, KeyType, Signer, VerifyingKey,
};
use p256::pkcs8::EncodePrivateKey;
use pkcs8::LineEnding;
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use std::path::PathBuf;

fn make_definition() -> BadgeDefinition {
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

fn make_assertion() -> Assertion {
    let uid_key = UidKey::derive(b"issuer");
    let request = AssertionRequest {
        identity: "alice@example.org",
        uid_key: &uid_key,
        evidence: None,
        no_evidence: true,
        expires_days: Some(30),
        issued_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    };
    Assertion::build(&make_definition(), &request).unwrap()
}

fn rsa_pem() -> String {
    rsa::RsaPrivateKey::new(&mut OsRng, 1024)
        .unwrap()
        .to_pkcs1_pem(LineEnding::LF)
        .unwrap()
        .to_string()
}

fn ecdsa_pem() -> String {
    p256::SecretKey::random(&mut OsRng)
        .to_pkcs8_pem(LineEnding::LF)
        .unwrap()
        .to_string()
}

fn sign_and_verify(pem: &str, expected: KeyType, alg: JwsAlgorithm) {
    let key = KeyMaterial::load(pem.as_bytes()).unwrap();
    assert_eq!(key.key_type(), expected);

    let assertion = make_assertion();
    let signer = Signer::new(expected).unwrap();
    let signature = signer.sign(&assertion, &key).unwrap();
    assert_eq!(signature.alg(), alg);
    assert_eq!(signature.uid(), &assertion.uid);
    assert!(signature.covers(&assertion).unwrap());

    let public_pem = key.public_key_pem().unwrap();
    let verifying_key = VerifyingKey::from_pem(&public_pem).unwrap();
    let verified = verify_jws(&signature.to_compact(), &verifying_key).unwrap();
    assert_eq!(verified, assertion);
}

#[test]
fn rsa_key_signs_rs256_and_verifies() {
    sign_and_verify(&rsa_pem(), KeyType::Rsa, JwsAlgorithm::RS256);
}

#[test]
fn ecdsa_key_signs_es256_and_verifies() {
    sign_and_verify(&ecdsa_pem(), KeyType::Ecdsa, JwsAlgorithm::ES256);
}

#[test]
fn es256_signature_is_fixed_length() {
    let key = KeyMaterial::load(ecdsa_pem().as_bytes()).unwrap();
    let signature = Signer::for_key(&key).sign(&make_assertion(), &key).unwrap();
    assert_eq!(signature.bytes().len(), 64);
}

#[test]
fn signer_rejects_key_of_other_family() {
    let key = KeyMaterial::load(ecdsa_pem().as_bytes()).unwrap();
    let err = Signer::new(KeyType::Rsa)
        .unwrap()
        .sign(&make_assertion(), &key)
        .unwrap_err();
    match err {
        CoreError::KeyAlgorithmMismatch { expected, actual } => {
            assert_eq!(expected, KeyType::Rsa);
            assert_eq!(actual, KeyType::Ecdsa);
        }
        other => panic!("expected KeyAlgorithmMismatch, got {other}"),
    }
}

#[test]
fn jws_header_names_algorithm() {
    let key = KeyMaterial::load(rsa_pem().as_bytes()).unwrap();
    let compact = Signer::for_key(&key)
        .sign(&make_assertion(), &key)
        .unwrap()
        .to_compact();
    let header = compact.split('.').next().unwrap();
    // base64url of {"alg":"RS256"}
    assert_eq!(header, "eyJhbGciOiJSUzI1NiJ9");
}

#[test]
fn tampered_payload_fails_verification() {
    let key = KeyMaterial::load(ecdsa_pem().as_bytes()).unwrap();
    let compact = Signer::for_key(&key)
        .sign(&make_assertion(), &key)
        .unwrap()
        .to_compact();

    let mut parts: Vec<String> = compact.split('.').map(str::to_string).collect();
    let mut other = make_assertion();
    other.expires = Some(other.issued_on + 365 * 86_400);
    use base64::Engine;
    parts[1] = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(other.canonical_bytes().unwrap());

    let err = verify_jws(&parts.join("."), &VerifyingKey::from_key_material(&key)).unwrap_err();
    assert!(matches!(err, CoreError::Verification(_)));
}

#[test]
fn verification_with_wrong_key_fails() {
    let signing = KeyMaterial::load(rsa_pem().as_bytes()).unwrap();
    let unrelated = KeyMaterial::load(rsa_pem().as_bytes()).unwrap();
    let compact = Signer::for_key(&signing)
        .sign(&make_assertion(), &signing)
        .unwrap()
        .to_compact();
    assert!(verify_jws(&compact, &VerifyingKey::from_key_material(&unrelated)).is_err());
}

#[test]
fn verification_rejects_wrong_segment_count() {
    let key = KeyMaterial::load(ecdsa_pem().as_bytes()).unwrap();
    let err = verify_jws("a.b", &VerifyingKey::from_key_material(&key)).unwrap_err();
    assert!(matches!(err, CoreError::Verification(_)));
}
