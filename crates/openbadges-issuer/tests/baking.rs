use chrono::{TimeZone, Utc};
use openbadges_canonical::{BadgeId, HttpUrl, UidKey};
use openbadges_core::{
    verify_jws, Assertion, AssertionRequest, BadgeDefinition, KeyMaterial, Signature, Signer,
    VerifyingKey,
};
use openbadges_issuer::svg::OPENBADGES_NAMESPACE;
use openbadges_issuer::{bake, extract, BakeError, ImageFormat};
use p256::pkcs8::EncodePrivateKey;
use pkcs8::LineEnding;
use rand::rngs::OsRng;
use std::path::PathBuf;

const CARRIER: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<!-- Biology 101 -->
<svg xmlns="http://www.w3.org/2000/svg" width="120" height="120" viewBox="0 0 120 120">
  <circle cx="60" cy="60" r="50" fill="#2a7"/>
</svg>
"##;

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

fn make_assertion(identity: &str) -> Assertion {
    Assertion::build(
        &make_definition(),
        &AssertionRequest {
            identity,
            uid_key: &UidKey::derive(b"issuer"),
            evidence: Some("https://example.org/work/42"),
            no_evidence: false,
            expires_days: None,
            issued_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        },
    )
    .unwrap()
}

fn make_key() -> KeyMaterial {
    let pem = p256::SecretKey::random(&mut OsRng)
        .to_pkcs8_pem(LineEnding::LF)
        .unwrap();
    KeyMaterial::load(pem.as_bytes()).unwrap()
}

fn signed(identity: &str, key: &KeyMaterial) -> (Assertion, Signature) {
    let assertion = make_assertion(identity);
    let signature = Signer::for_key(key).sign(&assertion, key).unwrap();
    (assertion, signature)
}

#[test]
fn baked_svg_round_trips_and_verifies() {
    let key = make_key();
    let (assertion, signature) = signed("alice@example.org", &key);

    let baked = bake(CARRIER.as_bytes(), &assertion, &signature).unwrap();
    assert_eq!(baked.format(), ImageFormat::Svg);

    let text = std::str::from_utf8(baked.bytes()).unwrap();
    assert!(text.starts_with("<?xml"));
    assert!(text.contains(&format!("xmlns:openbadges=\"{OPENBADGES_NAMESPACE}\"")));
    assert!(text.contains("<circle cx=\"60\""));
    assert!(text.trim_end().ends_with("</svg>"));

    let embedded = extract(baked.bytes()).unwrap();
    assert_eq!(embedded.jws, signature.to_compact());
    let json = embedded.json.unwrap();
    assert_eq!(json.as_bytes(), assertion.canonical_bytes().unwrap().as_slice());

    let verified = verify_jws(&embedded.jws, &VerifyingKey::from_key_material(&key)).unwrap();
    assert_eq!(verified, assertion);
}

#[test]
fn assertion_is_first_child_of_root() {
    let key = make_key();
    let (assertion, signature) = signed("alice@example.org", &key);
    let baked = bake(CARRIER.as_bytes(), &assertion, &signature).unwrap();
    let text = std::str::from_utf8(baked.bytes()).unwrap();

    let root_end = text.find("viewBox=\"0 0 120 120\"").unwrap();
    let after_root = &text[root_end..];
    let gt = after_root.find('>').unwrap();
    assert!(after_root[gt + 1..].starts_with("<openbadges:assertion verify=\""));
}

#[test]
fn existing_namespace_declaration_is_reused() {
    let key = make_key();
    let (assertion, signature) = signed("alice@example.org", &key);
    let carrier = r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:openbadges="http://openbadges.org"><g/></svg>"#;

    let baked = bake(carrier.as_bytes(), &assertion, &signature).unwrap();
    let text = std::str::from_utf8(baked.bytes()).unwrap();
    assert_eq!(text.matches("xmlns:openbadges=").count(), 1);
}

#[test]
fn conflicting_namespace_binding_fails() {
    let key = make_key();
    let (assertion, signature) = signed("alice@example.org", &key);
    let carrier = r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:openbadges="urn:other"><g/></svg>"#;

    let err = bake(carrier.as_bytes(), &assertion, &signature).unwrap_err();
    assert!(matches!(err, BakeError::BakeFailure(_)));
}

#[test]
fn self_closing_root_is_expanded() {
    let key = make_key();
    let (assertion, signature) = signed("alice@example.org", &key);
    let carrier = r#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1" />"#;

    let baked = bake(carrier.as_bytes(), &assertion, &signature).unwrap();
    let text = std::str::from_utf8(baked.bytes()).unwrap();
    assert!(text.starts_with(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"1\" height=\"1\" xmlns:openbadges=\"http://openbadges.org\"><openbadges:assertion"
    ));
    assert!(text.ends_with("</openbadges:assertion></svg>"));
    assert_eq!(extract(baked.bytes()).unwrap().jws, signature.to_compact());
}

#[test]
fn missing_closing_tag_fails() {
    let key = make_key();
    let (assertion, signature) = signed("alice@example.org", &key);
    let carrier = r#"<svg xmlns="http://www.w3.org/2000/svg"><g/>"#;

    let err = bake(carrier.as_bytes(), &assertion, &signature).unwrap_err();
    assert!(matches!(err, BakeError::BakeFailure(_)));
}

#[test]
fn already_baked_image_is_refused() {
    let key = make_key();
    let (assertion, signature) = signed("alice@example.org", &key);
    let baked = bake(CARRIER.as_bytes(), &assertion, &signature).unwrap();

    let (other, other_signature) = signed("bob@example.org", &key);
    let err = bake(baked.bytes(), &other, &other_signature).unwrap_err();
    assert!(matches!(err, BakeError::BakeFailure(_)));
}

#[test]
fn signature_over_other_assertion_is_refused() {
    let key = make_key();
    let (_, alice_signature) = signed("alice@example.org", &key);
    let (bob, _) = signed("bob@example.org", &key);

    let err = bake(CARRIER.as_bytes(), &bob, &alice_signature).unwrap_err();
    assert!(matches!(err, BakeError::BakeFailure(_)));
}

#[test]
fn png_carrier_is_unsupported() {
    let key = make_key();
    let (assertion, signature) = signed("alice@example.org", &key);
    let png = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    match bake(png, &assertion, &signature) {
        Err(BakeError::UnsupportedImageFormat(name)) => assert_eq!(name, "PNG"),
        other => panic!("expected UnsupportedImageFormat, got {other:?}"),
    }
}

#[test]
fn extract_reports_missing_assertion() {
    assert!(matches!(
        extract(CARRIER.as_bytes()),
        Err(BakeError::MissingAssertion)
    ));
}
