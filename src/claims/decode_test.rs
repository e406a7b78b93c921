use super::decode::*;
use crate::utils::mint_token;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde_json::json;

fn token_with_payload(payload: &str) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
        URL_SAFE_NO_PAD.encode(payload)
    )
}

#[test]
fn test_decode_returns_payload_exactly() {
    let payload = json!({
        "sub": "user_01",
        "sid": "session_01",
        "roles": ["admin", {"slug": "viewer", "name": "Viewer"}],
        "exp": 1_700_000_000,
        "nested": {"a": [1, 2, 3]}
    });
    let claims = decode(&mint_token(&payload));

    assert_eq!(serde_json::to_value(&claims).unwrap(), payload);
    assert_eq!(claims.subject(), Some("user_01"));
    assert_eq!(claims.session_id(), Some("session_01"));
    assert_eq!(claims.expires_at(), Some(1_700_000_000));
}

#[test]
fn test_decode_accepts_padded_payload() {
    let payload = r#"{"org_id":"org_12"}"#;
    let token = format!("h.{}.s", URL_SAFE.encode(payload));
    assert!(token.contains('='));

    let claims = decode(&token);
    assert_eq!(claims.organization_id(), Some("org_12"));
}

#[test]
fn test_decode_wrong_segment_count_is_empty() {
    for token in ["", "abc", "a.b", "a.b.c.d", "....."] {
        assert!(decode(token).is_empty(), "expected empty claims for {:?}", token);
    }
}

#[test]
fn test_decode_invalid_base64_is_empty() {
    assert!(decode("header.!!not-base64!!.sig").is_empty());
}

#[test]
fn test_decode_invalid_utf8_is_empty() {
    let token = format!("h.{}.s", URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0xfd]));
    assert!(decode(&token).is_empty());
}

#[test]
fn test_decode_invalid_json_is_empty() {
    assert!(decode(&token_with_payload("{not json")).is_empty());
}

#[test]
fn test_decode_non_object_payload_is_empty() {
    assert!(decode(&token_with_payload("[1,2,3]")).is_empty());
    assert!(decode(&token_with_payload("\"text\"")).is_empty());
}

#[test]
fn test_decode_ignores_header_and_signature() {
    let token = format!("garbage.{}.also-garbage", URL_SAFE_NO_PAD.encode(r#"{"sid":"s"}"#));
    assert_eq!(decode(&token).session_id(), Some("s"));
}

#[test]
fn test_expires_at_rounds_fractional_seconds_up() {
    let claims = decode(&mint_token(&json!({"exp": 1_700_000_000.75})));
    assert_eq!(claims.expires_at(), Some(1_700_000_001));
}

#[test]
fn test_fractional_expiry_is_not_expired_early() {
    let claims = decode(&mint_token(&json!({"exp": 1000.9})));
    let now = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(1_000_500).unwrap();
    assert_eq!(
        crate::claims::assess_freshness(claims.expires_at(), now, chrono::Duration::zero()),
        crate::claims::FreshnessState::Fresh
    );
}

#[test]
fn test_expires_at_ignores_non_numeric() {
    let claims = decode(&mint_token(&json!({"exp": "tomorrow"})));
    assert_eq!(claims.expires_at(), None);
}
