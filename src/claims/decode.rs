//! Unverified access-token payload decoding
//!
//! # Security
//!
//! **Nothing in this module verifies a signature.** The decoded claims are
//! introspection data for display and session bookkeeping. They must never be
//! used to grant access unless the caller separately trusts the channel that
//! produced the token (for example, it was just returned by the identity
//! provider over TLS). Use `IdentityProvider::verify_access_token` when the
//! token arrives from an untrusted party.

use crate::constants::{CLAIM_EXPIRY, CLAIM_ORG_ID, CLAIM_SESSION_ID, CLAIM_SUBJECT};
use base64::Engine;
use base64::alphabet::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Serialize;
use serde_json::{Map, Value};

/// base64url that accepts payload segments with or without `=` padding
const BASE64_URL_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Untyped claim mapping taken from a token payload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawClaims(Map<String, Value>);

impl RawClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    pub fn insert(&mut self, claim: impl Into<String>, value: Value) {
        self.0.insert(claim.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// `exp` as whole Unix seconds. Fractional values round up so a token
    /// never counts as expired before its actual expiry.
    pub fn expires_at(&self) -> Option<i64> {
        match self.0.get(CLAIM_EXPIRY)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.ceil() as i64)),
            _ => None,
        }
    }

    /// `sid`, only meaningful for server-side revocation
    pub fn session_id(&self) -> Option<&str> {
        self.0.get(CLAIM_SESSION_ID).and_then(Value::as_str)
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.0.get(CLAIM_ORG_ID).and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.get(CLAIM_SUBJECT).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for RawClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Why a payload could not be read. Only ever logged.
#[derive(Debug)]
enum MalformedToken {
    SegmentCount(usize),
    Base64(base64::DecodeError),
    Utf8(std::string::FromUtf8Error),
    Json(serde_json::Error),
    NotAnObject,
}

impl std::fmt::Display for MalformedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedToken::SegmentCount(n) => write!(f, "expected 3 segments, found {}", n),
            MalformedToken::Base64(e) => write!(f, "payload is not base64url: {}", e),
            MalformedToken::Utf8(e) => write!(f, "payload is not UTF-8: {}", e),
            MalformedToken::Json(e) => write!(f, "payload is not JSON: {}", e),
            MalformedToken::NotAnObject => write!(f, "payload is not a JSON object"),
        }
    }
}

/// Decode the payload segment of a compact `header.payload.signature` token.
///
/// Malformed input of any kind yields empty claims; this function never
/// fails. The header and signature segments are ignored. See the module
/// documentation: the result is unverified.
pub fn decode(token: &str) -> RawClaims {
    match try_decode(token) {
        Ok(claims) => claims,
        Err(reason) => {
            tracing::debug!("Ignoring undecodable access token: {}", reason);
            RawClaims::new()
        }
    }
}

fn try_decode(token: &str) -> std::result::Result<RawClaims, MalformedToken> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(MalformedToken::SegmentCount(segments.len()));
    }

    let bytes = BASE64_URL_LENIENT
        .decode(segments[1])
        .map_err(MalformedToken::Base64)?;
    let text = String::from_utf8(bytes).map_err(MalformedToken::Utf8)?;

    match serde_json::from_str::<Value>(&text).map_err(MalformedToken::Json)? {
        Value::Object(map) => Ok(RawClaims(map)),
        _ => Err(MalformedToken::NotAnObject),
    }
}
