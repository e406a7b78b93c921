//! Claim normalization into the canonical session shape
//!
//! Providers emit collection claims either as bare identifiers
//! (`"roles": ["admin"]`) or as full objects
//! (`"roles": [{"slug": "admin", "name": "Admin"}]`). Every element is
//! classified explicitly as a [`ClaimElement`] and mapped to its canonical
//! object. Objects carrying their identifier key (`slug` for roles, `id`
//! otherwise) pass through in place, with omitted optional fields filled in,
//! so normalizing twice is the same as normalizing once.

use super::decode::{RawClaims, decode};
use crate::constants::{
    CLAIM_ENTITLEMENTS, CLAIM_FEATURE_FLAGS, CLAIM_ORG_ID, CLAIM_PERMISSIONS, CLAIM_ROLES,
};
use crate::model::{Entitlement, EntitlementValue, FeatureFlag, Permission, Role};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A canonical object that can also be written as a bare identifier
pub trait CanonicalClaim: DeserializeOwned + Serialize + Clone {
    /// Claim name in the token payload
    const CLAIM: &'static str;

    /// Field holding the element's identifier in object form
    const ID_KEY: &'static str = "id";

    /// Canonical object for a bare identifier
    fn from_identifier(identifier: &str) -> Self;

    /// Fill fields a partial object may omit. `name` defaults to the
    /// identifier.
    fn fill_defaults(object: &mut Map<String, Value>, identifier: &str) {
        object
            .entry("name")
            .or_insert_with(|| Value::String(identifier.to_string()));
    }
}

impl CanonicalClaim for Role {
    const CLAIM: &'static str = CLAIM_ROLES;
    const ID_KEY: &'static str = "slug";

    fn from_identifier(identifier: &str) -> Self {
        Role::new(identifier, identifier)
    }
}

impl CanonicalClaim for Permission {
    const CLAIM: &'static str = CLAIM_PERMISSIONS;

    fn from_identifier(identifier: &str) -> Self {
        Permission::new(identifier, identifier)
    }
}

impl CanonicalClaim for Entitlement {
    const CLAIM: &'static str = CLAIM_ENTITLEMENTS;

    fn from_identifier(identifier: &str) -> Self {
        Entitlement::new(identifier, identifier, EntitlementValue::Bool(true))
    }

    fn fill_defaults(object: &mut Map<String, Value>, identifier: &str) {
        object
            .entry("name")
            .or_insert_with(|| Value::String(identifier.to_string()));
        object.entry("value").or_insert(Value::Bool(true));
    }
}

impl CanonicalClaim for FeatureFlag {
    const CLAIM: &'static str = CLAIM_FEATURE_FLAGS;

    fn from_identifier(identifier: &str) -> Self {
        FeatureFlag::new(identifier, identifier, true)
    }

    fn fill_defaults(object: &mut Map<String, Value>, identifier: &str) {
        object
            .entry("name")
            .or_insert_with(|| Value::String(identifier.to_string()));
        object.entry("enabled").or_insert(Value::Bool(true));
    }
}

/// One element of a collection claim, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimElement<T> {
    /// A bare identifier string
    Bare(String),
    /// An object carrying its identifier key; omitted optional fields are
    /// filled with the bare-identifier defaults
    Structured(T),
    /// Neither; kept verbatim so no authorization data is lost
    Unrecognized(Value),
}

impl<T: CanonicalClaim> ClaimElement<T> {
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::String(identifier) => ClaimElement::Bare(identifier.clone()),
            Value::Object(object) => {
                let Some(identifier) = object.get(T::ID_KEY).and_then(Value::as_str) else {
                    return ClaimElement::Unrecognized(value.clone());
                };
                let mut filled = object.clone();
                T::fill_defaults(&mut filled, identifier);
                match T::deserialize(Value::Object(filled)) {
                    Ok(structured) => ClaimElement::Structured(structured),
                    Err(_) => ClaimElement::Unrecognized(value.clone()),
                }
            }
            other => ClaimElement::Unrecognized(other.clone()),
        }
    }
}

/// Normalized, caller-facing view of a token's authorization claims
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSession {
    /// First entry of `roles`
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub entitlements: Vec<Entitlement>,
    #[serde(default)]
    pub feature_flags: Vec<FeatureFlag>,
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Claim values that matched no canonical shape, keyed by claim name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unrecognized: BTreeMap<String, Vec<Value>>,
}

impl CanonicalSession {
    pub fn has_role(&self, slug: &str) -> bool {
        self.roles.iter().any(|r| r.slug == slug)
    }

    pub fn has_permission(&self, id: &str) -> bool {
        self.permissions.iter().any(|p| p.id == id)
    }

    pub fn is_feature_enabled(&self, id: &str) -> bool {
        self.feature_flags.iter().any(|f| f.id == id && f.enabled)
    }

    /// Render back into claim form, in object shape.
    ///
    /// `normalize(session.to_raw_claims()) == session` for any session that
    /// came out of [`normalize`]; unrecognized values are appended after the
    /// canonical entries of their claim.
    pub fn to_raw_claims(&self) -> RawClaims {
        let mut raw = RawClaims::new();
        raw.insert(CLAIM_ROLES, collection_value(&self.roles));
        raw.insert(CLAIM_PERMISSIONS, collection_value(&self.permissions));
        raw.insert(CLAIM_ENTITLEMENTS, collection_value(&self.entitlements));
        raw.insert(CLAIM_FEATURE_FLAGS, collection_value(&self.feature_flags));

        for (claim, values) in &self.unrecognized {
            let mut items = match raw.get(claim) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            // A lone leftover with no canonical siblings may have been a
            // non-array claim; restoring it whole normalizes identically.
            if items.is_empty() && values.len() == 1 {
                raw.insert(claim.clone(), values[0].clone());
            } else {
                items.extend(values.iter().cloned());
                raw.insert(claim.clone(), Value::Array(items));
            }
        }

        if let Some(org) = &self.organization_id {
            raw.insert(CLAIM_ORG_ID, Value::String(org.clone()));
        }
        raw
    }
}

fn collection_value<T: Serialize>(items: &[T]) -> Value {
    Value::Array(
        items
            .iter()
            .filter_map(|item| serde_json::to_value(item).ok())
            .collect(),
    )
}

/// Map one collection claim to canonical objects, recording leftovers
fn normalize_collection<T: CanonicalClaim>(
    raw: &RawClaims,
    unrecognized: &mut BTreeMap<String, Vec<Value>>,
) -> Vec<T> {
    let items = match raw.get(T::CLAIM) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            tracing::debug!("Claim '{}' is not an array; preserving as-is", T::CLAIM);
            unrecognized
                .entry(T::CLAIM.to_string())
                .or_default()
                .push(other.clone());
            return Vec::new();
        }
    };

    let mut canonical = Vec::with_capacity(items.len());
    for item in items {
        match ClaimElement::<T>::classify(item) {
            ClaimElement::Bare(identifier) => canonical.push(T::from_identifier(&identifier)),
            ClaimElement::Structured(object) => canonical.push(object),
            ClaimElement::Unrecognized(value) => {
                tracing::debug!("Unrecognized element in claim '{}'", T::CLAIM);
                unrecognized
                    .entry(T::CLAIM.to_string())
                    .or_default()
                    .push(value);
            }
        }
    }
    canonical
}

/// Normalize raw claims into a [`CanonicalSession`]. Total: missing or
/// malformed claims become empty defaults.
pub fn normalize(raw: &RawClaims) -> CanonicalSession {
    let mut unrecognized = BTreeMap::new();

    let roles: Vec<Role> = normalize_collection(raw, &mut unrecognized);
    let permissions = normalize_collection(raw, &mut unrecognized);
    let entitlements = normalize_collection(raw, &mut unrecognized);
    let feature_flags = normalize_collection(raw, &mut unrecognized);

    CanonicalSession {
        role: roles.first().cloned(),
        roles,
        permissions,
        entitlements,
        feature_flags,
        organization_id: raw.organization_id().map(str::to_string),
        unrecognized,
    }
}

/// `normalize(decode(token))`
pub fn derive_session(token: &str) -> CanonicalSession {
    normalize(&decode(token))
}
