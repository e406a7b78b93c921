//! Core data models for AuthRelay
//!
//! Canonical claim objects (roles, permissions, entitlements, feature flags),
//! the user and organization records returned by the identity provider, the
//! persisted session record, and the request/response bodies of the relay API.
//! Everything on the relay API is camelCase JSON.

use crate::claims::{CanonicalSession, FreshnessState, RawClaims, assess_freshness, decode};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// CANONICAL CLAIM OBJECTS
// ============================================================================

/// A role assigned to the user in the current organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub slug: String,
    pub name: String,
    /// Provider fields we do not model, carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Role {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// A permission granted through the user's roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Permission {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            extra: Map::new(),
        }
    }
}

/// Value carried by an entitlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntitlementValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl From<bool> for EntitlementValue {
    fn from(value: bool) -> Self {
        EntitlementValue::Bool(value)
    }
}

/// An entitlement attached to the user's organization or plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: String,
    pub name: String,
    pub value: EntitlementValue,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entitlement {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<EntitlementValue>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value: value.into(),
            extra: Map::new(),
        }
    }
}

/// A feature flag evaluated for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeatureFlag {
    pub fn new(id: impl Into<String>, name: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled,
            extra: Map::new(),
        }
    }
}

// ============================================================================
// USERS & ORGANIZATIONS
// ============================================================================

/// A user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub profile_picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Full name when known, otherwise the email address
    pub fn display_name(&self) -> String {
        match &self.first_name {
            Some(first) => format!("{} {}", first, self.last_name.as_deref().unwrap_or(""))
                .trim()
                .to_string(),
            None => self.email.clone(),
        }
    }
}

/// A verified or pending domain of an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainData {
    pub domain: String,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_data: Option<Vec<DomainData>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Inactive,
    Pending,
}

/// Links a user to an organization with a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMembership {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    pub role: Role,
    pub status: MembershipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dashboard user acting on behalf of the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impersonator {
    pub email: String,
    pub reason: Option<String>,
}

// ============================================================================
// SESSION RECORD
// ============================================================================

/// The session blob persisted by the client and returned by the callback and
/// refresh routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    #[serde(flatten)]
    pub session: CanonicalSession,
    #[serde(default)]
    pub impersonator: Option<Impersonator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_method: Option<String>,
}

impl SessionRecord {
    /// Unverified claims of the current access token
    pub fn claims(&self) -> RawClaims {
        decode(&self.access_token)
    }

    /// Freshness of the access token at `now`
    pub fn freshness(&self, now: DateTime<Utc>, lead_time: Duration) -> FreshnessState {
        assess_freshness(self.claims().expires_at(), now, lead_time)
    }

    /// Key used to serialize refresh attempts for this session: the provider
    /// session id when the token carries one, else the user id.
    pub fn identity(&self) -> String {
        self.claims()
            .session_id()
            .map(str::to_string)
            .unwrap_or_else(|| self.user.id.clone())
    }
}

// ============================================================================
// RELAY API BODIES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlResponse {
    pub authorization_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthCallbackRequest {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOutRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOutResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_url: Option<String>,
}

/// Profile of the bearer of a verified access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user: User,
    #[serde(flatten)]
    pub session: CanonicalSession,
    pub impersonator: Option<Impersonator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationWithMembership {
    pub organization: Organization,
    pub membership: OrganizationMembership,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOrganizationsResponse {
    pub organizations: Vec<OrganizationWithMembership>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchOrganizationRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchOrganizationResponse {
    pub success: bool,
    pub organization_id: String,
    pub role: Option<Role>,
}

/// Error body returned by every relay route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
