//! Utility functions and helpers
//!
//! Token minting and an in-memory identity provider for tests, local
//! development and the relay's integration tests.

use crate::claims::RawClaims;
use crate::model::{Organization, OrganizationMembership, SessionRecord, User};
use crate::provider::{Authentication, AuthorizationUrlRequest, IdentityProvider};
use crate::session::TokenRefresher;
use crate::{RelayError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Build an unsigned JWT-shaped token (`header.payload.signature`) carrying
/// `claims`. Only [`crate::claims::decode`] can read it; signature
/// verification will reject it.
pub fn mint_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.unsigned", header, payload)
}

/// A verified user with no profile details
pub fn test_user(id: &str, email: &str) -> User {
    let created = Utc::now();
    User {
        id: id.to_string(),
        email: email.to_string(),
        first_name: None,
        last_name: None,
        email_verified: true,
        profile_picture_url: None,
        created_at: created,
        updated_at: created,
    }
}

/// In-memory [`IdentityProvider`] issuing unsigned tokens.
///
/// Codes are registered with [`TestProvider::issue_code`]. Refresh tokens are
/// single-use: each exchange consumes the token and issues a new one.
pub struct TestProvider {
    users: DashMap<String, User>,
    codes: DashMap<String, String>,
    refresh_tokens: DashMap<String, String>,
    organizations: DashMap<String, Organization>,
    memberships: Mutex<Vec<OrganizationMembership>>,
    extra_claims: Mutex<serde_json::Map<String, Value>>,
    token_lifetime: Mutex<Duration>,
    refresh_delay: Mutex<std::time::Duration>,
    issued: AtomicUsize,
    code_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl Default for TestProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProvider {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            codes: DashMap::new(),
            refresh_tokens: DashMap::new(),
            organizations: DashMap::new(),
            memberships: Mutex::new(Vec::new()),
            extra_claims: Mutex::new(serde_json::Map::new()),
            token_lifetime: Mutex::new(Duration::hours(1)),
            refresh_delay: Mutex::new(std::time::Duration::ZERO),
            issued: AtomicUsize::new(0),
            code_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn add_user(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn add_organization(&self, organization: Organization) {
        self.organizations
            .insert(organization.id.clone(), organization);
    }

    pub fn add_membership(&self, membership: OrganizationMembership) {
        self.memberships.lock().push(membership);
    }

    /// Register an authorization code that signs in `user_id`
    pub fn issue_code(&self, code: &str, user_id: &str) {
        self.codes.insert(code.to_string(), user_id.to_string());
    }

    /// Register a refresh token directly, bypassing the code exchange
    pub fn issue_refresh_token(&self, refresh_token: &str, user_id: &str) {
        self.refresh_tokens
            .insert(refresh_token.to_string(), user_id.to_string());
    }

    /// Claims added to every access token issued from now on
    pub fn set_claims(&self, claims: Value) {
        if let Value::Object(map) = claims {
            *self.extra_claims.lock() = map;
        }
    }

    /// Lifetime of issued access tokens (negative issues expired tokens)
    pub fn set_token_lifetime(&self, lifetime: Duration) {
        *self.token_lifetime.lock() = lifetime;
    }

    /// Delay applied to every refresh exchange
    pub fn set_refresh_delay(&self, delay: std::time::Duration) {
        *self.refresh_delay.lock() = delay;
    }

    pub fn code_calls(&self) -> usize {
        self.code_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Access token for `user_id` with the configured claims
    pub fn access_token_for(&self, user_id: &str) -> String {
        let mut claims = self.extra_claims.lock().clone();
        let exp = (Utc::now() + *self.token_lifetime.lock()).timestamp();
        claims.insert("sub".to_string(), json!(user_id));
        claims.insert("sid".to_string(), json!(format!("session_{}", user_id)));
        claims.insert("exp".to_string(), json!(exp));
        mint_token(&Value::Object(claims))
    }

    fn sign_in(&self, user_id: &str) -> Result<Authentication> {
        let user = self
            .users
            .get(user_id)
            .map(|u| u.value().clone())
            .ok_or_else(|| RelayError::provider(format!("User not found: {}", user_id)))?;

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let refresh_token = format!("refresh_{}", n);
        self.refresh_tokens
            .insert(refresh_token.clone(), user_id.to_string());

        let organization_id = self
            .memberships
            .lock()
            .iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.organization_id.clone());

        Ok(Authentication {
            access_token: self.access_token_for(user_id),
            refresh_token,
            user,
            organization_id,
            impersonator: None,
            authentication_method: Some("Password".to_string()),
        })
    }

    fn invalid_grant(message: &str) -> RelayError {
        RelayError::Provider {
            message: message.to_string(),
            status: Some(400),
            details: Some(json!({"error": "invalid_grant", "error_description": message})),
        }
    }
}

#[async_trait]
impl IdentityProvider for TestProvider {
    async fn authenticate_with_code(&self, code: &str) -> Result<Authentication> {
        self.code_calls.fetch_add(1, Ordering::SeqCst);
        let (_, user_id) = self
            .codes
            .remove(code)
            .ok_or_else(|| Self::invalid_grant("Invalid authorization code"))?;
        self.sign_in(&user_id)
    }

    async fn authenticate_with_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Authentication> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let (_, user_id) = self
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| Self::invalid_grant("Session has already ended."))?;
        self.sign_in(&user_id)
    }

    fn authorization_url(&self, request: &AuthorizationUrlRequest) -> Result<String> {
        let mut url = url::Url::parse("https://auth.test/user_management/authorize")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", "client_test")
                .append_pair("redirect_uri", &request.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("provider", "authkit");
            if let Some(state) = &request.state {
                query.append_pair("state", state);
            }
            if let Some(org) = &request.organization_id {
                query.append_pair("organization_id", org);
            }
        }
        Ok(url.to_string())
    }

    fn logout_url(&self, session_id: &str) -> Result<String> {
        let mut url = url::Url::parse("https://auth.test/user_management/sessions/logout")?;
        url.query_pairs_mut().append_pair("session_id", session_id);
        Ok(url.to_string())
    }

    async fn verify_access_token(&self, access_token: &str) -> Result<RawClaims> {
        let claims = crate::claims::decode(access_token);
        if claims.subject().is_none() {
            return Err(RelayError::unauthorized("Invalid access token"));
        }
        Ok(claims)
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        self.users
            .get(user_id)
            .map(|u| u.value().clone())
            .ok_or_else(|| RelayError::Provider {
                message: format!("User not found: {}", user_id),
                status: Some(404),
                details: None,
            })
    }

    async fn list_organization_memberships(
        &self,
        user_id: &str,
    ) -> Result<Vec<OrganizationMembership>> {
        Ok(self
            .memberships
            .lock()
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_organization_membership(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Option<OrganizationMembership>> {
        Ok(self
            .memberships
            .lock()
            .iter()
            .find(|m| m.user_id == user_id && m.organization_id == organization_id)
            .cloned())
    }

    async fn get_organization(&self, organization_id: &str) -> Result<Organization> {
        self.organizations
            .get(organization_id)
            .map(|o| o.value().clone())
            .ok_or_else(|| RelayError::Provider {
                message: format!("Organization not found: {}", organization_id),
                status: Some(404),
                details: None,
            })
    }
}

#[async_trait]
impl TokenRefresher for TestProvider {
    async fn refresh(&self, refresh_token: &str) -> Result<SessionRecord> {
        Ok(self
            .authenticate_with_refresh_token(refresh_token)
            .await?
            .into_session_record())
    }
}
