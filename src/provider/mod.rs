//! Identity provider integration
//!
//! The relay never talks to the provider through a global client. A concrete
//! [`IdentityProvider`] (normally [`WorkOsProvider`]) is built from
//! configuration at startup and injected wherever it is needed, which also
//! lets tests swap in a fake.

pub mod workos;

pub use workos::WorkOsProvider;

use crate::Result;
use crate::claims::{RawClaims, derive_session};
use crate::model::{Impersonator, Organization, OrganizationMembership, SessionRecord, User};
use crate::session::TokenRefresher;
use async_trait::async_trait;
use std::sync::Arc;

/// Result of a successful code or refresh-token exchange
#[derive(Debug, Clone)]
pub struct Authentication {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    pub organization_id: Option<String>,
    pub impersonator: Option<Impersonator>,
    pub authentication_method: Option<String>,
}

impl Authentication {
    /// Build the session record returned to clients.
    ///
    /// Claims come from the freshly issued access token; the provider's
    /// `organization_id` fills in when the token carries no `org_id`.
    pub fn into_session_record(self) -> SessionRecord {
        let mut session = derive_session(&self.access_token);
        if session.organization_id.is_none() {
            session.organization_id = self.organization_id;
        }

        SessionRecord {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user: self.user,
            session,
            impersonator: self.impersonator,
            authentication_method: self.authentication_method,
        }
    }
}

/// Parameters for the hosted sign-in page URL
#[derive(Debug, Clone, Default)]
pub struct AuthorizationUrlRequest {
    pub redirect_uri: String,
    pub state: Option<String>,
    pub organization_id: Option<String>,
}

/// Operations the relay needs from the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an authorization code for tokens
    async fn authenticate_with_code(&self, code: &str) -> Result<Authentication>;

    /// Exchange a refresh token for new tokens
    async fn authenticate_with_refresh_token(&self, refresh_token: &str)
    -> Result<Authentication>;

    /// URL of the hosted sign-in page
    fn authorization_url(&self, request: &AuthorizationUrlRequest) -> Result<String>;

    /// URL that ends the provider session when the user navigates to it
    fn logout_url(&self, session_id: &str) -> Result<String>;

    /// Verify an access token's signature and return its claims
    async fn verify_access_token(&self, access_token: &str) -> Result<RawClaims>;

    async fn get_user(&self, user_id: &str) -> Result<User>;

    async fn list_organization_memberships(
        &self,
        user_id: &str,
    ) -> Result<Vec<OrganizationMembership>>;

    /// Membership of `user_id` in `organization_id`, if any
    async fn get_organization_membership(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Option<OrganizationMembership>>;

    async fn get_organization(&self, organization_id: &str) -> Result<Organization>;
}

/// Refreshes sessions directly against the identity provider (relay side)
#[derive(Clone)]
pub struct ProviderRefresher {
    provider: Arc<dyn IdentityProvider>,
}

impl ProviderRefresher {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TokenRefresher for ProviderRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<SessionRecord> {
        let auth = self
            .provider
            .authenticate_with_refresh_token(refresh_token)
            .await?;
        tracing::info!("Token refresh successful for user: {}", auth.user.email);
        Ok(auth.into_session_record())
    }
}
