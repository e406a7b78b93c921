//! WorkOS User Management client
//!
//! Talks to the WorkOS REST API directly with reqwest. Wire types are
//! snake_case and private to this module; everything leaving it is a model
//! type.

use super::{Authentication, AuthorizationUrlRequest, IdentityProvider};
use crate::claims::RawClaims;
use crate::config::ProviderConfig;
use crate::model::{
    DomainData, Impersonator, MembershipStatus, Organization, OrganizationMembership, Role, User,
};
use crate::{RelayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(default)]
    email_verified: bool,
    profile_picture_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WireUser> for User {
    fn from(u: WireUser) -> Self {
        User {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            email_verified: u.email_verified,
            profile_picture_url: u.profile_picture_url,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireAuthentication {
    user: WireUser,
    organization_id: Option<String>,
    access_token: String,
    refresh_token: String,
    impersonator: Option<Impersonator>,
    authentication_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRole {
    slug: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMembership {
    id: String,
    user_id: String,
    organization_id: String,
    role: WireRole,
    status: MembershipStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WireMembership> for OrganizationMembership {
    fn from(m: WireMembership) -> Self {
        // Memberships usually carry only the slug
        let name = m.role.name.unwrap_or_else(|| m.role.slug.clone());
        OrganizationMembership {
            id: m.id,
            user_id: m.user_id,
            organization_id: m.organization_id,
            role: Role::new(m.role.slug, name),
            status: m.status,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct WireDomain {
    domain: String,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireOrganization {
    id: String,
    name: String,
    #[serde(default)]
    domains: Vec<WireDomain>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WireOrganization> for Organization {
    fn from(o: WireOrganization) -> Self {
        let domain_data = if o.domains.is_empty() {
            None
        } else {
            Some(
                o.domains
                    .into_iter()
                    .map(|d| DomainData {
                        verified: d.state.as_deref() == Some("verified"),
                        domain: d.domain,
                    })
                    .collect(),
            )
        };
        Organization {
            id: o.id,
            name: o.name,
            domain_data,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct AuthenticateRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// WorkOS implementation of [`IdentityProvider`]
#[derive(Clone)]
pub struct WorkOsProvider {
    api_key: String,
    client_id: String,
    base_url: Url,
    http_client: reqwest::Client,
    jwks: Arc<RwLock<Option<JwkSet>>>,
}

impl WorkOsProvider {
    /// Create a provider client from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(RelayError::config(format!(
                "{} environment variable is not set",
                crate::constants::ENV_PROVIDER_API_KEY
            )));
        }
        if config.client_id.is_empty() {
            return Err(RelayError::config(format!(
                "{} environment variable is not set",
                crate::constants::ENV_PROVIDER_CLIENT_ID
            )));
        }

        // Never follow redirects with credentials attached
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RelayError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            client_id: config.client_id.clone(),
            base_url: api_base(&config.base_url)?,
            http_client,
            jwks: Arc::new(RwLock::new(None)),
        })
    }

    /// Resolve an API path under the base URL, keeping any base path prefix
    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn authenticate(&self, body: AuthenticateRequest<'_>) -> Result<Authentication> {
        let url = self.endpoint("/user_management/authenticate")?;
        let response = self.http_client.post(url).json(&body).send().await?;
        let wire: WireAuthentication = parse_response(response).await?;

        Ok(Authentication {
            access_token: wire.access_token,
            refresh_token: wire.refresh_token,
            user: wire.user.into(),
            organization_id: wire.organization_id,
            impersonator: wire.impersonator,
            authentication_method: wire.authentication_method,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        parse_response(response).await
    }

    async fn memberships(
        &self,
        user_id: &str,
        organization_id: Option<&str>,
    ) -> Result<Vec<OrganizationMembership>> {
        let mut url = self.endpoint("/user_management/organization_memberships")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("user_id", user_id);
            if let Some(org) = organization_id {
                query.append_pair("organization_id", org);
            }
        }
        let list: WireList<WireMembership> = self.get_json(url).await?;
        Ok(list.data.into_iter().map(Into::into).collect())
    }

    /// Signing key for `kid`, refetching the key set once on a cache miss
    async fn signing_key(&self, kid: &str) -> Result<Jwk> {
        let cached = self
            .jwks
            .read()
            .as_ref()
            .and_then(|set| set.find(kid).cloned());
        if let Some(jwk) = cached {
            return Ok(jwk);
        }

        let url = self.endpoint(&format!("/sso/jwks/{}", self.client_id))?;
        let response = self.http_client.get(url).send().await?;
        let set: JwkSet = parse_response(response).await?;
        let jwk = set.find(kid).cloned();
        *self.jwks.write() = Some(set);

        jwk.ok_or_else(|| RelayError::unauthorized(format!("Unknown signing key: {}", kid)))
    }
}

/// Parse the API base so its path ends in `/` and relative joins keep the prefix
fn api_base(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Decode a successful body or turn an error status into a provider error
async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let details = response.json::<Value>().await.ok();
    let message = details
        .as_ref()
        .and_then(|d| {
            d.get("error_description")
                .or_else(|| d.get("message"))
                .or_else(|| d.get("error"))
        })
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Identity provider returned {}", status));

    tracing::warn!(status = status.as_u16(), "Identity provider request failed: {}", message);

    Err(RelayError::Provider {
        message,
        status: Some(status.as_u16()),
        details,
    })
}

#[async_trait]
impl IdentityProvider for WorkOsProvider {
    async fn authenticate_with_code(&self, code: &str) -> Result<Authentication> {
        self.authenticate(AuthenticateRequest {
            client_id: &self.client_id,
            client_secret: &self.api_key,
            grant_type: "authorization_code",
            code: Some(code),
            refresh_token: None,
        })
        .await
    }

    async fn authenticate_with_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Authentication> {
        self.authenticate(AuthenticateRequest {
            client_id: &self.client_id,
            client_secret: &self.api_key,
            grant_type: "refresh_token",
            code: None,
            refresh_token: Some(refresh_token),
        })
        .await
    }

    fn authorization_url(&self, request: &AuthorizationUrlRequest) -> Result<String> {
        let mut url = self.endpoint("/user_management/authorize")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
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
        let mut url = self.endpoint("/user_management/sessions/logout")?;
        url.query_pairs_mut().append_pair("session_id", session_id);
        Ok(url.to_string())
    }

    async fn verify_access_token(&self, access_token: &str) -> Result<RawClaims> {
        let header = jsonwebtoken::decode_header(access_token)
            .map_err(|e| RelayError::unauthorized(format!("Malformed access token: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| RelayError::unauthorized("Access token has no key id"))?;

        let jwk = self.signing_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| RelayError::unauthorized(format!("Unusable signing key: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;

        let data = jsonwebtoken::decode::<Map<String, Value>>(access_token, &key, &validation)
            .map_err(|e| RelayError::unauthorized(format!("Invalid access token: {}", e)))?;
        Ok(RawClaims::from(data.claims))
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        let url = self.endpoint(&format!("/user_management/users/{}", user_id))?;
        let user: WireUser = self.get_json(url).await?;
        Ok(user.into())
    }

    async fn list_organization_memberships(
        &self,
        user_id: &str,
    ) -> Result<Vec<OrganizationMembership>> {
        self.memberships(user_id, None).await
    }

    async fn get_organization_membership(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Option<OrganizationMembership>> {
        let memberships = self.memberships(user_id, Some(organization_id)).await?;
        Ok(memberships
            .into_iter()
            .find(|m| m.organization_id == organization_id))
    }

    async fn get_organization(&self, organization_id: &str) -> Result<Organization> {
        let url = self.endpoint(&format!("/organizations/{}", organization_id))?;
        let org: WireOrganization = self.get_json(url).await?;
        Ok(org.into())
    }
}

#[cfg(test)]
mod workos_test {
    include!("workos_test.rs");
}
