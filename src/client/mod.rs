//! Typed HTTP client for the relay
//!
//! [`RelayClient`] speaks the relay's camelCase JSON API the way the mobile
//! shell does. [`AuthClient`] layers the shell's sign-in, sign-out and
//! organization flows on top of a [`crate::session::SessionManager`].

pub mod flow;

pub use flow::{AuthClient, SignInStart};

use crate::config::ClientConfig;
use crate::model::{
    AuthCallbackRequest, AuthRefreshRequest, AuthUrlRequest, AuthUrlResponse, ErrorResponse,
    OrganizationWithMembership, SessionRecord, SignOutRequest, SignOutResponse,
    SwitchOrganizationRequest, SwitchOrganizationResponse, UserOrganizationsResponse, UserProfile,
};
use crate::session::TokenRefresher;
use crate::{RelayError, Result};
use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

/// Length of the random part of a generated `state` value
const STATE_SUFFIX_LEN: usize = 16;

/// Random `state_…` value for an authorization request
pub fn generate_state() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("state_{}", suffix)
}

/// Client for the relay's `/api/auth/*` and `/api/user/*` routes
#[derive(Clone)]
pub struct RelayClient {
    base_url: Url,
    redirect_uri: String,
    http_client: reqwest::Client,
}

impl RelayClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RelayError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: Url::parse(&config.backend_url)?,
            redirect_uri: config.redirect_uri.clone(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await?;
        parse_relay_response(response).await
    }

    /// Hosted sign-in URL for this client's redirect URI
    pub async fn authorization_url(
        &self,
        state: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<String> {
        let request = AuthUrlRequest {
            redirect_uri: Some(self.redirect_uri.clone()),
            state: state.map(str::to_string),
            organization_id: organization_id.map(str::to_string),
        };
        let response: AuthUrlResponse = self.post("/api/auth/url", &request).await?;
        Ok(response.authorization_url)
    }

    /// Exchange the code from the sign-in redirect for a session
    pub async fn exchange_code(&self, code: &str) -> Result<SessionRecord> {
        let request = AuthCallbackRequest {
            code: Some(code.to_string()),
        };
        self.post("/api/auth/callback", &request).await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<SessionRecord> {
        let request = AuthRefreshRequest {
            refresh_token: Some(refresh_token.to_string()),
        };
        self.post("/api/auth/refresh", &request).await
    }

    /// Ask the relay for the provider logout URL of `session_id`
    pub async fn sign_out(&self, session_id: Option<&str>) -> Result<SignOutResponse> {
        let request = SignOutRequest {
            session_id: session_id.map(str::to_string),
        };
        self.post("/api/auth/signout", &request).await
    }

    pub async fn profile(&self, access_token: &str) -> Result<UserProfile> {
        let response = self
            .http_client
            .get(self.endpoint("/api/user/profile")?)
            .bearer_auth(access_token)
            .send()
            .await?;
        parse_relay_response(response).await
    }

    pub async fn organizations(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<Vec<OrganizationWithMembership>> {
        let mut url = self.endpoint("/api/user/organizations")?;
        url.query_pairs_mut().append_pair("userId", user_id);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;
        let body: UserOrganizationsResponse = parse_relay_response(response).await?;
        Ok(body.organizations)
    }

    pub async fn switch_organization(
        &self,
        user_id: &str,
        organization_id: &str,
        access_token: &str,
    ) -> Result<SwitchOrganizationResponse> {
        let request = SwitchOrganizationRequest {
            user_id: Some(user_id.to_string()),
            organization_id: Some(organization_id.to_string()),
            access_token: Some(access_token.to_string()),
        };
        self.post("/api/user/switch-org", &request).await
    }
}

#[async_trait]
impl TokenRefresher for RelayClient {
    async fn refresh(&self, refresh_token: &str) -> Result<SessionRecord> {
        self.refresh_token(refresh_token).await
    }
}

/// Decode a success body or map the relay's `{error, message}` body to an error
async fn parse_relay_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.json::<ErrorResponse>().await.ok();
    let message = body
        .as_ref()
        .map(|b| b.message.clone())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    tracing::debug!(status = status.as_u16(), "Relay request failed: {}", message);

    Err(match status.as_u16() {
        400 => RelayError::Validation(message),
        401 => RelayError::Unauthorized(message),
        403 => RelayError::Forbidden(message),
        code => RelayError::Provider {
            message,
            status: Some(code),
            details: body.and_then(|b| b.details),
        },
    })
}
