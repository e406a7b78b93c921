//! Sign-in, sign-out and organization flows of the mobile shell

use super::{RelayClient, generate_state};
use crate::config::SessionConfig;
use crate::model::{OrganizationWithMembership, SessionRecord};
use crate::session::{KeyValueStore, RefreshCoordinator, SessionManager, SessionStatus};
use crate::{RelayError, Result};
use chrono::Utc;
use std::sync::Arc;

/// Where to send the user, and the `state` to expect back on the redirect
#[derive(Debug, Clone, PartialEq)]
pub struct SignInStart {
    pub authorization_url: String,
    pub state: String,
}

/// Relay client plus persisted session
#[derive(Clone)]
pub struct AuthClient {
    relay: Arc<RelayClient>,
    sessions: SessionManager,
}

impl AuthClient {
    /// Client whose session lives in `store` and refreshes through `relay`
    pub fn new(
        relay: Arc<RelayClient>,
        store: Arc<dyn KeyValueStore>,
        session_config: &SessionConfig,
    ) -> Self {
        let sessions = SessionManager::new(
            store,
            relay.clone(),
            RefreshCoordinator::new(session_config.refresh_timeout()),
            session_config.lead_time(),
        );
        Self { relay, sessions }
    }

    pub fn relay(&self) -> &RelayClient {
        &self.relay
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Start interactive sign-in with a fresh `state`
    pub async fn sign_in_url(&self, organization_id: Option<&str>) -> Result<SignInStart> {
        let state = generate_state();
        let authorization_url = self
            .relay
            .authorization_url(Some(&state), organization_id)
            .await?;
        Ok(SignInStart {
            authorization_url,
            state,
        })
    }

    /// Exchange the redirect's code and persist the resulting session
    pub async fn complete_sign_in(&self, code: &str) -> Result<SessionRecord> {
        let record = self.relay.exchange_code(code).await?;
        self.sessions.store_session(&record).await?;
        tracing::info!(
            "Signed in as {} (organization: {})",
            record.user.email,
            record.session.organization_id.as_deref().unwrap_or("none")
        );
        Ok(record)
    }

    /// Stored session at the current time, refreshed when due
    pub async fn current_session(&self) -> Result<SessionStatus> {
        self.sessions.check_session(Utc::now()).await
    }

    pub async fn refresh(&self) -> Result<SessionRecord> {
        self.sessions.refresh_session().await
    }

    /// Revoke the provider session when possible, then clear local storage.
    ///
    /// Returns the logout URL the user should visit, if the relay issued one.
    /// The local session is cleared even when the relay call fails.
    pub async fn sign_out(&self) -> Result<Option<String>> {
        let session_id = match self.sessions.get_session().await {
            Ok(record) => record.and_then(|r| r.claims().session_id().map(str::to_string)),
            Err(e) => {
                tracing::warn!("Could not read session before sign-out: {}", e);
                None
            }
        };

        let logout_url = match session_id {
            Some(sid) => match self.relay.sign_out(Some(&sid)).await {
                Ok(response) => response.logout_url,
                Err(e) => {
                    tracing::warn!("Error revoking session: {}", e);
                    None
                }
            },
            None => None,
        };

        self.sessions.clear_session().await?;
        tracing::info!("Signed out locally");
        Ok(logout_url)
    }

    /// Organizations of the signed-in user; empty when signed out or on any error
    pub async fn organizations(&self) -> Vec<OrganizationWithMembership> {
        let record = match self.sessions.get_session().await {
            Ok(Some(record)) => record,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("Error reading session: {}", e);
                return Vec::new();
            }
        };

        match self
            .relay
            .organizations(&record.user.id, &record.access_token)
            .await
        {
            Ok(organizations) => organizations,
            Err(e) => {
                tracing::warn!("Error fetching organizations: {}", e);
                Vec::new()
            }
        }
    }

    /// Switch to `organization_id`, then refresh so the new session carries
    /// the organization's claims
    pub async fn switch_organization(&self, organization_id: &str) -> Result<SessionRecord> {
        let record = self
            .sessions
            .get_session()
            .await?
            .ok_or_else(|| RelayError::unauthorized("No active session"))?;

        self.relay
            .switch_organization(&record.user.id, organization_id, &record.access_token)
            .await?;
        tracing::info!("Switched to organization {}", organization_id);

        self.sessions.refresh_session().await
    }
}
