//! Client-side session lifecycle
//!
//! Owns the persisted [`SessionRecord`] and applies the refresh-before-expiry
//! policy: a session that needs refresh (or has expired) gets exactly one
//! refresh attempt, and a failed attempt discards the session.

use super::refresh::{RefreshCoordinator, TokenRefresher};
use super::store::KeyValueStore;
use crate::claims::FreshnessState;
use crate::constants::{LEGACY_SESSION_KEYS, SESSION_DATA_KEY};
use crate::model::SessionRecord;
use crate::{RelayError, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Outcome of checking the stored session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    /// Nothing stored; interactive sign-in required
    SignedOut,
    /// Usable as is
    Active {
        record: SessionRecord,
        freshness: FreshnessState,
    },
    /// Was due for refresh and has been replaced
    Refreshed(SessionRecord),
}

impl SessionStatus {
    pub fn record(&self) -> Option<&SessionRecord> {
        match self {
            SessionStatus::SignedOut => None,
            SessionStatus::Active { record, .. } | SessionStatus::Refreshed(record) => Some(record),
        }
    }
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    refresher: Arc<dyn TokenRefresher>,
    coordinator: RefreshCoordinator,
    lead_time: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        refresher: Arc<dyn TokenRefresher>,
        coordinator: RefreshCoordinator,
        lead_time: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            coordinator,
            lead_time,
        }
    }

    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    /// Stored session, if any. Unreadable data counts as no session.
    pub async fn get_session(&self) -> Result<Option<SessionRecord>> {
        load_record(self.store.as_ref()).await
    }

    pub async fn store_session(&self, record: &SessionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.store.set(SESSION_DATA_KEY, &json).await
    }

    /// Remove the session and the keys older clients stored it under
    pub async fn clear_session(&self) -> Result<()> {
        self.store.remove(SESSION_DATA_KEY).await?;
        for key in LEGACY_SESSION_KEYS {
            self.store.remove(key).await?;
        }
        tracing::debug!("Session cleared");
        Ok(())
    }

    /// Check the stored session at `now`, refreshing it when due.
    ///
    /// On refresh failure the session is cleared and the refresh error is
    /// returned; the caller must sign in again.
    pub async fn check_session(&self, now: DateTime<Utc>) -> Result<SessionStatus> {
        let Some(record) = self.get_session().await? else {
            return Ok(SessionStatus::SignedOut);
        };

        let freshness = record.freshness(now, self.lead_time);
        if !freshness.requires_refresh() {
            return Ok(SessionStatus::Active { record, freshness });
        }

        tracing::info!("Session is {}, refreshing", freshness);
        self.refresh_record(record).await.map(SessionStatus::Refreshed)
    }

    /// Refresh the stored session regardless of its freshness
    pub async fn refresh_session(&self) -> Result<SessionRecord> {
        let record = self
            .get_session()
            .await?
            .ok_or_else(|| RelayError::unauthorized("No session stored"))?;
        self.refresh_record(record).await
    }

    /// Refresh starting from `record`, as read by the caller
    pub(crate) async fn refresh_record(&self, record: SessionRecord) -> Result<SessionRecord> {
        let identity = record.identity();
        let stale_token = record.refresh_token;
        let store = self.store.clone();
        let refresher = self.refresher.clone();

        let result = self
            .coordinator
            .refresh(&identity, move || async move {
                // Already replaced by a refresh that finished after our read
                if let Some(current) = load_record(store.as_ref()).await?
                    && current.refresh_token != stale_token
                {
                    return Ok(current);
                }

                let refreshed = refresher.refresh(&stale_token).await?;
                let json = serde_json::to_string(&refreshed)?;
                store.set(SESSION_DATA_KEY, &json).await?;
                Ok(refreshed)
            })
            .await;

        match result {
            Ok(refreshed) => Ok(refreshed),
            Err(e) => {
                tracing::warn!("Session refresh failed, signing out: {}", e);
                self.clear_session().await?;
                Err(e)
            }
        }
    }
}

async fn load_record(store: &dyn KeyValueStore) -> Result<Option<SessionRecord>> {
    let Some(raw) = store.get(SESSION_DATA_KEY).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            tracing::warn!("Ignoring unreadable session data: {}", e);
            Ok(None)
        }
    }
}
