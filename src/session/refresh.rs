//! Single-flight session refresh
//!
//! A refresh token is usually single-use: two concurrent refreshes with the
//! same token can invalidate each other. [`RefreshCoordinator`] keeps at most
//! one attempt in flight per session identity. Callers that arrive while an
//! attempt is running await that attempt and get its result.

use crate::model::SessionRecord;
use crate::{RelayError, Result, telemetry};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Exchanges a refresh token for a new session
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<SessionRecord>;
}

/// Why a refresh attempt produced no session. Cloneable so every waiter on
/// a shared attempt receives it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("{0}")]
    Rejected(String),

    #[error("refresh timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<RefreshFailure> for RelayError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Rejected(message) => RelayError::RefreshRejected(message),
            RefreshFailure::TimedOut(after) => RelayError::RefreshTimeout(after),
        }
    }
}

type SharedAttempt = Shared<BoxFuture<'static, std::result::Result<SessionRecord, RefreshFailure>>>;

/// A running attempt, tagged so only its own task clears it
struct InFlight {
    id: u64,
    attempt: SharedAttempt,
}

/// De-duplicating cache of in-flight refresh attempts, keyed by identity.
///
/// Each attempt runs on its own task and removes its entry when it settles,
/// whether or not any caller is still waiting for it.
#[derive(Clone)]
pub struct RefreshCoordinator {
    in_flight: Arc<DashMap<String, InFlight>>,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl RefreshCoordinator {
    /// Coordinator whose attempts are bounded by `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of attempts currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Run `action` for `identity` unless an attempt is already running, in
    /// which case `action` is dropped unused and the running attempt's
    /// result is returned.
    pub async fn refresh<F, Fut>(&self, identity: &str, action: F) -> Result<SessionRecord>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionRecord>> + Send + 'static,
    {
        self.refresh_with_timeout(identity, self.timeout, action)
            .await
    }

    /// Like [`RefreshCoordinator::refresh`] with a caller-supplied timeout.
    /// The timeout of the attempt that started first applies to every waiter.
    pub async fn refresh_with_timeout<F, Fut>(
        &self,
        identity: &str,
        timeout: Duration,
        action: F,
    ) -> Result<SessionRecord>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionRecord>> + Send + 'static,
    {
        let attempt = match self.in_flight.entry(identity.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!("Joining in-flight refresh");
                telemetry::record_refresh("joined");
                entry.get().attempt.clone()
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let attempt = self.spawn_attempt(entry.key().clone(), id, action(), timeout);
                entry.insert(InFlight {
                    id,
                    attempt: attempt.clone(),
                });
                attempt
            }
        };

        attempt.await.map_err(RelayError::from)
    }

    fn spawn_attempt<Fut>(
        &self,
        identity: String,
        id: u64,
        action: Fut,
        timeout: Duration,
    ) -> SharedAttempt
    where
        Fut: Future<Output = Result<SessionRecord>> + Send + 'static,
    {
        let in_flight = self.in_flight.clone();
        let task = tokio::spawn(async move {
            let result = run_attempt(action, timeout).await;
            // A newer attempt for the same identity keeps its entry
            in_flight.remove_if(&identity, |_, current| current.id == id);
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                tracing::error!("Refresh task failed: {}", e);
                Err(RefreshFailure::Rejected(format!("refresh task failed: {}", e)))
            })
        }
        .boxed()
        .shared()
    }
}

async fn run_attempt<Fut>(
    action: Fut,
    timeout: Duration,
) -> std::result::Result<SessionRecord, RefreshFailure>
where
    Fut: Future<Output = Result<SessionRecord>>,
{
    match tokio::time::timeout(timeout, action).await {
        Ok(Ok(record)) => {
            telemetry::record_refresh("success");
            Ok(record)
        }
        Ok(Err(e)) => {
            tracing::warn!("Session refresh rejected: {}", e);
            telemetry::record_refresh("rejected");
            Err(RefreshFailure::Rejected(e.to_string()))
        }
        Err(_) => {
            tracing::warn!("Session refresh timed out after {:?}", timeout);
            telemetry::record_refresh("timeout");
            Err(RefreshFailure::TimedOut(timeout))
        }
    }
}
