//! AuthRelay - identity provider token relay
//!
//! A thin relay between a native or mobile client and a hosted identity
//! provider (WorkOS User Management). The provider API key stays on the
//! relay; clients only ever hold their own tokens.
//!
//! # Architecture
//!
//! - [`claims`]: unverified token decoding, claim normalization and the
//!   refresh-before-expiry policy, shared by every relay route and the client
//! - [`provider`]: the [`provider::IdentityProvider`] seam and its WorkOS
//!   implementation
//! - [`http`]: the relay server (axum)
//! - [`session`]: client-side session storage and single-flight refresh
//! - [`client`]: typed client for the relay routes
//!
//! # Example
//!
//! ```rust,no_run
//! use authrelay::claims::{assess_freshness, decode, default_lead_time, normalize};
//!
//! let claims = decode("eyJhbGciOiJub25lIn0.eyJyb2xlcyI6WyJhZG1pbiJdfQ.sig");
//! let session = normalize(&claims);
//! assert!(session.has_role("admin"));
//!
//! let state = assess_freshness(claims.expires_at(), chrono::Utc::now(), default_lead_time());
//! println!("{}", state);
//! ```

// Core modules
pub mod claims;
pub mod constants;
pub mod error;
pub mod model;

// Infrastructure
pub mod config;
pub mod provider;
pub mod session;
pub mod telemetry;

// Interface layers
pub mod cli;
pub mod client;
pub mod http;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use claims::{CanonicalSession, FreshnessState, RawClaims};
pub use error::{RelayError, Result};
pub use model::SessionRecord;

/// Initialize logging for the application
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "authrelay=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
