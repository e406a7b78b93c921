//! Token claims: decoding, normalization and freshness
//!
//! The one place where access-token contents are interpreted. Every relay
//! route and the client session check go through these functions:
//!
//! - [`decode`]: unverified payload extraction (never fails)
//! - [`normalize`]: bare-string / object claim shapes into a [`CanonicalSession`]
//! - [`assess_freshness`]: expiry against a refresh lead time
//!
//! All three are pure and safe to call from any thread.

pub mod decode;
pub mod freshness;
pub mod normalize;

pub use decode::{RawClaims, decode};
pub use freshness::{FreshnessState, assess_freshness, default_lead_time};
pub use normalize::{CanonicalClaim, CanonicalSession, ClaimElement, derive_session, normalize};

#[cfg(test)]
mod decode_test;
#[cfg(test)]
mod freshness_test;
