//! Session persistence and refresh
//!
//! - [`KeyValueStore`]: where the client keeps its session
//! - [`RefreshCoordinator`]: at most one refresh in flight per session
//! - [`SessionManager`]: the refresh-before-expiry policy on top of both

pub mod manager;
pub mod refresh;
pub mod store;

pub use manager::{SessionManager, SessionStatus};
pub use refresh::{RefreshCoordinator, RefreshFailure, TokenRefresher};
pub use store::{FileStore, KeyValueStore, MemoryStore};
