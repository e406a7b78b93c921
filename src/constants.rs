//! Constants used throughout AuthRelay
//!
//! Configuration file names, environment variables, storage keys and the
//! defaults shared by the relay server and the client session path.

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "relay.config.json";

/// Default HTTP port for the relay
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default bind host
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

/// Default WorkOS API base URL
pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.workos.com";

/// Redirect URI used when an authorization URL request omits one
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/callback";

/// Redirect URI registered for the mobile shell's custom URL scheme
pub const DEFAULT_CLIENT_REDIRECT_URI: &str = "workosauthdemo://callback";

/// Relay URL the client talks to by default
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";

/// Lead time before expiry at which a session is refreshed (5 minutes)
pub const DEFAULT_REFRESH_LEAD_TIME_SECS: i64 = 300;

/// Upper bound on a single refresh attempt
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

/// Origins allowed by the relay's CORS policy when none are configured
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "capacitor://localhost",
    "http://localhost",
    "ionic://localhost",
];

/// CORS preflight cache lifetime
pub const CORS_MAX_AGE_SECS: u64 = 86_400;

// ============================================================================
// ENVIRONMENT VARIABLES
// ============================================================================

pub const ENV_PROVIDER_API_KEY: &str = "WORKOS_API_KEY";
pub const ENV_PROVIDER_CLIENT_ID: &str = "WORKOS_CLIENT_ID";
pub const ENV_PROVIDER_BASE_URL: &str = "WORKOS_BASE_URL";
pub const ENV_HTTP_HOST: &str = "RELAY_HOST";
pub const ENV_HTTP_PORT: &str = "RELAY_PORT";
pub const ENV_BACKEND_URL: &str = "RELAY_BACKEND_URL";
pub const ENV_SESSION_DIR: &str = "RELAY_SESSION_DIR";

// ============================================================================
// SESSION STORAGE
// ============================================================================

/// Key holding the serialized session record
pub const SESSION_DATA_KEY: &str = "session_data";

/// Keys written by older client builds, removed on sign-out
pub const LEGACY_SESSION_KEYS: &[&str] =
    &["access_token", "refresh_token", "user", "organization_id"];

/// Directory name for the file-backed session store
pub const SESSION_DIR_NAME: &str = "authrelay";

// ============================================================================
// TOKEN CLAIMS
// ============================================================================

pub const CLAIM_ROLES: &str = "roles";
pub const CLAIM_PERMISSIONS: &str = "permissions";
pub const CLAIM_ENTITLEMENTS: &str = "entitlements";
pub const CLAIM_FEATURE_FLAGS: &str = "feature_flags";
pub const CLAIM_ORG_ID: &str = "org_id";
pub const CLAIM_EXPIRY: &str = "exp";
pub const CLAIM_SESSION_ID: &str = "sid";
pub const CLAIM_SUBJECT: &str = "sub";
