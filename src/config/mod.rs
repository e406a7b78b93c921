//! Configuration management for AuthRelay
//!
//! Loads relay and client settings from relay.config.json, then applies
//! environment variable overrides (a `.env` file is loaded by the binary
//! before this runs).

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_ALLOWED_ORIGINS, DEFAULT_BACKEND_URL, DEFAULT_CLIENT_REDIRECT_URI,
    DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT, DEFAULT_PROVIDER_BASE_URL, DEFAULT_REDIRECT_URI,
    DEFAULT_REFRESH_LEAD_TIME_SECS, DEFAULT_REFRESH_TIMEOUT_SECS, ENV_BACKEND_URL, ENV_HTTP_HOST,
    ENV_HTTP_PORT, ENV_PROVIDER_API_KEY, ENV_PROVIDER_BASE_URL, ENV_PROVIDER_CLIENT_ID,
    ENV_SESSION_DIR, SESSION_DIR_NAME,
};
use crate::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete AuthRelay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Identity provider credentials
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Relay HTTP server
    #[serde(default)]
    pub http: HttpConfig,

    /// Refresh policy shared by relay and client
    #[serde(default)]
    pub session: SessionConfig,

    /// Client-side settings (CLI session commands)
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Secret API key; only ever held by the relay
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            client_id: String::new(),
            base_url: default_provider_base_url(),
        }
    }
}

/// Relay HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. Defaults to the local web and mobile shell origins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,

    /// Redirect URI used when `/api/auth/url` is called without one
    #[serde(default = "default_redirect_uri")]
    pub default_redirect_uri: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: None,
            default_redirect_uri: default_redirect_uri(),
        }
    }
}

impl HttpConfig {
    /// Configured origins, or the built-in defaults
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins.clone().unwrap_or_else(|| {
            DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|o| o.to_string())
                .collect()
        })
    }
}

/// Refresh policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Refresh when the token expires within this many seconds
    #[serde(default = "default_lead_time_secs")]
    pub lead_time_secs: i64,

    /// Upper bound on one refresh attempt
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lead_time_secs: default_lead_time_secs(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
        }
    }
}

impl SessionConfig {
    pub fn lead_time(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lead_time_secs)
    }

    pub fn refresh_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_timeout_secs)
    }
}

/// Client-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Relay the client talks to
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Redirect URI the client registers for the callback
    #[serde(default = "default_client_redirect_uri")]
    pub redirect_uri: String,

    /// Directory of the file-backed session store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            redirect_uri: default_client_redirect_uri(),
            session_dir: None,
        }
    }
}

impl ClientConfig {
    /// Session directory, defaulting to the platform data directory
    pub fn session_dir(&self) -> PathBuf {
        self.session_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_session_dir)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

fn default_provider_base_url() -> String {
    DEFAULT_PROVIDER_BASE_URL.to_string()
}

fn default_host() -> String {
    DEFAULT_HTTP_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_lead_time_secs() -> i64 {
    DEFAULT_REFRESH_LEAD_TIME_SECS
}

fn default_refresh_timeout_secs() -> u64 {
    DEFAULT_REFRESH_TIMEOUT_SECS
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_client_redirect_uri() -> String {
    DEFAULT_CLIENT_REDIRECT_URI.to_string()
}

/// Get the default session directory (<data dir>/authrelay)
fn default_session_dir() -> PathBuf {
    match dirs::data_local_dir().or_else(dirs::home_dir) {
        Some(base) => base.join(SESSION_DIR_NAME),
        None => PathBuf::from(format!(".{}", SESSION_DIR_NAME)),
    }
}

impl Config {
    /// Load configuration from relay.config.json and the environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(CONFIG_FILE_NAME)
    }

    /// Load configuration from a specific path, then apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| RelayError::config(format!("Failed to parse JSON config: {}", e)))
    }

    /// Apply overrides from a variable lookup (normally the process
    /// environment). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_PROVIDER_API_KEY) {
            self.provider.api_key = v;
        }
        if let Some(v) = get(ENV_PROVIDER_CLIENT_ID) {
            self.provider.client_id = v;
        }
        if let Some(v) = get(ENV_PROVIDER_BASE_URL) {
            self.provider.base_url = v;
        }
        if let Some(v) = get(ENV_HTTP_HOST) {
            self.http.host = v;
        }
        if let Some(v) = get(ENV_HTTP_PORT) {
            self.http.port = v.trim().parse().map_err(|_| {
                RelayError::config(format!("{} must be a port number, got '{}'", ENV_HTTP_PORT, v))
            })?;
        }
        if let Some(v) = get(ENV_BACKEND_URL) {
            self.client.backend_url = v;
        }
        if let Some(v) = get(ENV_SESSION_DIR) {
            self.client.session_dir = Some(v);
        }
        Ok(())
    }

    /// Save configuration to a specific path as pretty JSON
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate configuration structure. Provider credentials are checked
    /// separately by [`Config::require_provider_credentials`].
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.provider.base_url).is_err() {
            return Err(RelayError::config(format!(
                "provider.baseUrl is not a valid URL: '{}'",
                self.provider.base_url
            )));
        }

        if self.http.port == 0 {
            return Err(RelayError::config("http.port must be nonzero (1-65535)"));
        }
        if self.http.host.is_empty() {
            return Err(RelayError::config("http.host cannot be empty"));
        }

        if let Some(ref origins) = self.http.allowed_origins {
            for origin in origins {
                if origin.is_empty() {
                    return Err(RelayError::config(
                        "http.allowedOrigins cannot contain empty strings",
                    ));
                }
                // Mobile shells use custom schemes, so only require one
                if !origin.contains("://") {
                    return Err(RelayError::config(format!(
                        "Invalid CORS origin '{}': must include a scheme",
                        origin
                    )));
                }
            }
        }

        if self.session.lead_time_secs < 0 {
            return Err(RelayError::config(
                "session.leadTimeSecs cannot be negative",
            ));
        }
        if self.session.refresh_timeout_secs == 0 {
            return Err(RelayError::config(
                "session.refreshTimeoutSecs must be greater than 0",
            ));
        }

        if url::Url::parse(&self.client.backend_url).is_err() {
            return Err(RelayError::config(format!(
                "client.backendUrl is not a valid URL: '{}'",
                self.client.backend_url
            )));
        }

        Ok(())
    }

    /// Fail unless the relay has what it needs to call the provider
    pub fn require_provider_credentials(&self) -> Result<()> {
        if self.provider.api_key.is_empty() {
            return Err(RelayError::config(format!(
                "{} environment variable is not set",
                ENV_PROVIDER_API_KEY
            )));
        }
        if self.provider.client_id.is_empty() {
            return Err(RelayError::config(format!(
                "{} environment variable is not set",
                ENV_PROVIDER_CLIENT_ID
            )));
        }
        Ok(())
    }
}
