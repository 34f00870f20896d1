//! Portal connection settings.
//!
//! Settings live in a small YAML file (`info.yaml`) holding the bearer token,
//! the portal base URL and default request headers:
//!
//! ```yaml
//! token: "abc123"
//! server: "https://research.example.org/api"
//! headers:
//!   Accept: "application/json"
//!   Content-Type: "application/json"
//! ```
//!
//! The file is read once by [`PortalConfig::load`] and the resulting value is
//! passed explicitly to the HTTP client; nothing is cached globally.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up during discovery.
pub const CONFIG_FILE_NAME: &str = "info.yaml";

/// Environment variable naming the directory that holds the settings file.
pub const HOME_ENV: &str = "MINDER_DOWNLOADER_HOME";

/// Environment variable overriding the token from the settings file.
pub const TOKEN_ENV: &str = "MINDER_TOKEN";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Settings file is not valid YAML for [`PortalConfig`]
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that failed
        path: PathBuf,
        /// Underlying YAML error
        source: serde_yaml::Error,
    },

    /// Settings parsed but are unusable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Connection settings for the research portal.
#[derive(Clone, Deserialize)]
pub struct PortalConfig {
    /// Bearer token sent with every request
    pub token: String,
    /// Base URL of the portal API (no trailing slash)
    pub server: String,
    /// Headers added to every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Overall per-request timeout in seconds (covers whole file downloads)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl PortalConfig {
    /// Build a configuration from a token and server URL.
    pub fn new(token: impl Into<String>, server: impl Into<String>) -> Result<Self, ConfigError> {
        Self {
            token: token.into(),
            server: server.into(),
            headers: BTreeMap::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
        .validated()
    }

    /// Add a default header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: PortalConfig = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validated()
    }

    /// Load settings from a YAML file.
    ///
    /// A `MINDER_TOKEN` environment variable, when set and non-empty,
    /// replaces the token read from the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading portal configuration");

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: PortalConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.apply_token_override(std::env::var(TOKEN_ENV).ok());
        config.validated()
    }

    /// Replace the token with `token` when it is non-blank.
    fn apply_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            debug!("Using token from {}", TOKEN_ENV);
            self.token = token;
        }
    }

    /// Locate and load the settings file.
    ///
    /// `explicit` wins when given; otherwise `$MINDER_DOWNLOADER_HOME/info.yaml`
    /// is used if the variable is set, then `./info.yaml`.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(resolve_config_path(explicit))
    }

    /// URL of the export submission endpoint.
    pub fn export_url(&self) -> String {
        format!("{}/export", self.server)
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        self.token = self.token.trim().to_string();
        if self.token.is_empty() {
            return Err(ConfigError::Invalid("token must not be empty".to_string()));
        }

        let server = self.server.trim().trim_end_matches('/');
        if server.is_empty() {
            return Err(ConfigError::Invalid("server must not be empty".to_string()));
        }
        if !server.starts_with("http://") && !server.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "server must be an http(s) URL, got '{server}'"
            )));
        }
        self.server = server.to_string();

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(self)
    }
}

impl fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalConfig")
            .field("token", &"<redacted>")
            .field("server", &self.server)
            .field("headers", &self.headers)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Path the settings file is read from.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var_os(HOME_ENV) {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(CONFIG_FILE_NAME),
        _ => PathBuf::from(CONFIG_FILE_NAME),
    }
}
