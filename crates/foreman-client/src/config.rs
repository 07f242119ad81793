//! Foreman client configuration.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

const REDACTED: &str = "***REDACTED***";

/// Request/response logging level of the HTTP transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    /// No request/response logging.
    Quiet,
    /// Log method, URL and status code only.
    #[default]
    Normal,
    /// Also log request headers.
    Verbose,
    /// Also log request and response bodies.
    Debug,
}

impl LogVerbosity {
    /// Check if headers should be logged.
    #[must_use]
    pub fn log_headers(&self) -> bool {
        matches!(self, LogVerbosity::Verbose | LogVerbosity::Debug)
    }

    /// Check if bodies should be logged.
    #[must_use]
    pub fn log_bodies(&self) -> bool {
        matches!(self, LogVerbosity::Debug)
    }

    /// Check if any logging should occur.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, LogVerbosity::Quiet)
    }
}

/// Credentials sent with every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Basic { username: String, password: String },
}

impl AuthConfig {
    /// Copy with secrets masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        match self {
            AuthConfig::None => AuthConfig::None,
            AuthConfig::Basic { username, .. } => AuthConfig::Basic {
                username: username.clone(),
                password: REDACTED.to_string(),
            },
        }
    }
}

/// TLS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Whether to verify the server certificate.
    #[serde(default = "default_true")]
    pub verify_certificate: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_certificate: true,
        }
    }
}

/// Connection timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    60
}

/// Configuration for [`crate::ForemanClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForemanConfig {
    /// Server root, e.g. `https://foreman.example.com`. Endpoints produced by
    /// the engine (`/api/...`) are appended to it.
    pub base_url: String,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Headers added to every request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub default_headers: HashMap<String, String>,

    #[serde(default)]
    pub log_verbosity: LogVerbosity,
}

impl ForemanConfig {
    /// Create a config for the given server with no credentials.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: AuthConfig::None,
            tls: TlsConfig::default(),
            connection: ConnectionSettings::default(),
            default_headers: HashMap::new(),
            log_verbosity: LogVerbosity::default(),
        }
    }

    /// Load configuration from `FOREMAN_*` environment variables.
    ///
    /// `FOREMAN_URL` is required. Basic auth is used when `FOREMAN_USERNAME`
    /// is set; `FOREMAN_VERIFY_SSL` defaults to `true`; `FOREMAN_TIMEOUT_SECS`
    /// sets the read timeout.
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let base_url = lookup("FOREMAN_URL").ok_or_else(|| ClientError::ConfigMissing {
            var: "FOREMAN_URL".to_string(),
        })?;
        let mut config = Self::new(base_url);

        if let Some(username) = lookup("FOREMAN_USERNAME") {
            let password = lookup("FOREMAN_PASSWORD").ok_or_else(|| ClientError::ConfigMissing {
                var: "FOREMAN_PASSWORD".to_string(),
            })?;
            config = config.with_basic_auth(username, password);
        }

        if let Some(raw) = lookup("FOREMAN_VERIFY_SSL") {
            config.tls.verify_certificate = parse_bool(&raw)
                .ok_or_else(|| ClientError::invalid("FOREMAN_VERIFY_SSL", format!("not a boolean: {raw}")))?;
        }

        if let Some(raw) = lookup("FOREMAN_TIMEOUT_SECS") {
            config.connection.read_timeout_secs = raw.parse().map_err(|_| {
                ClientError::invalid("FOREMAN_TIMEOUT_SECS", format!("not a number of seconds: {raw}"))
            })?;
        }

        Ok(config)
    }

    /// Use HTTP basic authentication.
    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = AuthConfig::Basic {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Toggle server certificate verification.
    #[must_use]
    pub fn with_verify_certificate(mut self, verify: bool) -> Self {
        self.tls.verify_certificate = verify;
        self
    }

    /// Set connect and read timeouts in seconds.
    #[must_use]
    pub fn with_timeouts(mut self, connection_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        self.connection = ConnectionSettings {
            connection_timeout_secs,
            read_timeout_secs,
        };
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Set request/response logging verbosity.
    #[must_use]
    pub fn with_log_verbosity(mut self, verbosity: LogVerbosity) -> Self {
        self.log_verbosity = verbosity;
        self
    }

    /// Full URL for an API endpoint.
    pub fn url(&self, endpoint: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    }

    /// Check the configuration can be used to build a client.
    pub fn validate(&self) -> ClientResult<()> {
        if self.base_url.is_empty() {
            return Err(ClientError::invalid("base_url", "base_url is required"));
        }

        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ClientError::invalid("base_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::invalid(
                "base_url",
                format!("unsupported scheme: {}", url.scheme()),
            ));
        }
        if url.host_str().is_none() {
            return Err(ClientError::invalid("base_url", "URL has no host"));
        }
        if url.query().is_some() {
            return Err(ClientError::invalid("base_url", "URL must not carry a query"));
        }

        if let AuthConfig::Basic { username, .. } = &self.auth {
            if username.is_empty() {
                return Err(ClientError::invalid("auth.username", "username is empty"));
            }
        }

        if self.connection.connection_timeout_secs == 0 || self.connection.read_timeout_secs == 0 {
            return Err(ClientError::invalid("connection", "timeouts must be positive"));
        }

        Ok(())
    }

    /// Copy with secrets masked, suitable for logging.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.auth = config.auth.redacted();
        config
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
