//! Connection settings for a daemon profile.
//!
//! Profiles are plain YAML documents. Durations are written in (possibly
//! fractional) seconds.

use std::path::Path;
use std::time::Duration;

use remora_rpc::{HttpTransportConfig, Url};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default daemon host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default daemon RPC port.
pub const DEFAULT_PORT: u16 = 9091;
/// Default RPC endpoint path.
pub const DEFAULT_RPC_PATH: &str = "/transmission/rpc";
/// Default delay between torrent-list polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings describing how to reach one daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Daemon host name or address.
    pub host: String,
    /// Daemon RPC port.
    pub port: u16,
    /// Use HTTPS.
    pub tls: bool,
    /// Path of the RPC endpoint.
    pub rpc_path: String,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Delay between the end of one poll and the start of the next.
    #[serde(with = "seconds")]
    pub poll_interval: Duration,
    /// Per-request timeout.
    #[serde(with = "seconds")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: false,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            username: None,
            password: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Load a profile from a YAML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or validated.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the settings can produce a usable endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must be between 1 and 65535"));
        }
        if !self.rpc_path.starts_with('/') {
            return Err(invalid("rpc_path", "must start with '/'"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval", "must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "must be greater than zero"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(invalid("password", "requires a username"));
        }
        self.rpc_url().map(|_| ())
    }

    /// Endpoint URL built from scheme, host, port and path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when the pieces do not form a URL.
    pub fn rpc_url(&self) -> Result<Url, ConfigError> {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.rpc_path)
            .parse()
            .map_err(|_| invalid("host", "does not form a valid URL"))
    }

    /// Transport settings derived from this profile.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the profile fails validation.
    pub fn transport_config(&self) -> Result<HttpTransportConfig, ConfigError> {
        self.validate()?;
        Ok(HttpTransportConfig {
            endpoint: self.rpc_url()?,
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.request_timeout,
        })
    }
}

const fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidField { field, reason }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
