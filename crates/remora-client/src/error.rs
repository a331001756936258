//! Error types for the client core.
//!
//! # Design
//!
//! - Messages are constant; context lives in fields.
//! - `user_message()` renders the text published on the event bus.

use std::io;
use std::path::PathBuf;

use remora_rpc::RpcError;
use thiserror::Error;

/// Failures raised while loading or validating [`crate::ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Profile file could not be read.
    #[error("failed to read configuration file")]
    Read {
        /// Profile path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// Profile file was not valid YAML for the expected shape.
    #[error("failed to parse configuration file")]
    Parse {
        /// Profile path.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    /// Human-readable description including context.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::InvalidField { field, reason } => format!("{field} {reason}"),
            Self::Read { path, source } => format!("{}: {source}", path.display()),
            Self::Parse { path, source } => format!("{}: {source}", path.display()),
        }
    }
}

/// The torrent list in a `torrent-get` response could not be used.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Response lacked a usable torrent array or a record lacked an id.
    #[error("malformed torrent list")]
    Malformed {
        /// What was wrong with the payload.
        reason: &'static str,
        /// Position of the offending record, when one was at fault.
        index: Option<usize>,
    },
}

/// Errors surfaced by [`crate::RemoraClient`] and the action dispatcher.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation needs a connected session.
    #[error("client is not connected")]
    NotConnected,
    /// An action was requested for an empty selection.
    #[error("no torrents selected")]
    EmptySelection,
    /// Connection settings were unusable.
    #[error("invalid connection settings")]
    Config {
        /// Validation or loading failure.
        #[source]
        source: ConfigError,
    },
    /// A daemon request failed.
    #[error("rpc request failed")]
    Rpc {
        /// Daemon method that failed.
        operation: &'static str,
        /// Classified transport failure.
        #[source]
        source: RpcError,
    },
    /// A local `.torrent` file could not be read.
    #[error("torrent file unavailable")]
    TorrentFile {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The connection attempt was overtaken by a disconnect or newer connect.
    #[error("connection attempt superseded")]
    Superseded,
    /// The batch worker is no longer running.
    #[error("batch worker unavailable")]
    WorkerUnavailable,
    /// A background action task panicked or was cancelled.
    #[error("background task failed")]
    Task {
        /// Join failure reported by tokio.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ClientError {
    /// Human-readable message suitable for the event bus or a terminal.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { source } => {
                format!("Unable to use connection settings: {}", source.detail())
            }
            Self::Rpc { source, .. } => source.user_message(),
            Self::TorrentFile { path, source } => {
                format!("Unable to open torrent file {}: {source}", path.display())
            }
            other => other.to_string(),
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_failures_render_with_field_context() {
        let err = ClientError::from(ConfigError::InvalidField {
            field: "host",
            reason: "must not be empty",
        });
        assert_eq!(
            err.user_message(),
            "Unable to use connection settings: host must not be empty"
        );
    }

    #[test]
    fn rpc_failures_use_transport_message() {
        let err = ClientError::Rpc {
            operation: "torrent-start",
            source: RpcError::Http { code: 409 },
        };
        assert_eq!(err.user_message(), "Request failed with HTTP code 409");
        assert_eq!(err.to_string(), "rpc request failed");
    }
}
