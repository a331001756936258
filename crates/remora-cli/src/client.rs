//! Shared client wiring and error types for the CLI.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use anyhow::anyhow;
use remora_client::{ClientConfig, ClientError, RemoraClient};
use remora_events::EventBus;
use remora_telemetry::Metrics;

use crate::cli::{Cli, OutputFormat};

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ClientError> for CliError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Config { .. } | ClientError::EmptySelection => {
                Self::Validation(err.user_message())
            }
            other => Self::Failure(anyhow!(other.user_message())),
        }
    }
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) client: RemoraClient,
    pub(crate) output: OutputFormat,
}

impl AppContext {
    /// Resolve the connection profile and build the daemon client.
    pub(crate) fn from_cli(cli: &Cli) -> CliResult<Self> {
        let config = resolve_config(cli)?;
        let metrics = Metrics::new()
            .map_err(|err| CliError::failure(anyhow!("failed to initialise metrics: {err}")))?;
        let client = RemoraClient::http(config, EventBus::new(), metrics)?;
        Ok(Self {
            client,
            output: cli.output,
        })
    }

    /// Open the session, surfacing the daemon's error text on failure.
    pub(crate) async fn connect(&self) -> CliResult<()> {
        self.client.connect().await.map_err(CliError::from)
    }
}

/// Layer CLI flags (and their `REMORA_*` environment variables) over the
/// optional YAML profile.
pub(crate) fn resolve_config(cli: &Cli) -> CliResult<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_yaml_file(path)
            .map_err(|err| CliError::validation(err.detail()))?,
        None => ClientConfig::default(),
    };

    if let Some(host) = &cli.host {
        config.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.tls {
        config.tls = true;
    }
    if let Some(path) = &cli.rpc_path {
        config.rpc_path.clone_from(path);
    }
    if cli.username.is_some() {
        config.username.clone_from(&cli.username);
    }
    if cli.password.is_some() {
        config.password.clone_from(&cli.password);
    }
    if let Some(secs) = cli.poll_secs {
        config.poll_interval = seconds("--poll-secs", secs)?;
    }
    if let Some(secs) = cli.timeout {
        config.request_timeout = seconds("--timeout", secs)?;
    }

    config
        .validate()
        .map_err(|err| CliError::validation(format!("invalid connection settings: {}", err.detail())))?;
    Ok(config)
}

fn seconds(flag: &str, value: f64) -> CliResult<Duration> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|duration| !duration.is_zero())
        .ok_or_else(|| CliError::validation(format!("{flag} must be a positive number of seconds")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write as _;

    #[test]
    fn exit_codes_split_validation_and_failure() {
        assert_eq!(CliError::validation("bad").exit_code(), 2);
        assert_eq!(CliError::failure(anyhow!("down")).exit_code(), 3);
    }

    #[test]
    fn flags_override_profile_values() -> anyhow::Result<()> {
        let mut profile = tempfile::NamedTempFile::new()?;
        writeln!(profile, "host: nas.local\nport: 9999\nusername: admin")?;
        let path = profile.path().to_string_lossy().to_string();

        let cli = Cli::try_parse_from(["remora", "--config", path.as_str(), "--port", "9091", "ls"])?;
        let config = resolve_config(&cli).map_err(|err| anyhow!(err.display_message()))?;

        assert_eq!(config.host, "nas.local");
        assert_eq!(config.port, 9091);
        assert_eq!(config.username.as_deref(), Some("admin"));
        Ok(())
    }

    #[test]
    fn invalid_settings_are_validation_errors() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["remora", "--rpc-path", "rpc", "ls"])?;
        let err = resolve_config(&cli).err();
        assert!(matches!(err, Some(CliError::Validation(_))));

        let cli = Cli::try_parse_from(["remora", "--poll-secs", "0", "ls"])?;
        assert_eq!(resolve_config(&cli).err().map(|err| err.exit_code()), Some(2));
        Ok(())
    }
}
