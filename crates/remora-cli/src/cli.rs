//! Argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use remora_client::{StatusFlags, TorrentFilter};
use remora_telemetry::{LogFormat, LoggingConfig, build_sha, init_logging};
use tracing::Instrument as _;
use uuid::Uuid;

use crate::client::{AppContext, CliResult};
use crate::commands::session::{handle_session, handle_set};
use crate::commands::torrents::{handle_action, handle_add, handle_list, handle_remove};
use crate::commands::watch::handle_watch;
use crate::output::render_metrics;

const DEFAULT_CLI_LOG_LEVEL: &str = "warn";

/// Parses CLI arguments, executes the requested command and returns the
/// process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    install_logging(&cli);

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "remora",
        %run_id,
        build_sha = build_sha(),
        command = command_label(&cli.command)
    );
    let result = execute(cli).instrument(span).await;

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

fn install_logging(cli: &Cli) {
    let format = cli
        .log_format
        .as_deref()
        .map_or_else(LogFormat::infer, LogFormat::from_name);
    let config = LoggingConfig {
        level: &cli.log_level,
        format,
        build_sha: option_env!("REMORA_BUILD_SHA").unwrap_or("dev"),
    };
    if let Err(err) = init_logging(&config) {
        eprintln!("warning: logging unavailable: {err}");
    }
}

async fn execute(cli: Cli) -> CliResult<()> {
    let ctx = AppContext::from_cli(&cli)?;
    let result = dispatch(&ctx, cli.command).await;
    ctx.client.disconnect().await;

    if cli.metrics {
        match ctx.client.metrics().render() {
            Ok(text) => render_metrics(&text),
            Err(err) => eprintln!("warning: metrics unavailable: {err}"),
        }
    }
    result
}

pub(crate) async fn dispatch(ctx: &AppContext, command: Command) -> CliResult<()> {
    match command {
        Command::Watch => handle_watch(ctx).await,
        Command::Ls(args) => handle_list(ctx, &args).await,
        Command::Session => handle_session(ctx).await,
        Command::Set(args) => handle_set(ctx, args).await,
        Command::Start(args) => handle_action(ctx, ActionKind::Start, args).await,
        Command::Stop(args) => handle_action(ctx, ActionKind::Stop, args).await,
        Command::Verify(args) => handle_action(ctx, ActionKind::Verify, args).await,
        Command::Remove(args) => handle_remove(ctx, args).await,
        Command::Add(args) => handle_add(ctx, args).await,
    }
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Watch => "watch",
        Command::Ls(_) => "ls",
        Command::Session => "session",
        Command::Set(_) => "set",
        Command::Start(_) => "start",
        Command::Stop(_) => "stop",
        Command::Verify(_) => "verify",
        Command::Remove(_) => "remove",
        Command::Add(_) => "add",
    }
}

#[derive(Parser, Debug)]
#[command(name = "remora", version, about = "Command-line client for a remote torrent daemon")]
pub(crate) struct Cli {
    #[arg(long, global = true, env = "REMORA_HOST")]
    pub(crate) host: Option<String>,
    #[arg(long, global = true, env = "REMORA_PORT")]
    pub(crate) port: Option<u16>,
    #[arg(long, global = true, env = "REMORA_TLS", help = "Connect over HTTPS")]
    pub(crate) tls: bool,
    #[arg(long, global = true, env = "REMORA_RPC_PATH")]
    pub(crate) rpc_path: Option<String>,
    #[arg(long, global = true, env = "REMORA_USERNAME")]
    pub(crate) username: Option<String>,
    #[arg(long, global = true, env = "REMORA_PASSWORD", hide_env_values = true)]
    pub(crate) password: Option<String>,
    #[arg(
        long,
        global = true,
        env = "REMORA_POLL_SECS",
        help = "Delay between torrent-list polls, in seconds"
    )]
    pub(crate) poll_secs: Option<f64>,
    #[arg(
        long,
        global = true,
        env = "REMORA_TIMEOUT_SECS",
        help = "Per-request timeout, in seconds"
    )]
    pub(crate) timeout: Option<f64>,
    #[arg(
        long,
        global = true,
        env = "REMORA_CONFIG",
        help = "YAML connection profile; flags override its values"
    )]
    pub(crate) config: Option<PathBuf>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[arg(long, global = true, env = "REMORA_LOG_LEVEL", default_value = DEFAULT_CLI_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[arg(long, global = true, env = "REMORA_LOG_FORMAT", help = "json or pretty")]
    pub(crate) log_format: Option<String>,
    #[arg(long, global = true, help = "Print Prometheus metrics to stderr on exit")]
    pub(crate) metrics: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Stream client events until the session ends or Ctrl-C is pressed.
    Watch,
    /// List torrents from the first snapshot.
    Ls(ListArgs),
    /// Print the daemon's session settings.
    Session,
    /// Change session settings.
    Set(SetArgs),
    /// Start torrents.
    Start(IdsArgs),
    /// Stop torrents.
    Stop(IdsArgs),
    /// Verify local data of torrents.
    Verify(IdsArgs),
    /// Remove torrents from the daemon.
    Remove(RemoveArgs),
    /// Add torrents from files, URLs or magnet links.
    Add(AddArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ListArgs {
    /// Only torrents in this state.
    #[arg(long, value_parser = parse_state)]
    pub(crate) state: Option<StatusFlags>,
    /// Only torrents whose name contains this text, ignoring case.
    #[arg(long)]
    pub(crate) name: Option<String>,
}

impl ListArgs {
    pub(crate) fn filter(&self) -> TorrentFilter {
        let mut filter = TorrentFilter::all();
        if let Some(state) = self.state {
            filter = filter.with_state(state);
        }
        if let Some(name) = &self.name {
            filter = filter.with_name(name.as_str());
        }
        filter
    }
}

#[derive(Args, Debug)]
pub(crate) struct SetArgs {
    /// Settings as KEY=VALUE; values are parsed as JSON when possible.
    #[arg(required = true, value_parser = parse_setting)]
    pub(crate) settings: Vec<(String, serde_json::Value)>,
}

#[derive(Args, Debug)]
pub(crate) struct IdsArgs {
    /// Torrent ids.
    #[arg(required = true)]
    pub(crate) ids: Vec<i64>,
}

#[derive(Args, Debug)]
pub(crate) struct RemoveArgs {
    /// Torrent ids.
    #[arg(required = true)]
    pub(crate) ids: Vec<i64>,
    /// Also delete downloaded data.
    #[arg(long)]
    pub(crate) delete_data: bool,
}

#[derive(Args, Debug)]
pub(crate) struct AddArgs {
    /// `.torrent` files, http(s) URLs or magnet links.
    #[arg(required = true)]
    pub(crate) sources: Vec<String>,
    /// Add without starting.
    #[arg(long)]
    pub(crate) paused: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ActionKind {
    Start,
    Stop,
    Verify,
}

pub(crate) fn parse_setting(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("setting name missing in '{raw}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub(crate) fn parse_state(raw: &str) -> Result<StatusFlags, String> {
    StatusFlags::from_label(raw).ok_or_else(|| {
        format!("unknown state '{raw}', expected downloading, seeding, paused, checking or check-wait")
    })
}

impl From<ActionKind> for remora_client::TorrentAction {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Start => Self::Start,
            ActionKind::Stop => Self::Stop,
            ActionKind::Verify => Self::Verify,
        }
    }
}
