use std::path::PathBuf;

use anyhow::anyhow;
use remora_client::{AddSource, TorrentAction};
use remora_events::{Event, EventStream};

use crate::cli::{ActionKind, AddArgs, IdsArgs, ListArgs, RemoveArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::output::render_torrent_list;

pub(crate) async fn handle_list(ctx: &AppContext, args: &ListArgs) -> CliResult<()> {
    let mut stream = ctx.client.events().subscribe(None);
    ctx.connect().await?;
    wait_for_snapshot(&mut stream).await?;
    let snapshot = ctx.client.filtered_snapshot(&args.filter()).await;
    render_torrent_list(&snapshot, ctx.output)
}

/// Wait for the first reconciled snapshot, failing if the session drops first.
async fn wait_for_snapshot(stream: &mut EventStream) -> CliResult<()> {
    let mut last_error = None;
    while let Some(envelope) = stream.next().await {
        match envelope.event {
            Event::TorrentsUpdated { .. } => return Ok(()),
            Event::ErrorRaised { message } => last_error = Some(message),
            Event::ConnectionChanged { connected: false } => {
                let message = last_error.unwrap_or_else(|| "session closed".to_string());
                return Err(CliError::failure(anyhow!(message)));
            }
            _ => {}
        }
    }
    Err(CliError::failure(anyhow!("event stream closed before the torrent list arrived")))
}

pub(crate) async fn handle_action(ctx: &AppContext, kind: ActionKind, args: IdsArgs) -> CliResult<()> {
    run_action(ctx, kind.into(), &args.ids).await
}

pub(crate) async fn handle_remove(ctx: &AppContext, args: RemoveArgs) -> CliResult<()> {
    let action = TorrentAction::Remove {
        delete_data: args.delete_data,
    };
    run_action(ctx, action, &args.ids).await
}

async fn run_action(ctx: &AppContext, action: TorrentAction, ids: &[i64]) -> CliResult<()> {
    ctx.connect().await?;
    ctx.client.actions().submit(action, ids)?.wait().await?;
    println!("requested {action} for {} torrent(s)", ids.len());
    Ok(())
}

pub(crate) async fn handle_add(ctx: &AppContext, args: AddArgs) -> CliResult<()> {
    let (files, links) = split_sources(&args.sources);
    ctx.connect().await?;

    let mut failed = 0_usize;
    if !files.is_empty() {
        let outcomes = ctx
            .client
            .actions()
            .submit_add_batch(files, args.paused)
            .await?
            .wait()
            .await?;
        for outcome in outcomes {
            match outcome.result {
                Ok(()) => println!("added {}", outcome.path.display()),
                Err(err) => {
                    failed += 1;
                    eprintln!("failed {}: {}", outcome.path.display(), err.user_message());
                }
            }
        }
    }

    let mut tickets = Vec::with_capacity(links.len());
    for link in links {
        let ticket = ctx
            .client
            .actions()
            .submit_add(AddSource::Url(link.clone()), args.paused)?;
        tickets.push((link, ticket));
    }
    for (link, ticket) in tickets {
        match ticket.wait().await {
            Ok(()) => println!("added {link}"),
            Err(err) => {
                failed += 1;
                eprintln!("failed {link}: {}", err.user_message());
            }
        }
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::failure(anyhow!(
            "{failed} of {} torrent(s) could not be added",
            args.sources.len()
        )))
    }
}

/// Separate local `.torrent` files from links the daemon fetches itself.
pub(crate) fn split_sources(sources: &[String]) -> (Vec<PathBuf>, Vec<String>) {
    let mut files = Vec::new();
    let mut links = Vec::new();
    for raw in sources {
        match AddSource::parse(raw) {
            AddSource::File(path) => files.push(path),
            AddSource::Url(url) => links.push(url),
        }
    }
    (files, links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use httpmock::prelude::*;
    use remora_rpc::TORRENT_FIELDS;
    use serde_json::json;

    const RPC_PATH: &str = "/transmission/rpc";

    fn context_for(server: &MockServer, command: &[&str]) -> anyhow::Result<AppContext> {
        let port = server.port().to_string();
        let mut argv = vec![
            "remora",
            "--host",
            "127.0.0.1",
            "--port",
            port.as_str(),
            "--poll-secs",
            "30",
            "--output",
            "json",
        ];
        argv.extend_from_slice(command);
        let cli = Cli::try_parse_from(argv)?;
        AppContext::from_cli(&cli).map_err(|err| anyhow!(err.display_message()))
    }

    #[test]
    fn sources_split_into_files_and_links() {
        let (files, links) = split_sources(&[
            "one.torrent".to_string(),
            "magnet:?xt=urn:btih:abc".to_string(),
            "https://example.org/two.torrent".to_string(),
        ]);
        assert_eq!(files, vec![PathBuf::from("one.torrent")]);
        assert_eq!(
            links,
            vec![
                "magnet:?xt=urn:btih:abc".to_string(),
                "https://example.org/two.torrent".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn list_renders_first_snapshot() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let handshake = server.mock(|when, then| {
            when.method(POST)
                .path(RPC_PATH)
                .json_body(json!({"method": "session-get", "tag": 1}));
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": {"version": "4.0.5"}
            }));
        });
        let poll = server.mock(|when, then| {
            when.method(POST).path(RPC_PATH).json_body(json!({
                "method": "torrent-get",
                "arguments": {"fields": TORRENT_FIELDS},
                "tag": 2
            }));
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": {"torrents": [
                    {"id": 1, "name": "debian.iso", "status": 4, "rateDownload": 0, "percentDone": 1.0},
                    {"id": 2, "name": "arch.iso", "status": 8, "rateDownload": 512, "percentDone": 0.5}
                ]}
            }));
        });

        let ctx = context_for(&server, &["ls"])?;
        let result = handle_list(&ctx, &ListArgs { state: None, name: None }).await;
        let snapshot = ctx.client.snapshot().await;
        ctx.client.disconnect().await;

        assert!(result.is_ok());
        handshake.assert();
        poll.assert();
        assert_eq!(snapshot.update_serial, 1);
        assert_eq!(snapshot.stats.total, 2);
        assert_eq!(snapshot.stats.down_rate_total, 512);
        assert_eq!(snapshot.records[0].name, "arch.iso");
        Ok(())
    }

    #[tokio::test]
    async fn list_applies_state_and_name_filters() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST)
                .path(RPC_PATH)
                .json_body(json!({"method": "session-get", "tag": 1}));
            then.status(200)
                .json_body(json!({"result": "success", "arguments": {}}));
        });
        server.mock(|when, then| {
            when.method(POST).path(RPC_PATH).json_body(json!({
                "method": "torrent-get",
                "arguments": {"fields": TORRENT_FIELDS},
                "tag": 2
            }));
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": {"torrents": [
                    {"id": 1, "name": "debian-netinst.iso", "status": 4},
                    {"id": 2, "name": "Debian-dvd.iso", "status": 8},
                    {"id": 3, "name": "arch.iso", "status": 8}
                ]}
            }));
        });

        let command = ["ls", "--state", "downloading", "--name", "debian"];
        let ctx = context_for(&server, &command)?;
        let cli = Cli::try_parse_from(std::iter::once("remora").chain(command))?;
        let args = match cli.command {
            crate::cli::Command::Ls(args) => args,
            other => return Err(anyhow!("unexpected command {other:?}")),
        };
        let result = handle_list(&ctx, &args).await;
        let filtered = ctx.client.filtered_snapshot(&args.filter()).await;
        ctx.client.disconnect().await;

        assert!(result.is_ok());
        assert_eq!(filtered.records.len(), 1);
        assert_eq!(filtered.records[0].id, 2);
        assert_eq!(filtered.stats.total, 3);
        Ok(())
    }

    #[tokio::test]
    async fn actions_without_ids_are_validation_errors() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST)
                .path(RPC_PATH)
                .json_body(json!({"method": "session-get", "tag": 1}));
            then.status(200)
                .json_body(json!({"result": "success", "arguments": {}}));
        });
        server.mock(|when, then| {
            when.method(POST).path(RPC_PATH).json_body(json!({
                "method": "torrent-get",
                "arguments": {"fields": TORRENT_FIELDS},
                "tag": 2
            }));
            then.status(200)
                .json_body(json!({"result": "success", "arguments": {"torrents": []}}));
        });

        let ctx = context_for(&server, &["ls"])?;
        let err = run_action(&ctx, TorrentAction::Start, &[])
            .await
            .err()
            .ok_or_else(|| anyhow!("expected empty selection to fail"))?;
        ctx.client.disconnect().await;

        assert_eq!(err.exit_code(), 2);
        Ok(())
    }
}
