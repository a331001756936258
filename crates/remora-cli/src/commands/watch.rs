use std::time::Duration;

use remora_events::{Event, EventStream};

use crate::client::{AppContext, CliResult};
use crate::output::render_event;

const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Print client events until the session drops or the user interrupts.
pub(crate) async fn handle_watch(ctx: &AppContext) -> CliResult<()> {
    let mut stream = ctx.client.events().subscribe(None);

    if let Err(err) = ctx.connect().await {
        drain_pending(ctx, &mut stream).await?;
        return Err(err);
    }

    watch_until(ctx, &mut stream, tokio::signal::ctrl_c()).await
}

/// Render events until the session drops or `shutdown` resolves. An
/// interrupt closes the session before returning.
async fn watch_until<F: Future>(ctx: &AppContext, stream: &mut EventStream, shutdown: F) -> CliResult<()> {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                eprintln!("interrupted, closing session");
                ctx.client.disconnect().await;
                return drain_pending(ctx, stream).await;
            }
            next = stream.next() => {
                let Some(envelope) = next else {
                    return Ok(());
                };
                render_event(&envelope, ctx.output)?;
                if matches!(envelope.event, Event::ConnectionChanged { connected: false }) {
                    return Ok(());
                }
            }
        }
    }
}

/// Print whatever was already published up to the latest event id.
pub(crate) async fn drain_pending(ctx: &AppContext, stream: &mut EventStream) -> CliResult<()> {
    let Some(last) = ctx.client.events().last_event_id() else {
        return Ok(());
    };
    while let Ok(Some(envelope)) = tokio::time::timeout(DRAIN_TIMEOUT, stream.next()).await {
        render_event(&envelope, ctx.output)?;
        if envelope.id >= last {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use anyhow::anyhow;
    use clap::Parser;
    use httpmock::prelude::*;
    use remora_client::{ConnectionState, PollPhase};
    use remora_rpc::TORRENT_FIELDS;
    use serde_json::json;

    const RPC_PATH: &str = "/transmission/rpc";

    #[tokio::test]
    async fn interrupt_closes_the_session() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST)
                .path(RPC_PATH)
                .json_body(json!({"method": "session-get", "tag": 1}));
            then.status(200)
                .json_body(json!({"result": "success", "arguments": {"version": "4.0.5"}}));
        });
        let poll = server.mock(|when, then| {
            when.method(POST).path(RPC_PATH).json_body(json!({
                "method": "torrent-get",
                "arguments": {"fields": TORRENT_FIELDS},
                "tag": 2
            }));
            then.status(200)
                .json_body(json!({"result": "success", "arguments": {"torrents": []}}));
        });

        let port = server.port().to_string();
        let cli = Cli::try_parse_from([
            "remora",
            "--host",
            "127.0.0.1",
            "--port",
            port.as_str(),
            "--poll-secs",
            "30",
            "--output",
            "json",
            "watch",
        ])?;
        let ctx = AppContext::from_cli(&cli).map_err(|err| anyhow!(err.display_message()))?;
        let mut stream = ctx.client.events().subscribe(None);
        ctx.connect().await.map_err(|err| anyhow!(err.display_message()))?;

        watch_until(&ctx, &mut stream, tokio::time::sleep(Duration::from_millis(150)))
            .await
            .map_err(|err| anyhow!(err.display_message()))?;

        assert_eq!(*ctx.client.connection().borrow(), ConnectionState::Disconnected);
        assert_eq!(*ctx.client.poll_phase().borrow(), PollPhase::Idle);
        poll.assert();
        Ok(())
    }
}
