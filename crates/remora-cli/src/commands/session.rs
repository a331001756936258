use anyhow::anyhow;
use serde_json::Map;

use crate::cli::SetArgs;
use crate::client::{AppContext, CliError, CliResult};
use crate::output::render_settings;

pub(crate) async fn handle_session(ctx: &AppContext) -> CliResult<()> {
    ctx.connect().await?;
    let settings = ctx
        .client
        .session_info()
        .await
        .settings
        .ok_or_else(|| CliError::failure(anyhow!("daemon returned no session settings")))?;
    render_settings(&settings, ctx.output)
}

pub(crate) async fn handle_set(ctx: &AppContext, args: SetArgs) -> CliResult<()> {
    let count = args.settings.len();
    let settings: Map<_, _> = args.settings.into_iter().collect();

    ctx.connect().await?;
    ctx.client.update_settings(settings).await?;
    println!("updated {count} setting(s)");
    Ok(())
}
