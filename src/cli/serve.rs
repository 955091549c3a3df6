//! Run command: keeps bulk data current until interrupted

use colored::Colorize;
use log::info;

use crate::cli::CommandContext;
use crate::error::Result;

/// Check staleness, start the schedule and sweep, then wait for Ctrl-C
pub async fn run(ctx: &CommandContext) -> Result<()> {
    let service = ctx.service()?;

    if let Err(e) = service.refresher().check_and_refresh_if_needed().await {
        log::error!("Startup refresh failed, serving stored data: {}", e);
    }

    service.start().await;
    let next = service.refresher().get_status()?.next_refresh;
    eprintln!(
        "{} Courtside running against {} (next refresh {}). Press Ctrl-C to stop.",
        "✓".green(),
        ctx.config.upstream.base_url.cyan(),
        next
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    service.shutdown().await;
    Ok(())
}
