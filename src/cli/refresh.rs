//! Refresh command implementation

use colored::Colorize;
use serde_json::{Value, json};

use crate::cli::CommandContext;
use crate::error::Result;
use crate::output::{self, formatters};
use crate::refresh::RefreshOutcome;

/// Fetch every bulk dataset now and replace the stored snapshots
pub async fn run(ctx: &CommandContext) -> Result<()> {
    let service = ctx.service()?;
    let refresher = service.refresher();
    let tz = refresher.schedule().timezone();

    let outcome = refresher.force_refresh().await?;

    output::emit(&report(&outcome), ctx.format, |_| match &outcome {
        RefreshOutcome::Completed {
            refreshed_at,
            datasets,
        } => {
            println!(
                "{} Refreshed {} datasets at {}",
                "✓".green(),
                datasets.len(),
                formatters::format_instant(Some(*refreshed_at), tz)
            );
            for info in datasets {
                println!(
                    "  {} {}",
                    info.id.bold(),
                    formatters::format_size(info.size_bytes).dimmed()
                );
            }
        }
        // A forced refresh never checks staleness, so only a running refresh
        // stops it
        RefreshOutcome::Skipped | RefreshOutcome::Fresh { .. } => {
            println!("{} A refresh is already running", "⚠".yellow());
        }
    })
}

/// JSON report for a forced refresh
fn report(outcome: &RefreshOutcome) -> Value {
    match outcome {
        RefreshOutcome::Completed {
            refreshed_at,
            datasets,
        } => json!({
            "status": "completed",
            "refreshed_at": refreshed_at,
            "datasets": datasets,
        }),
        RefreshOutcome::Skipped | RefreshOutcome::Fresh { .. } => json!({ "status": "skipped" }),
    }
}
