//! Status command implementation

use chrono::Utc;
use chrono_tz::Tz;
use colored::Colorize;
use tabled::Tabled;

use crate::cli::CommandContext;
use crate::error::Result;
use crate::output::{self, formatters, table};
use crate::refresh::{RefreshStatus, elapsed_days};

#[derive(Tabled)]
struct DatasetRow {
    #[tabled(rename = "DATASET")]
    id: &'static str,
    #[tabled(rename = "SIZE")]
    size: String,
    #[tabled(rename = "UPDATED")]
    updated: String,
}

/// Show when bulk data was last refreshed and what is stored. Never calls
/// the upstream API.
pub fn run(ctx: &CommandContext) -> Result<()> {
    let service = ctx.service()?;
    let status = service.refresher().get_status()?;
    let tz = service.refresher().schedule().timezone();

    output::emit(&status, ctx.format, |status| {
        print_pretty(status, tz, &ctx.config.upstream.base_url)
    })
}

fn print_pretty(status: &RefreshStatus, tz: Tz, base_url: &str) {
    println!("{}\n", "Courtside Bulk Data Status".bold());
    println!("Upstream API: {}", base_url.cyan());
    println!();

    match status.last_refresh {
        Some(last) if elapsed_days(last, Utc::now(), tz) >= 1 => println!(
            "{} Last refresh {} (stale, will refresh on next start)",
            "⚠".yellow(),
            formatters::format_instant(Some(last), tz)
        ),
        Some(last) => println!(
            "{} Last refresh {}",
            "✓".green(),
            formatters::format_instant(Some(last), tz)
        ),
        None => {
            println!("{} Bulk data has never been refreshed", "✗".red());
            println!("  → Run 'courtside refresh' to fetch it");
        }
    }

    if status.is_refreshing {
        println!("{} Refresh in progress", "○".dimmed());
    }
    println!(
        "{} Next scheduled refresh {}",
        "○".dimmed(),
        formatters::format_instant(Some(status.next_refresh), tz)
    );
    println!();

    let rows: Vec<DatasetRow> = status
        .datasets
        .iter()
        .map(|d| DatasetRow {
            id: d.id,
            size: d
                .size_bytes
                .map(formatters::format_size)
                .unwrap_or_else(|| "-".to_string()),
            updated: d
                .updated_at
                .map(|at| formatters::format_instant(Some(at), tz))
                .unwrap_or_else(|| "never".to_string()),
        })
        .collect();
    println!("{}", table::format_table(&rows));
}
