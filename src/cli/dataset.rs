//! Dataset command implementation

use crate::cli::{CommandContext, OutputFormat};
use crate::error::Result;
use crate::output;
use crate::refresh::Dataset;

/// Print a stored dataset. A dataset that was never stored is fetched first.
pub async fn run(ctx: &CommandContext, id: &str) -> Result<()> {
    let dataset: Dataset = id.parse()?;
    let service = ctx.service()?;
    let payload = service.refresher().get_dataset(dataset).await?;

    match ctx.format {
        OutputFormat::Json => output::emit(&payload, ctx.format, |_| {}),
        OutputFormat::Pretty => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
    }
}
