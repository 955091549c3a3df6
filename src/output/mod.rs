//! Output formatting for CLI results

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::Result;

pub mod formatters;
pub mod json;
pub mod table;

/// Print a value as the JSON envelope, or run `pretty` for human output
pub fn emit<T: Serialize>(data: &T, format: OutputFormat, pretty: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", json::format_json(data)?),
        OutputFormat::Pretty => pretty(data),
    }
    Ok(())
}
