pub mod replay;
pub mod run;

use arcscope_core::api::CliError;

use crate::commands::cli::OutputFormat;
use crate::render::{format_text, RunReport};

pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let s = serde_json::to_string_pretty(report)
                .map_err(|e| CliError::Command(e.to_string()))?;
            println!("{s}");
        }
        OutputFormat::Text => print!("{}", format_text(report)),
    }
    Ok(())
}
