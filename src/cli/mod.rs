//! Command line interface for clausewitz_pipeline.
//!
//! Parses arguments, builds the pipeline over the docker engine and reports
//! results and failures on the terminal.

mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, RuntimeConfig};
pub use commands::execute_command;
pub use output::OutputManager;

/// Main CLI entry point; returns the process exit code
pub async fn run() -> i32 {
    let args = Args::parse_args();
    execute_command(args).await
}
