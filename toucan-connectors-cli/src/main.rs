//! `toucan-connectors` binary entry point.

use clap::Parser;
use std::process::ExitCode;
use toucan_connectors_cli::{Cli, run};
use toucan_connectors_core::logging::init_logging_with_format;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging_with_format(
        cli.global.verbose,
        cli.global.quiet,
        cli.global.log_format(),
    ) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let mut stdout = std::io::stdout().lock();
    match run(&cli, &mut stdout).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
