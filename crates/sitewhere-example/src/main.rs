//! sitewhere-example entry point.

use std::process::ExitCode;

use clap::Parser;

use sitewhere_core::{TracingConfig, init_tracing};
use sitewhere_example::app;
use sitewhere_example::cli::Cli;
use sitewhere_example::error::AppResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    // Load configuration
    let config = app::load_config(&cli)?;

    // Initialize tracing
    let tracing = if cli.debug || config.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::default()
    };
    init_tracing(tracing.with_format(cli.log_format))?;

    app::run(cli, config).await
}
