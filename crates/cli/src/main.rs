//! Facility calculator binary entrypoint.

use std::process::ExitCode;

use clap::Parser;

use facility_cli::{Cli, init_tracing, run};
use facility_common::config::AppConfig;
use facility_common::error::AppError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    // Initialize tracing
    if let Err(e) = init_tracing(config.log_format) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    let stdout = std::io::stdout();
    match run(cli, &config, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "Command failed");
            fail(&e)
        }
    }
}

fn fail(error: &AppError) -> ExitCode {
    eprintln!("{}", error.to_json());
    ExitCode::from(error.exit_code())
}
