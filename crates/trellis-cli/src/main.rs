//! Trellis CLI
//!
//! Provisions cluster infrastructure with Terraform and keeps control-plane
//! components converged with Helm.

use std::process::ExitCode;

use clap::Parser;
use trellis_common::telemetry::init_logging;

use trellis_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_format(), cli.verbose) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(kind = %err.kind(), root_cause = %err.root_cause(), "command failed");
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
