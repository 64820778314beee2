//! Trellis CLI library

pub mod commands;

use clap::{Parser, Subcommand};
use trellis_common::telemetry::LogFormat;
use trellis_common::Result;

use commands::cluster::ClusterCommand;

/// Trellis - Kubernetes cluster lifecycle management
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Stream Terraform output and log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, update or destroy a cluster
    #[command(subcommand)]
    Cluster(ClusterCommand),
}

impl Cli {
    /// Log format selected by the flags
    pub fn log_format(&self) -> LogFormat {
        if self.json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Cluster(cmd) => commands::cluster::run(cmd, self.verbose).await,
        }
    }
}
