//! Terraform working directory and executor
//!
//! An [`Executor`] is bound to one working directory. It must be initialized
//! with [`Executor::init`] before outputs can be read or changes applied.

mod apply;
mod configure;
mod executor;

use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use thiserror::Error;

pub use apply::{ApplyFailed, ApplyReport, ChangeSummary, ResourceFailure};
pub use configure::{configure, ConfigureError, BACKEND_FILE, CLUSTER_FILE};
pub use executor::{
    parse_outputs, terraform_binary, TerraformExecutor, TerraformFactory, TERRAFORM_BIN_ENV,
};

/// Output name to value, as reported by `terraform output -json`
pub type Outputs = serde_json::Map<String, Value>;

/// Errors from driving Terraform
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The terraform binary could not be located
    #[error("terraform binary not found: {0}")]
    BinaryNotFound(String),

    /// The working directory does not exist
    #[error("working directory {} does not exist", .0.display())]
    MissingWorkingDir(PathBuf),

    /// An operation that needs `terraform init` ran before it
    #[error("terraform is not initialized in {}", .0.display())]
    NotInitialized(PathBuf),

    /// A terraform command exited unsuccessfully
    #[error("command failed: {command} - {message}")]
    CommandFailed {
        /// The command that failed
        command: String,
        /// Captured stderr
        message: String,
    },

    /// A requested output does not exist
    #[error("output '{0}' not found")]
    OutputNotFound(String),

    /// Terraform printed JSON we could not decode
    #[error("decoding terraform output: {0}")]
    Decode(#[from] serde_json::Error),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings an executor is created with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Terraform root module directory
    pub working_dir: PathBuf,
    /// Echo Terraform's progress to stdout
    pub verbose: bool,
}

/// Handle driving Terraform in a single working directory
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    /// Directory Terraform runs in
    fn working_dir(&self) -> PathBuf;

    /// Initialize providers, modules and the state backend
    async fn init(&self) -> Result<(), ExecutorError>;

    /// All outputs currently in state
    async fn outputs(&self) -> Result<Outputs, ExecutorError>;

    /// A single output by name
    async fn output(&self, name: &str) -> Result<Value, ExecutorError>;

    /// Apply the configuration and report per-resource outcomes
    async fn apply(&self) -> Result<ApplyReport, ExecutorError>;

    /// Destroy everything in state
    async fn destroy(&self) -> Result<(), ExecutorError>;
}

/// Creates executors bound to a working directory
#[cfg_attr(test, automock)]
pub trait ExecutorFactory: Send + Sync {
    /// Build an executor for `config`
    fn create(&self, config: ExecutorConfig) -> Result<Box<dyn Executor>, ExecutorError>;
}
