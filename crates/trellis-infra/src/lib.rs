//! Infrastructure side of Trellis
//!
//! Resolves where Terraform state lives, describes the target platform,
//! prepares a Terraform working directory inside the cluster asset directory
//! and hands back an initialized [`Executor`] for provisioning and output
//! queries.

#![deny(missing_docs)]

pub mod backend;
pub mod bootstrap;
pub mod existence;
pub mod platform;
pub mod terraform;

pub use backend::{configured_backend, resolve_backend, Backend, BackendError, BackendKind};
pub use bootstrap::{bootstrap, bootstrap_with, BootstrapOptions};
pub use existence::cluster_exists;
pub use platform::{platform_from_config, Platform, PlatformError, PlatformMeta};
pub use terraform::{
    ApplyReport, Executor, ExecutorConfig, ExecutorError, ExecutorFactory, Outputs,
    TerraformExecutor, TerraformFactory,
};
