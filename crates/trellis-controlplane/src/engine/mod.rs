//! Package deployment engine
//!
//! Releases are managed through an [`ActionContext`] scoped to one namespace
//! and authenticated with the cluster's kubeconfig.

mod helm;

use std::io;
use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tempfile::TempPath;
use thiserror::Error;

use crate::chart::Chart;
use crate::values::Values;

pub use helm::{HelmCli, HELM_BIN_ENV};

/// Errors from the deployment engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The helm binary could not be located
    #[error("helm binary not found: {0}")]
    BinaryNotFound(String),

    /// The kubeconfig could not be staged for the engine
    #[error("writing kubeconfig: {0}")]
    Kubeconfig(#[source] io::Error),

    /// A helm command exited unsuccessfully
    #[error("command failed: {command} - {message}")]
    CommandFailed {
        /// The command that failed
        command: String,
        /// Captured stderr
        message: String,
    },

    /// Helm printed JSON we could not decode
    #[error("decoding helm output: {0}")]
    Decode(#[from] serde_json::Error),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Engine state for actions in one namespace
///
/// Holds the kubeconfig for as long as the context lives.
#[derive(Debug)]
pub struct ActionContext {
    namespace: String,
    kubeconfig: Option<TempPath>,
}

impl ActionContext {
    /// Context without staged credentials
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kubeconfig: None,
        }
    }

    /// Context using a kubeconfig staged at `kubeconfig`, removed on drop
    pub fn with_kubeconfig(namespace: impl Into<String>, kubeconfig: TempPath) -> Self {
        Self {
            namespace: namespace.into(),
            kubeconfig: Some(kubeconfig),
        }
    }

    /// Namespace actions run in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Staged kubeconfig, if any
    pub fn kubeconfig_path(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }
}

/// Options for installing a release
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallOptions {
    /// Release name
    pub release_name: String,
    /// Namespace to install into
    pub namespace: String,
    /// Roll back everything if the install fails
    pub atomic: bool,
    /// Create the namespace when missing
    pub create_namespace: bool,
}

/// Options for upgrading a release
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeOptions {
    /// Roll back to the previous revision if the upgrade fails
    pub atomic: bool,
}

/// Installs and upgrades chart releases
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentEngine: Send + Sync {
    /// Create a context for actions in `namespace` using `kubeconfig`
    fn action_context(&self, namespace: &str, kubeconfig: &[u8])
        -> Result<ActionContext, EngineError>;

    /// Whether release `name` exists in the context's namespace
    async fn release_exists(&self, ctx: &ActionContext, name: &str) -> Result<bool, EngineError>;

    /// Install `chart` as a new release
    async fn install(
        &self,
        ctx: &ActionContext,
        chart: &Chart,
        values: &Values,
        options: &InstallOptions,
    ) -> Result<(), EngineError>;

    /// Upgrade release `name` to `chart` with `values`
    async fn upgrade(
        &self,
        ctx: &ActionContext,
        name: &str,
        chart: &Chart,
        values: &Values,
        options: &UpgradeOptions,
    ) -> Result<(), EngineError>;
}
