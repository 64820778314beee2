//! Target platforms
//!
//! A platform names the cluster asset directory, the Terraform modules it
//! needs from the assets bundle (entry module first) and writes the root
//! module that instantiates them once the working directory exists.

mod aws;
mod baremetal;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::{json, Map, Value};
use thiserror::Error;
use trellis_common::config::decode_settings;
use trellis_common::paths::PathError;
use trellis_common::{ClusterConfig, Error, Result, KUBECONFIG_OUTPUT, VALUES_OUTPUT_SUFFIX};

use crate::terraform::{Executor, CLUSTER_FILE};

pub use aws::{AwsPlatform, AwsSettings};
pub use baremetal::{BareMetalPlatform, BareMetalSettings};

/// Static description of a platform
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformMeta {
    /// Platform name
    pub name: String,
    /// Cluster asset directory as configured (may start with `~`)
    pub asset_dir: String,
    /// Terraform modules to copy from the assets bundle, entry module first
    pub modules: Vec<String>,
}

/// Errors from platform initialization
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The root module could not be serialized
    #[error("rendering {file}: {source}")]
    Render {
        /// File being rendered
        file: String,
        /// Underlying cause
        source: serde_json::Error,
    },

    /// The root module could not be written
    #[error("writing {}: {source}", .path.display())]
    Write {
        /// File being written
        path: PathBuf,
        /// Underlying cause
        source: io::Error,
    },

    /// A configured path could not be expanded
    #[error("expanding {path}: {source}")]
    Path {
        /// The path as configured
        path: String,
        /// Underlying cause
        #[source]
        source: PathError,
    },
}

/// A target platform
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    /// Name, asset directory and module set
    fn meta(&self) -> PlatformMeta;

    /// Prepare the executor's working directory before `terraform init`
    async fn initialize(
        &self,
        executor: &(dyn Executor + 'static),
    ) -> std::result::Result<(), PlatformError>;
}

/// Build the platform declared in the configuration
pub fn platform_from_config(config: &ClusterConfig) -> Result<Box<dyn Platform>> {
    let components = config.component_names();
    let settings = &config.cluster.settings;

    match config.cluster.platform.as_str() {
        aws::NAME => {
            let settings: AwsSettings = decode_settings("aws platform", settings)?;
            Ok(Box::new(AwsPlatform::new(settings, components)?))
        }
        baremetal::NAME => {
            let settings: BareMetalSettings = decode_settings("bare-metal platform", settings)?;
            Ok(Box::new(BareMetalPlatform::new(settings, components)?))
        }
        other => Err(Error::config(format!(
            "unknown platform '{}' (supported: {}, {})",
            other,
            aws::NAME,
            baremetal::NAME
        ))),
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::config(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Asset directory owning a Terraform working directory
pub(crate) fn asset_dir_of(working_dir: &Path) -> PathBuf {
    working_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| working_dir.to_path_buf())
}

/// Root module instantiating `entry` with `variables`
///
/// Exposes a sensitive `<component>_values` output per control-plane
/// component and the admin kubeconfig.
pub(crate) fn cluster_module(
    entry: &str,
    mut variables: Map<String, Value>,
    components: &[String],
) -> Value {
    variables.insert(
        "source".to_string(),
        json!(format!("../terraform-modules/{}", entry)),
    );

    let mut outputs = Map::new();
    for component in components {
        let name = format!("{}{}", component, VALUES_OUTPUT_SUFFIX);
        outputs.insert(
            name.clone(),
            json!({
                "value": format!("${{module.{}.{}}}", entry, name),
                "sensitive": true,
            }),
        );
    }
    outputs.insert(
        KUBECONFIG_OUTPUT.to_string(),
        json!({
            "value": format!("${{module.{}.{}}}", entry, KUBECONFIG_OUTPUT),
            "sensitive": true,
        }),
    );

    let mut modules = Map::new();
    modules.insert(entry.to_string(), Value::Object(variables));

    json!({
        "module": modules,
        "output": outputs,
    })
}

/// Write the root module into the working directory
pub(crate) fn write_cluster_file(
    working_dir: &Path,
    content: &Value,
) -> std::result::Result<(), PlatformError> {
    let rendered =
        serde_json::to_string_pretty(content).map_err(|source| PlatformError::Render {
            file: CLUSTER_FILE.to_string(),
            source,
        })?;
    let path = working_dir.join(CLUSTER_FILE);
    std::fs::write(&path, rendered).map_err(|source| PlatformError::Write { path, source })
}
