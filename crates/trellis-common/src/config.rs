//! Cluster configuration file
//!
//! A cluster is described by a YAML document:
//!
//! ```yaml
//! cluster:
//!   platform: aws
//!   settings:
//!     assetDir: ~/.trellis/demo
//!     clusterName: demo
//!     # ... platform-specific settings
//! backend:            # optional, defaults to local state
//!   kind: s3
//!   settings:
//!     bucket: my-state
//!     key: demo/terraform.tfstate
//! controlplane:       # optional, defaults to the standard component set
//!   components:
//!     - name: kube-apiserver
//!     - name: calico
//!       namespace: kube-system
//! ```
//!
//! Platform and backend `settings` are kept as raw YAML here and decoded by
//! the platform or backend that owns them, so a malformed block surfaces as a
//! configuration error at the point it is resolved.

use std::collections::HashSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::{Error, Result, DEFAULT_CONTROLPLANE_COMPONENTS, DEFAULT_CONTROLPLANE_NAMESPACE};

/// Top-level cluster configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterConfig {
    /// Platform the cluster runs on
    pub cluster: PlatformBlock,
    /// Where infrastructure state is stored (local when absent)
    #[serde(default)]
    pub backend: Option<BackendBlock>,
    /// Control-plane components to converge
    #[serde(default)]
    pub controlplane: ControlplaneConfig,
}

/// Platform selection and its undecoded settings
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlatformBlock {
    /// Platform name (e.g. "aws", "bare-metal")
    pub platform: String,
    /// Platform-specific settings
    #[serde(default)]
    pub settings: serde_yaml::Value,
}

/// Backend selection and its undecoded settings
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackendBlock {
    /// Backend kind (e.g. "local", "s3")
    pub kind: String,
    /// Backend-specific settings
    #[serde(default)]
    pub settings: serde_yaml::Value,
}

/// Control-plane components managed after infrastructure apply
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ControlplaneConfig {
    /// Components in upgrade order
    #[serde(default = "default_components")]
    pub components: Vec<ComponentRef>,
}

impl Default for ControlplaneConfig {
    fn default() -> Self {
        Self {
            components: default_components(),
        }
    }
}

/// A named control-plane component and the namespace it is released into
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComponentRef {
    /// Component (and release) name
    pub name: String,
    /// Target namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl ComponentRef {
    /// Create a component reference in the default namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_CONTROLPLANE_NAMESPACE.to_string()
}

fn default_components() -> Vec<ComponentRef> {
    DEFAULT_CONTROLPLANE_COMPONENTS
        .iter()
        .map(|name| ComponentRef::new(*name))
        .collect()
}

impl ClusterConfig {
    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ClusterConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse cluster configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Names of the configured control-plane components, in order
    pub fn component_names(&self) -> Vec<String> {
        self.controlplane
            .components
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.cluster.platform.trim().is_empty() {
            return Err(Error::config("cluster.platform must not be empty"));
        }

        let mut seen = HashSet::new();
        for component in &self.controlplane.components {
            if component.name.trim().is_empty() {
                return Err(Error::config("control-plane component name must not be empty"));
            }
            if component.namespace.trim().is_empty() {
                return Err(Error::config(format!(
                    "control-plane component '{}' has an empty namespace",
                    component.name
                )));
            }
            if !seen.insert(component.name.as_str()) {
                return Err(Error::config(format!(
                    "control-plane component '{}' is listed more than once",
                    component.name
                )));
            }
        }

        Ok(())
    }
}

/// Read and parse the cluster configuration file at `path`
pub fn load_config(path: &Path) -> Result<ClusterConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
    ClusterConfig::from_yaml(&content)
}

/// Decode a raw settings block into its typed form
///
/// A missing block decodes as an empty mapping so settings types with all
/// fields defaulted work without any YAML.
pub fn decode_settings<T: DeserializeOwned>(what: &str, settings: &serde_yaml::Value) -> Result<T> {
    let settings = match settings {
        serde_yaml::Value::Null => serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
        other => other.clone(),
    };
    serde_yaml::from_value(settings)
        .map_err(|e| Error::config(format!("invalid {} settings: {}", what, e)))
}
