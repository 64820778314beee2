//! Common types for Trellis: errors, configuration, diagnostics, and utilities

#![deny(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod paths;
pub mod telemetry;
pub mod yaml;

pub use config::{BackendBlock, ClusterConfig, ComponentRef, ControlplaneConfig, PlatformBlock};
pub use context::DiagnosticContext;
pub use error::{BoxError, Error, ErrorKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Cluster configuration file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "trellis.yaml";

/// Namespace control-plane components are deployed into unless configured otherwise
pub const DEFAULT_CONTROLPLANE_NAMESPACE: &str = "kube-system";

/// Control-plane components upgraded on every `cluster apply`, in order
pub const DEFAULT_CONTROLPLANE_COMPONENTS: &[&str] = &[
    "bootstrap-secrets",
    "pod-checkpointer",
    "kube-apiserver",
    "kubernetes",
    "kubelet",
    "calico",
];

/// Suffix of the infrastructure output holding a component's values
pub const VALUES_OUTPUT_SUFFIX: &str = "_values";

/// Infrastructure output holding the admin kubeconfig
pub const KUBECONFIG_OUTPUT: &str = "kubeconfig";
