//! Terraform state backends
//!
//! A cluster stores its Terraform state in exactly one backend. The
//! configuration may declare one; when it does not, callers fall back to a
//! [`LocalBackend`] through [`resolve_backend`].

mod local;
mod s3;

use std::fmt;

#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use trellis_common::config::decode_settings;
use trellis_common::paths::PathError;
use trellis_common::{ClusterConfig, Error, Result};

pub use local::LocalBackend;
pub use s3::{S3Backend, S3Settings, AWS_DEFAULT_REGION_ENV};

/// Supported backend kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// State file on the local filesystem
    Local,
    /// State object in an S3 bucket
    S3,
}

impl BackendKind {
    /// Name as written in configuration and in Terraform
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
        }
    }

    /// Look up a kind by its configuration name
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "local" => Some(Self::Local),
            "s3" => Some(Self::S3),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from backend validation and rendering
#[derive(Debug, Error)]
pub enum BackendError {
    /// A required setting is missing or empty
    #[error("{0} is required")]
    MissingField(&'static str),

    /// No region configured and none in the environment
    #[error("no region specified and AWS_DEFAULT_REGION is not set")]
    MissingRegion,

    /// An explicitly configured path is empty
    #[error("path must not be empty when set")]
    EmptyPath,

    /// A configured path could not be expanded
    #[error("expanding {path}: {source}")]
    Path {
        /// The path as configured
        path: String,
        /// Underlying cause
        #[source]
        source: PathError,
    },

    /// The backend block could not be serialized
    #[error("serializing backend block: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A Terraform state backend
#[cfg_attr(test, automock)]
pub trait Backend: Send + Sync {
    /// Which kind of backend this is
    fn kind(&self) -> BackendKind;

    /// Check settings before anything touches the filesystem
    fn validate(&self) -> std::result::Result<(), BackendError>;

    /// Render the backend as Terraform JSON configuration
    fn render(&self) -> std::result::Result<String, BackendError>;
}

/// Backend declared in the configuration, if any
///
/// An unknown kind or undecodable settings is a configuration error.
pub fn configured_backend(config: &ClusterConfig) -> Result<Option<Box<dyn Backend>>> {
    let Some(block) = &config.backend else {
        return Ok(None);
    };

    let kind = BackendKind::parse(&block.kind).ok_or_else(|| {
        Error::config(format!(
            "unknown backend kind '{}' (supported: local, s3)",
            block.kind
        ))
    })?;

    let backend: Box<dyn Backend> = match kind {
        BackendKind::Local => Box::new(decode_settings::<LocalBackend>(
            "local backend",
            &block.settings,
        )?),
        BackendKind::S3 => {
            let settings: S3Settings = decode_settings("s3 backend", &block.settings)?;
            Box::new(S3Backend::from_settings(settings))
        }
    };

    Ok(Some(backend))
}

/// Configured backend, or a local one when none is declared
pub fn resolve_backend(config: &ClusterConfig) -> Result<Box<dyn Backend>> {
    Ok(configured_backend(config)?.unwrap_or_else(|| {
        tracing::debug!("no backend configured, using local state");
        Box::new(LocalBackend::default())
    }))
}
