//! Local filesystem state backend

use serde::Deserialize;
use serde_json::json;
use trellis_common::paths::expand_home;

use super::{Backend, BackendError, BackendKind};

/// State kept in a file on the local filesystem
///
/// Without a `path`, Terraform uses `terraform.tfstate` in its working
/// directory, which lives inside the cluster asset directory.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalBackend {
    /// State file location (`~` is expanded)
    #[serde(default)]
    pub path: Option<String>,
}

impl LocalBackend {
    /// Local backend with an explicit state path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn validate(&self) -> Result<(), BackendError> {
        match &self.path {
            Some(path) if path.trim().is_empty() => Err(BackendError::EmptyPath),
            _ => Ok(()),
        }
    }

    fn render(&self) -> Result<String, BackendError> {
        let mut local = serde_json::Map::new();
        if let Some(path) = &self.path {
            let expanded = expand_home(path).map_err(|source| BackendError::Path {
                path: path.clone(),
                source,
            })?;
            local.insert(
                "path".to_string(),
                json!(expanded.to_string_lossy()),
            );
        }

        let block = json!({
            "terraform": {
                "backend": {
                    "local": local,
                },
            },
        });
        Ok(serde_json::to_string_pretty(&block)?)
    }
}
