//! Control-plane charts shipped in the assets bundle

use std::io;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use trellis_common::paths::controlplane_charts_dir;

/// Chart metadata file inside a chart directory
pub const CHART_FILE: &str = "Chart.yaml";

/// Errors loading or validating a chart
#[derive(Debug, Error)]
pub enum ChartError {
    /// No chart directory for the component
    #[error("chart not found at {}", .0.display())]
    NotFound(PathBuf),

    /// Chart.yaml could not be read
    #[error("reading {}: {source}", .path.display())]
    Read {
        /// File being read
        path: PathBuf,
        /// Underlying cause
        source: io::Error,
    },

    /// Chart.yaml is not valid YAML for chart metadata
    #[error("parsing {}: {source}", .path.display())]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// Underlying cause
        source: serde_yaml::Error,
    },

    /// A required metadata field is empty
    #[error("chart metadata field '{0}' is required")]
    MissingField(&'static str),

    /// apiVersion is neither v1 nor v2
    #[error("chart apiVersion '{0}' is not supported")]
    UnsupportedApiVersion(String),

    /// version is not SemVer
    #[error("chart version '{version}' is not valid SemVer: {source}")]
    InvalidVersion {
        /// Version as written
        version: String,
        /// Underlying cause
        source: semver::Error,
    },

    /// type is not application or library
    #[error("chart type '{0}' is not supported")]
    InvalidType(String),
}

/// Contents of `Chart.yaml`
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart API version (`v1` or `v2`)
    #[serde(default)]
    pub api_version: String,
    /// Chart name
    #[serde(default)]
    pub name: String,
    /// Chart version (SemVer)
    #[serde(default)]
    pub version: String,
    /// Version of the packaged application; unquoted numbers are kept as text
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub app_version: Option<String>,
    /// One-line description
    #[serde(default)]
    pub description: Option<String>,
    /// `application` or `library`
    #[serde(default, rename = "type")]
    pub chart_type: String,
}

fn scalar_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a scalar, found {:?}",
            other
        ))),
    }
}

/// A chart directory and its metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chart {
    /// Chart directory passed to Helm
    pub path: PathBuf,
    /// Parsed `Chart.yaml`
    pub metadata: ChartMetadata,
}

impl Chart {
    /// Load a chart from its directory
    pub fn from_dir(path: &Path) -> Result<Self, ChartError> {
        if !path.is_dir() {
            return Err(ChartError::NotFound(path.to_path_buf()));
        }

        let file = path.join(CHART_FILE);
        let content = std::fs::read_to_string(&file).map_err(|source| ChartError::Read {
            path: file.clone(),
            source,
        })?;
        let metadata = serde_yaml::from_str(&content).map_err(|source| ChartError::Parse {
            path: file.clone(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
        })
    }

    /// Structural checks Helm would otherwise fail on
    pub fn validate(&self) -> Result<(), ChartError> {
        let m = &self.metadata;

        if m.api_version.is_empty() {
            return Err(ChartError::MissingField("apiVersion"));
        }
        if m.api_version != "v1" && m.api_version != "v2" {
            return Err(ChartError::UnsupportedApiVersion(m.api_version.clone()));
        }
        if m.name.trim().is_empty() {
            return Err(ChartError::MissingField("name"));
        }
        if m.version.is_empty() {
            return Err(ChartError::MissingField("version"));
        }
        semver::Version::parse(&m.version).map_err(|source| ChartError::InvalidVersion {
            version: m.version.clone(),
            source,
        })?;
        match m.chart_type.as_str() {
            "" | "application" | "library" => Ok(()),
            other => Err(ChartError::InvalidType(other.to_string())),
        }
    }
}

/// Where component charts are loaded from
#[cfg_attr(test, automock)]
pub trait ChartSource: Send + Sync {
    /// Load the chart for component `name`
    fn load(&self, name: &str) -> Result<Chart, ChartError>;
}

/// Charts laid out as `<root>/<name>/Chart.yaml`
#[derive(Clone, Debug)]
pub struct DirChartSource {
    root: PathBuf,
}

impl DirChartSource {
    /// Charts under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Control-plane charts inside an assets bundle
    pub fn from_assets(assets: &Path) -> Self {
        Self::new(controlplane_charts_dir(assets))
    }

    /// Directory charts are loaded from
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ChartSource for DirChartSource {
    fn load(&self, name: &str) -> Result<Chart, ChartError> {
        Chart::from_dir(&self.root.join(name))
    }
}
