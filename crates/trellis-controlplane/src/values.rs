//! Component values read from infrastructure outputs
//!
//! Terraform renders each component's Helm values as a YAML string in the
//! output `<component>_values`.

use serde_json::Value;
use thiserror::Error;
use trellis_common::yaml::{parse_yaml_mapping, YamlError};
use trellis_common::{Error, Result, VALUES_OUTPUT_SUFFIX};
use trellis_infra::Executor;

/// Helm values: string keys to nested scalars, mappings and sequences
pub type Values = serde_json::Map<String, Value>;

/// The values output exists but does not hold YAML text
#[derive(Debug, Error)]
#[error("output {output} is not a string")]
pub struct NotAString {
    /// Output name
    pub output: String,
}

/// Output holding the values for `component`
pub fn values_output_name(component: &str) -> String {
    format!("{}{}", component, VALUES_OUTPUT_SUFFIX)
}

/// Parse values YAML
///
/// An empty document is an empty map. Anything other than a mapping at the
/// top level is rejected rather than coerced.
pub fn parse_values(raw: &str) -> std::result::Result<Values, YamlError> {
    parse_yaml_mapping(raw)
}

/// Read and parse the values for `component` from executor outputs
pub async fn read_values(executor: &dyn Executor, component: &str) -> Result<Values> {
    let output = values_output_name(component);

    let raw = executor
        .output(&output)
        .await
        .map_err(|e| Error::ValuesFetch {
            component: component.to_string(),
            source: Box::new(e),
        })?;

    let Value::String(raw) = raw else {
        return Err(Error::ValuesFetch {
            component: component.to_string(),
            source: Box::new(NotAString { output }),
        });
    };

    parse_values(&raw).map_err(|e| Error::ValuesParse {
        component: component.to_string(),
        source: Box::new(e),
    })
}
