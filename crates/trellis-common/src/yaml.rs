//! YAML documents as `serde_json` values
//!
//! Component values arrive from infrastructure outputs as YAML text and reach
//! the deployment engine as JSON maps. Values JSON cannot carry faithfully,
//! such as complex keys or non-finite numbers, are errors rather than
//! best-effort conversions.

use serde_json::{Map, Number, Value};
use thiserror::Error;
use yaml_rust2::{Yaml, YamlLoader};

/// Errors parsing YAML into JSON values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YamlError {
    /// The text is not well-formed YAML
    #[error("invalid YAML: {0}")]
    Syntax(String),

    /// A mapping key is a sequence, mapping or alias
    #[error("unsupported mapping key: {0}")]
    UnsupportedKey(String),

    /// Two keys of one mapping share a textual form, such as `1` and `"1"`
    #[error("duplicate mapping key '{0}'")]
    DuplicateKey(String),

    /// An alias the loader left unresolved
    #[error("unresolved YAML alias")]
    Alias,

    /// A float that has no JSON representation (`.inf`, `.nan`, overflow)
    #[error("number '{0}' cannot be represented")]
    InvalidNumber(String),

    /// A scalar the parser could not type
    #[error("bad YAML value")]
    BadValue,

    /// The document is not a mapping
    #[error("expected a mapping at the top level, found {0}")]
    NotAMapping(&'static str),
}

/// Parse the first document of `input`
///
/// Empty input is `Value::Null`.
pub fn parse_yaml(input: &str) -> Result<Value, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError::Syntax(e.to_string()))?;
    docs.into_iter()
        .next()
        .map_or(Ok(Value::Null), convert)
}

/// Parse a document that must be a mapping
///
/// Empty input and an explicit `null` document both yield an empty map.
pub fn parse_yaml_mapping(input: &str) -> Result<Map<String, Value>, YamlError> {
    match parse_yaml(input)? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        Value::Bool(_) => Err(YamlError::NotAMapping("a boolean")),
        Value::Number(_) => Err(YamlError::NotAMapping("a number")),
        Value::String(_) => Err(YamlError::NotAMapping("a string")),
        Value::Array(_) => Err(YamlError::NotAMapping("a sequence")),
    }
}

fn convert(node: Yaml) -> Result<Value, YamlError> {
    Ok(match node {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::from(i),
        Yaml::Real(repr) => repr
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or(YamlError::InvalidNumber(repr))?,
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(convert)
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Hash(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let key = key_string(key)?;
                if map.contains_key(&key) {
                    return Err(YamlError::DuplicateKey(key));
                }
                map.insert(key, convert(value)?);
            }
            Value::Object(map)
        }
        Yaml::Alias(_) => return Err(YamlError::Alias),
        Yaml::BadValue => return Err(YamlError::BadValue),
    })
}

/// Scalar keys become their textual form
fn key_string(key: Yaml) -> Result<String, YamlError> {
    match key {
        Yaml::String(s) | Yaml::Real(s) => Ok(s),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Boolean(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        other => Err(YamlError::UnsupportedKey(format!("{:?}", other))),
    }
}
