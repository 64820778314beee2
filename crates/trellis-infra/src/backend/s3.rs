//! S3 state backend

use serde::Deserialize;
use serde_json::{json, Map, Value};
use trellis_common::paths::expand_home;

use super::{Backend, BackendError, BackendKind};

/// Environment variable consulted when no region is configured
pub const AWS_DEFAULT_REGION_ENV: &str = "AWS_DEFAULT_REGION";

/// S3 backend settings as written in the cluster configuration
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct S3Settings {
    /// Bucket holding the state object
    #[serde(default)]
    pub bucket: String,
    /// Object key of the state file
    #[serde(default)]
    pub key: String,
    /// Bucket region
    #[serde(default)]
    pub region: Option<String>,
    /// Shared AWS credentials file
    #[serde(default)]
    pub aws_creds_path: Option<String>,
    /// DynamoDB table used for state locking
    #[serde(default)]
    pub dynamodb_table: Option<String>,
}

/// State kept in an S3 bucket
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct S3Backend {
    settings: S3Settings,
    env_region: Option<String>,
}

impl S3Backend {
    /// Create the backend, capturing `AWS_DEFAULT_REGION` as the region fallback
    pub fn from_settings(settings: S3Settings) -> Self {
        let env_region = std::env::var(AWS_DEFAULT_REGION_ENV)
            .ok()
            .filter(|r| !r.is_empty());
        Self::with_env_region(settings, env_region)
    }

    /// Create the backend with an explicit region fallback
    pub fn with_env_region(settings: S3Settings, env_region: Option<String>) -> Self {
        Self {
            settings,
            env_region,
        }
    }

    /// Configured settings
    pub fn settings(&self) -> &S3Settings {
        &self.settings
    }

    /// Region Terraform will use: configured first, then the environment
    pub fn effective_region(&self) -> Option<&str> {
        self.settings
            .region
            .as_deref()
            .filter(|r| !r.is_empty())
            .or(self.env_region.as_deref())
    }
}

impl Backend for S3Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    fn validate(&self) -> Result<(), BackendError> {
        if self.settings.bucket.trim().is_empty() {
            return Err(BackendError::MissingField("bucket"));
        }
        if self.settings.key.trim().is_empty() {
            return Err(BackendError::MissingField("key"));
        }
        if self.effective_region().is_none() {
            return Err(BackendError::MissingRegion);
        }
        Ok(())
    }

    fn render(&self) -> Result<String, BackendError> {
        let mut s3 = Map::new();
        s3.insert("bucket".to_string(), json!(self.settings.bucket));
        s3.insert("key".to_string(), json!(self.settings.key));
        if let Some(region) = self.effective_region() {
            s3.insert("region".to_string(), json!(region));
        }
        if let Some(path) = &self.settings.aws_creds_path {
            let expanded = expand_home(path).map_err(|source| BackendError::Path {
                path: path.clone(),
                source,
            })?;
            s3.insert(
                "shared_credentials_file".to_string(),
                json!(expanded.to_string_lossy()),
            );
        }
        if let Some(table) = &self.settings.dynamodb_table {
            s3.insert("dynamodb_table".to_string(), json!(table));
        }

        let block = json!({
            "terraform": {
                "backend": {
                    "s3": Value::Object(s3),
                },
            },
        });
        Ok(serde_json::to_string_pretty(&block)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> S3Settings {
        S3Settings {
            bucket: "trellis-state".to_string(),
            key: "demo/terraform.tfstate".to_string(),
            ..Default::default()
        }
    }

    fn rendered(backend: &S3Backend) -> Value {
        serde_json::from_str(&backend.render().unwrap()).unwrap()
    }

    // ==========================================================================
    // Story: validation names the missing setting
    // ==========================================================================

    #[test]
    fn bucket_is_required() {
        let backend = S3Backend::with_env_region(
            S3Settings {
                bucket: String::new(),
                ..settings()
            },
            Some("eu-west-1".to_string()),
        );
        let err = backend.validate().unwrap_err();
        assert_eq!(err.to_string(), "bucket is required");
    }

    #[test]
    fn key_is_required() {
        let backend = S3Backend::with_env_region(
            S3Settings {
                key: String::new(),
                ..settings()
            },
            Some("eu-west-1".to_string()),
        );
        assert!(matches!(
            backend.validate(),
            Err(BackendError::MissingField("key"))
        ));
    }

    #[test]
    fn region_must_come_from_settings_or_environment() {
        let backend = S3Backend::with_env_region(settings(), None);
        assert!(matches!(backend.validate(), Err(BackendError::MissingRegion)));

        let backend = S3Backend::with_env_region(settings(), Some("us-east-2".to_string()));
        assert!(backend.validate().is_ok());
    }

    // ==========================================================================
    // Story: rendering produces a Terraform s3 backend block
    // ==========================================================================

    #[test]
    fn configured_region_wins_over_environment() {
        let backend = S3Backend::with_env_region(
            S3Settings {
                region: Some("eu-central-1".to_string()),
                ..settings()
            },
            Some("us-east-2".to_string()),
        );
        assert_eq!(
            rendered(&backend)["terraform"]["backend"]["s3"]["region"],
            "eu-central-1"
        );
    }

    #[test]
    fn environment_region_is_rendered_when_unset() {
        let backend = S3Backend::with_env_region(settings(), Some("us-east-2".to_string()));
        let value = rendered(&backend);
        let s3 = &value["terraform"]["backend"]["s3"];
        assert_eq!(s3["bucket"], "trellis-state");
        assert_eq!(s3["key"], "demo/terraform.tfstate");
        assert_eq!(s3["region"], "us-east-2");
        assert!(s3.get("dynamodb_table").is_none());
        assert!(s3.get("shared_credentials_file").is_none());
    }

    #[test]
    fn optional_settings_are_rendered() {
        let backend = S3Backend::with_env_region(
            S3Settings {
                aws_creds_path: Some("/etc/trellis/aws-credentials".to_string()),
                dynamodb_table: Some("trellis-locks".to_string()),
                ..settings()
            },
            Some("us-east-2".to_string()),
        );
        let value = rendered(&backend);
        let s3 = &value["terraform"]["backend"]["s3"];
        assert_eq!(s3["shared_credentials_file"], "/etc/trellis/aws-credentials");
        assert_eq!(s3["dynamodb_table"], "trellis-locks");
    }

    #[test]
    fn settings_decode_from_camel_case() {
        let decoded: S3Settings = serde_yaml::from_str(
            "bucket: b\nkey: k\nawsCredsPath: ~/.aws/credentials\ndynamodbTable: locks\n",
        )
        .unwrap();
        assert_eq!(decoded.aws_creds_path.as_deref(), Some("~/.aws/credentials"));
        assert_eq!(decoded.dynamodb_table.as_deref(), Some("locks"));
    }
}
