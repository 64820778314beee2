//! AWS platform

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;
use trellis_common::{Error, Result};

use super::{
    asset_dir_of, cluster_module, require, write_cluster_file, Platform, PlatformError,
    PlatformMeta,
};
use crate::terraform::Executor;

pub(super) const NAME: &str = "aws";

/// Modules copied for an AWS cluster, entry module first
const MODULES: &[&str] = &["aws", "bootkube"];

fn default_controller_count() -> u32 {
    1
}

fn default_controller_type() -> String {
    "t3.small".to_string()
}

fn default_worker_count() -> u32 {
    2
}

fn default_worker_type() -> String {
    "t3.small".to_string()
}

fn default_os_channel() -> String {
    "stable".to_string()
}

/// AWS cluster settings
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AwsSettings {
    /// Cluster asset directory
    pub asset_dir: String,
    /// Cluster name, used for resource naming and DNS
    pub cluster_name: String,
    /// Region for the AWS provider; the provider's own defaults apply when unset
    #[serde(default)]
    pub region: Option<String>,
    /// Route53 DNS zone
    pub dns_zone: String,
    /// Route53 zone ID
    pub dns_zone_id: String,
    /// SSH public keys authorized on every node
    #[serde(default)]
    pub ssh_pubkeys: Vec<String>,
    /// Number of controllers
    #[serde(default = "default_controller_count")]
    pub controller_count: u32,
    /// Controller instance type
    #[serde(default = "default_controller_type")]
    pub controller_type: String,
    /// Number of workers
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,
    /// Worker instance type
    #[serde(default = "default_worker_type")]
    pub worker_type: String,
    /// Flatcar release channel
    #[serde(default = "default_os_channel")]
    pub os_channel: String,
    /// Tags applied to every resource
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Cluster on AWS
#[derive(Clone, Debug)]
pub struct AwsPlatform {
    settings: AwsSettings,
    components: Vec<String>,
}

impl AwsPlatform {
    /// Validate settings and create the platform
    pub fn new(settings: AwsSettings, components: Vec<String>) -> Result<Self> {
        require("assetDir", &settings.asset_dir)?;
        require("clusterName", &settings.cluster_name)?;
        require("dnsZone", &settings.dns_zone)?;
        require("dnsZoneId", &settings.dns_zone_id)?;
        if settings.ssh_pubkeys.is_empty() {
            return Err(Error::config("at least one SSH public key is required"));
        }
        if settings.controller_count == 0 {
            return Err(Error::config("controllerCount must be at least 1"));
        }
        Ok(Self {
            settings,
            components,
        })
    }

    fn variables(&self, asset_dir: &str) -> Map<String, Value> {
        let s = &self.settings;
        let mut vars = Map::new();
        vars.insert("asset_dir".to_string(), json!(asset_dir));
        vars.insert("cluster_name".to_string(), json!(s.cluster_name));
        vars.insert("dns_zone".to_string(), json!(s.dns_zone));
        vars.insert("dns_zone_id".to_string(), json!(s.dns_zone_id));
        vars.insert("ssh_keys".to_string(), json!(s.ssh_pubkeys));
        vars.insert("controller_count".to_string(), json!(s.controller_count));
        vars.insert("controller_type".to_string(), json!(s.controller_type));
        vars.insert("worker_count".to_string(), json!(s.worker_count));
        vars.insert("worker_type".to_string(), json!(s.worker_type));
        vars.insert("os_channel".to_string(), json!(s.os_channel));
        vars.insert("tags".to_string(), json!(s.tags));
        vars
    }
}

#[async_trait]
impl Platform for AwsPlatform {
    fn meta(&self) -> PlatformMeta {
        PlatformMeta {
            name: NAME.to_string(),
            asset_dir: self.settings.asset_dir.clone(),
            modules: MODULES.iter().map(|m| m.to_string()).collect(),
        }
    }

    async fn initialize(
        &self,
        executor: &(dyn Executor + 'static),
    ) -> std::result::Result<(), PlatformError> {
        let working_dir = executor.working_dir();
        let asset_dir = asset_dir_of(&working_dir);

        let mut root = cluster_module(
            MODULES[0],
            self.variables(&asset_dir.to_string_lossy()),
            &self.components,
        );
        if let (Some(region), Value::Object(root)) = (&self.settings.region, &mut root) {
            root.insert("provider".to_string(), json!({ "aws": { "region": region } }));
        }

        write_cluster_file(&working_dir, &root)?;
        info!(cluster = %self.settings.cluster_name, "wrote aws cluster configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::{MockExecutor, CLUSTER_FILE};

    fn settings() -> AwsSettings {
        serde_yaml::from_str(
            r#"
assetDir: ~/.trellis/demo
clusterName: demo
dnsZone: example.com
dnsZoneId: Z123
sshPubkeys:
  - ssh-ed25519 AAAA ops@example.com
"#,
        )
        .unwrap()
    }

    fn executor_in(dir: &std::path::Path) -> MockExecutor {
        let mut executor = MockExecutor::new();
        let dir = dir.to_path_buf();
        executor.expect_working_dir().returning(move || dir.clone());
        executor
    }

    #[test]
    fn defaults_are_applied() {
        let s = settings();
        assert_eq!(s.controller_count, 1);
        assert_eq!(s.worker_count, 2);
        assert_eq!(s.os_channel, "stable");
        assert!(s.region.is_none());
    }

    #[test]
    fn meta_lists_entry_module_first() {
        let platform = AwsPlatform::new(settings(), vec![]).unwrap();
        let meta = platform.meta();
        assert_eq!(meta.name, "aws");
        assert_eq!(meta.asset_dir, "~/.trellis/demo");
        assert_eq!(meta.modules, vec!["aws", "bootkube"]);
    }

    #[test]
    fn missing_ssh_keys_are_rejected() {
        let err = AwsPlatform::new(
            AwsSettings {
                ssh_pubkeys: vec![],
                ..settings()
            },
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("SSH public key"));
    }

    #[test]
    fn zero_controllers_are_rejected() {
        let err = AwsPlatform::new(
            AwsSettings {
                controller_count: 0,
                ..settings()
            },
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("controllerCount"));
    }

    #[tokio::test]
    async fn initialize_writes_cluster_file() {
        let asset_dir = tempfile::tempdir().unwrap();
        let working_dir = asset_dir.path().join("terraform");
        std::fs::create_dir_all(&working_dir).unwrap();

        let platform = AwsPlatform::new(
            AwsSettings {
                region: Some("eu-west-1".to_string()),
                ..settings()
            },
            vec!["calico".to_string()],
        )
        .unwrap();
        platform
            .initialize(&executor_in(&working_dir))
            .await
            .unwrap();

        let written: Value = serde_json::from_str(
            &std::fs::read_to_string(working_dir.join(CLUSTER_FILE)).unwrap(),
        )
        .unwrap();
        let module = &written["module"]["aws"];
        assert_eq!(module["source"], "../terraform-modules/aws");
        assert_eq!(module["cluster_name"], "demo");
        let expected_asset_dir = asset_dir.path().to_string_lossy().to_string();
        assert_eq!(module["asset_dir"], expected_asset_dir);
        assert_eq!(module["ssh_keys"][0], "ssh-ed25519 AAAA ops@example.com");
        assert_eq!(written["provider"]["aws"]["region"], "eu-west-1");
        assert!(written["output"]["calico_values"].is_object());
        assert!(written["output"]["kubeconfig"].is_object());
    }

    #[tokio::test]
    async fn initialize_fails_when_working_dir_is_missing() {
        let asset_dir = tempfile::tempdir().unwrap();
        let platform = AwsPlatform::new(settings(), vec![]).unwrap();

        let err = platform
            .initialize(&executor_in(&asset_dir.path().join("absent")))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Write { .. }));
    }
}
