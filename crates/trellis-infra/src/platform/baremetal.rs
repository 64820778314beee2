//! Bare-metal platform provisioned through matchbox

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;
use trellis_common::paths::expand_home;
use trellis_common::{Error, Result};

use super::{
    asset_dir_of, cluster_module, require, write_cluster_file, Platform, PlatformError,
    PlatformMeta,
};
use crate::terraform::Executor;

pub(super) const NAME: &str = "bare-metal";

const MODULES: &[&str] = &["bare-metal", "bootkube"];

fn default_os_channel() -> String {
    "stable".to_string()
}

fn default_os_version() -> String {
    "current".to_string()
}

/// Bare-metal cluster settings
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BareMetalSettings {
    /// Cluster asset directory
    pub asset_dir: String,
    /// Cluster name
    pub cluster_name: String,
    /// Matchbox gRPC API endpoint (`host:port`)
    pub matchbox_endpoint: String,
    /// Matchbox HTTP endpoint serving iPXE scripts
    pub matchbox_http_endpoint: String,
    /// CA certificate for the matchbox API
    pub matchbox_ca_path: String,
    /// Client certificate for the matchbox API
    pub matchbox_client_cert_path: String,
    /// Client key for the matchbox API
    pub matchbox_client_key_path: String,
    /// DNS name of the Kubernetes API
    pub k8s_domain_name: String,
    /// SSH public keys authorized on every node
    #[serde(default)]
    pub ssh_pubkeys: Vec<String>,
    /// Controller FQDNs
    pub controller_domains: Vec<String>,
    /// Controller MAC addresses
    pub controller_macs: Vec<String>,
    /// Controller machine names
    pub controller_names: Vec<String>,
    /// Worker FQDNs
    #[serde(default)]
    pub worker_domains: Vec<String>,
    /// Worker MAC addresses
    #[serde(default)]
    pub worker_macs: Vec<String>,
    /// Worker machine names
    #[serde(default)]
    pub worker_names: Vec<String>,
    /// Flatcar release channel
    #[serde(default = "default_os_channel")]
    pub os_channel: String,
    /// Flatcar version
    #[serde(default = "default_os_version")]
    pub os_version: String,
}

/// Cluster on bare-metal machines
#[derive(Clone, Debug)]
pub struct BareMetalPlatform {
    settings: BareMetalSettings,
    components: Vec<String>,
}

fn same_length(role: &str, domains: &[String], macs: &[String], names: &[String]) -> Result<()> {
    if domains.len() != macs.len() || domains.len() != names.len() {
        return Err(Error::config(format!(
            "{} domains, MACs and names must have the same length (got {}, {}, {})",
            role,
            domains.len(),
            macs.len(),
            names.len()
        )));
    }
    Ok(())
}

fn expand(path: &str) -> std::result::Result<String, PlatformError> {
    expand_home(path)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|source| PlatformError::Path {
            path: path.to_string(),
            source,
        })
}

impl BareMetalPlatform {
    /// Validate settings and create the platform
    pub fn new(settings: BareMetalSettings, components: Vec<String>) -> Result<Self> {
        require("assetDir", &settings.asset_dir)?;
        require("clusterName", &settings.cluster_name)?;
        require("matchboxEndpoint", &settings.matchbox_endpoint)?;
        require("matchboxHttpEndpoint", &settings.matchbox_http_endpoint)?;
        require("k8sDomainName", &settings.k8s_domain_name)?;
        if settings.controller_domains.is_empty() {
            return Err(Error::config("at least one controller is required"));
        }
        same_length(
            "controller",
            &settings.controller_domains,
            &settings.controller_macs,
            &settings.controller_names,
        )?;
        same_length(
            "worker",
            &settings.worker_domains,
            &settings.worker_macs,
            &settings.worker_names,
        )?;
        Ok(Self {
            settings,
            components,
        })
    }

    fn variables(&self, asset_dir: &str) -> std::result::Result<Map<String, Value>, PlatformError> {
        let s = &self.settings;
        let mut vars = Map::new();
        vars.insert("asset_dir".to_string(), json!(asset_dir));
        vars.insert("cluster_name".to_string(), json!(s.cluster_name));
        vars.insert("matchbox_endpoint".to_string(), json!(s.matchbox_endpoint));
        vars.insert(
            "matchbox_http_endpoint".to_string(),
            json!(s.matchbox_http_endpoint),
        );
        vars.insert(
            "matchbox_ca_path".to_string(),
            json!(expand(&s.matchbox_ca_path)?),
        );
        vars.insert(
            "matchbox_client_cert_path".to_string(),
            json!(expand(&s.matchbox_client_cert_path)?),
        );
        vars.insert(
            "matchbox_client_key_path".to_string(),
            json!(expand(&s.matchbox_client_key_path)?),
        );
        vars.insert("k8s_domain_name".to_string(), json!(s.k8s_domain_name));
        vars.insert("ssh_keys".to_string(), json!(s.ssh_pubkeys));
        vars.insert("controller_domains".to_string(), json!(s.controller_domains));
        vars.insert("controller_macs".to_string(), json!(s.controller_macs));
        vars.insert("controller_names".to_string(), json!(s.controller_names));
        vars.insert("worker_domains".to_string(), json!(s.worker_domains));
        vars.insert("worker_macs".to_string(), json!(s.worker_macs));
        vars.insert("worker_names".to_string(), json!(s.worker_names));
        vars.insert("os_channel".to_string(), json!(s.os_channel));
        vars.insert("os_version".to_string(), json!(s.os_version));
        Ok(vars)
    }
}

#[async_trait]
impl Platform for BareMetalPlatform {
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

        let variables = self.variables(&asset_dir.to_string_lossy())?;
        let root = cluster_module(MODULES[0], variables, &self.components);

        write_cluster_file(&working_dir, &root)?;
        info!(
            cluster = %self.settings.cluster_name,
            controllers = self.settings.controller_names.len(),
            workers = self.settings.worker_names.len(),
            "wrote bare-metal cluster configuration"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::{MockExecutor, CLUSTER_FILE};

    const SETTINGS: &str = r#"
assetDir: /var/lib/trellis/lab
clusterName: lab
matchboxEndpoint: matchbox.lab:8081
matchboxHttpEndpoint: http://matchbox.lab:8080
matchboxCaPath: /etc/matchbox/ca.crt
matchboxClientCertPath: /etc/matchbox/client.crt
matchboxClientKeyPath: /etc/matchbox/client.key
k8sDomainName: k8s.lab
sshPubkeys: [ssh-ed25519 AAAA ops@lab]
controllerDomains: [node1.lab]
controllerMacs: ["52:54:00:a1:9c:ae"]
controllerNames: [node1]
workerDomains: [node2.lab, node3.lab]
workerMacs: ["52:54:00:b2:2f:86", "52:54:00:c3:61:77"]
workerNames: [node2, node3]
"#;

    fn settings() -> BareMetalSettings {
        serde_yaml::from_str(SETTINGS).unwrap()
    }

    #[test]
    fn meta_describes_bare_metal() {
        let platform = BareMetalPlatform::new(settings(), vec![]).unwrap();
        let meta = platform.meta();
        assert_eq!(meta.name, "bare-metal");
        assert_eq!(meta.modules, vec!["bare-metal", "bootkube"]);
        assert_eq!(meta.asset_dir, "/var/lib/trellis/lab");
    }

    #[test]
    fn mismatched_worker_lists_are_rejected() {
        let err = BareMetalPlatform::new(
            BareMetalSettings {
                worker_names: vec!["node2".to_string()],
                ..settings()
            },
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("worker domains, MACs and names"));
    }

    #[test]
    fn controllers_are_required() {
        let err = BareMetalPlatform::new(
            BareMetalSettings {
                controller_domains: vec![],
                controller_macs: vec![],
                controller_names: vec![],
                ..settings()
            },
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least one controller"));
    }

    #[tokio::test]
    async fn initialize_writes_matchbox_variables() {
        let asset_dir = tempfile::tempdir().unwrap();
        let working_dir = asset_dir.path().join("terraform");
        std::fs::create_dir_all(&working_dir).unwrap();

        let mut executor = MockExecutor::new();
        let dir = working_dir.clone();
        executor
            .expect_working_dir()
            .returning(move || dir.clone());

        let platform =
            BareMetalPlatform::new(settings(), vec!["kubelet".to_string()]).unwrap();
        platform.initialize(&executor).await.unwrap();

        let written: Value = serde_json::from_str(
            &std::fs::read_to_string(working_dir.join(CLUSTER_FILE)).unwrap(),
        )
        .unwrap();
        let module = &written["module"]["bare-metal"];
        assert_eq!(module["source"], "../terraform-modules/bare-metal");
        assert_eq!(module["matchbox_endpoint"], "matchbox.lab:8081");
        assert_eq!(module["worker_names"][1], "node3");
        assert_eq!(module["os_version"], "current");
        assert!(written["output"]["kubelet_values"].is_object());
        assert!(written.get("provider").is_none());
    }
}
