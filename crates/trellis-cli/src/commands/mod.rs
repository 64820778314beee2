//! CLI commands

use std::path::{Path, PathBuf};

use clap::Args;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};
use trellis_common::config::load_config;
use trellis_common::paths::expand_home;
use trellis_common::{ClusterConfig, Error, Result, DEFAULT_CONFIG_FILE};
use trellis_infra::{platform_from_config, resolve_backend, Backend, Platform};

pub mod cluster;

/// Arguments shared by every cluster command
#[derive(Args, Debug)]
pub struct ClusterArgs {
    /// Cluster configuration file
    #[arg(short = 'f', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub confirm: bool,
}

/// Configuration, platform and backend for one invocation
pub struct LoadedCluster {
    pub config: ClusterConfig,
    pub platform: Box<dyn Platform>,
    pub backend: Box<dyn Backend>,
}

impl LoadedCluster {
    /// Load `path` and decode its platform and backend (local by default)
    pub fn load(path: &Path) -> Result<Self> {
        let config = load_config(path)?;
        Self::from_config(config)
    }

    pub fn from_config(config: ClusterConfig) -> Result<Self> {
        let platform = platform_from_config(&config)?;
        let backend = resolve_backend(&config)?;
        Ok(Self {
            config,
            platform,
            backend,
        })
    }

    /// Platform asset directory as written in the configuration
    pub fn asset_dir_setting(&self) -> String {
        self.platform.meta().asset_dir
    }

    /// Platform asset directory with `~` expanded
    pub fn asset_dir(&self) -> Result<PathBuf> {
        let setting = self.asset_dir_setting();
        expand_home(&setting).map_err(|e| Error::PathResolution {
            path: setting,
            source: Box::new(e),
        })
    }

    /// What the command is about to act on
    pub fn summary(&self) -> String {
        format!(
            "Platform:  {}\nAssets:    {}\nBackend:   {}",
            self.platform.meta().name,
            self.asset_dir_setting(),
            self.backend.kind()
        )
    }
}

/// Ask `question` on stdin; anything but `y`/`yes` declines
pub async fn confirm(question: &str) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    let prompt = format!("{} [y/N] ", question);
    stdout
        .write_all(prompt.as_bytes())
        .await
        .map_err(|e| Error::aborted(format!("writing prompt: {}", e)))?;
    stdout
        .flush()
        .await
        .map_err(|e| Error::aborted(format!("writing prompt: {}", e)))?;

    let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
    read_answer(&mut reader).await
}

async fn read_answer<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<bool> {
    let mut input = String::new();
    reader
        .read_line(&mut input)
        .await
        .map_err(|e| Error::aborted(format!("reading confirmation: {}", e)))?;
    let answer = input.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

#[cfg(test)]
mod tests {
    use trellis_common::ErrorKind;

    use super::*;

    const AWS_CONFIG: &str = r#"
cluster:
  platform: aws
  settings:
    assetDir: ~/clusters/demo
    clusterName: demo
    region: eu-central-1
    dnsZone: example.com
    dnsZoneId: Z123
    sshPubkeys: ["ssh-ed25519 AAAA demo"]
"#;

    #[tokio::test]
    async fn answers_yes_in_any_case() {
        for input in ["y\n", "Y\n", "yes\n", " YES \n"] {
            let mut reader = input.as_bytes();
            assert!(read_answer(&mut reader).await.unwrap(), "{:?}", input);
        }
    }

    #[tokio::test]
    async fn anything_else_declines() {
        for input in ["\n", "n\n", "nope\n", ""] {
            let mut reader = input.as_bytes();
            assert!(!read_answer(&mut reader).await.unwrap(), "{:?}", input);
        }
    }

    #[test]
    fn unconfigured_backend_is_local() {
        let config = ClusterConfig::from_yaml(AWS_CONFIG).unwrap();
        let cluster = LoadedCluster::from_config(config).unwrap();

        assert_eq!(cluster.backend.kind().to_string(), "local");
        assert_eq!(cluster.asset_dir_setting(), "~/clusters/demo");
        assert!(cluster.summary().contains("Platform:  aws"));
    }

    #[test]
    fn demo_configurations_load() {
        let aws = ClusterConfig::from_yaml(include_str!("../../../../demos/aws.yaml")).unwrap();
        let cluster = LoadedCluster::from_config(aws).unwrap();
        assert_eq!(cluster.backend.kind().to_string(), "s3");
        assert_eq!(cluster.config.controlplane.components.len(), 6);

        let metal =
            ClusterConfig::from_yaml(include_str!("../../../../demos/bare-metal.yaml")).unwrap();
        let cluster = LoadedCluster::from_config(metal).unwrap();
        assert_eq!(cluster.platform.meta().name, "bare-metal");
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LoadedCluster::load(&dir.path().join("trellis.yaml"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
