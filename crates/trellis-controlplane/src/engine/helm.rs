//! Deployment engine driving the `helm` binary

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ActionContext, DeploymentEngine, EngineError, InstallOptions, UpgradeOptions};
use crate::chart::Chart;
use crate::values::Values;

/// Environment variable overriding the helm binary
pub const HELM_BIN_ENV: &str = "TRELLIS_HELM_BIN";

/// Engine running helm as a child process
#[derive(Clone, Debug)]
pub struct HelmCli {
    binary: PathBuf,
}

#[derive(Deserialize)]
struct ListedRelease {
    name: String,
}

impl HelmCli {
    /// Locate helm: `TRELLIS_HELM_BIN`, then `PATH`
    pub fn new() -> Result<Self, EngineError> {
        if let Ok(bin) = std::env::var(HELM_BIN_ENV) {
            if !bin.is_empty() {
                return Ok(Self::with_binary(bin));
            }
        }
        let binary = which::which("helm").map_err(|e| EngineError::BinaryNotFound(e.to_string()))?;
        Ok(Self::with_binary(binary))
    }

    /// Use a specific helm binary
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Binary this engine runs
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, ctx: &ActionContext, args: &[String]) -> Result<String, EngineError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).arg("--namespace").arg(ctx.namespace());
        if let Some(kubeconfig) = ctx.kubeconfig_path() {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }

        let description = format!("helm {}", args.join(" "));
        debug!(command = %description, namespace = %ctx.namespace(), "running helm");
        let output = cmd.kill_on_drop(true).output().await?;

        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                command: description,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Anchored `helm list --filter` pattern matching exactly `name`
pub(crate) fn release_filter(name: &str) -> String {
    let mut pattern = String::with_capacity(name.len() + 2);
    pattern.push('^');
    for c in name.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('$');
    pattern
}

/// Whether `helm list -o json` output contains release `name`
pub(crate) fn release_listed(json: &str, name: &str) -> Result<bool, EngineError> {
    let json = json.trim();
    if json.is_empty() {
        return Ok(false);
    }
    let releases: Vec<ListedRelease> = serde_json::from_str(json)?;
    Ok(releases.iter().any(|r| r.name == name))
}

pub(crate) fn install_args(chart: &Chart, values_file: &Path, options: &InstallOptions) -> Vec<String> {
    let mut args = vec![
        "install".to_string(),
        options.release_name.clone(),
        chart.path.to_string_lossy().into_owned(),
        "--values".to_string(),
        values_file.to_string_lossy().into_owned(),
    ];
    if options.atomic {
        args.push("--atomic".to_string());
    }
    if options.create_namespace {
        args.push("--create-namespace".to_string());
    }
    args
}

pub(crate) fn upgrade_args(
    name: &str,
    chart: &Chart,
    values_file: &Path,
    options: &UpgradeOptions,
) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        name.to_string(),
        chart.path.to_string_lossy().into_owned(),
        "--values".to_string(),
        values_file.to_string_lossy().into_owned(),
    ];
    if options.atomic {
        args.push("--atomic".to_string());
    }
    args
}

/// Stage `values` in a temporary file; JSON is valid YAML for helm
fn values_file(values: &Values) -> Result<tempfile::TempPath, EngineError> {
    let mut file = tempfile::Builder::new()
        .prefix("trellis-values-")
        .suffix(".yaml")
        .tempfile()?;
    serde_json::to_writer(&mut file, values)?;
    file.flush()?;
    Ok(file.into_temp_path())
}

#[async_trait]
impl DeploymentEngine for HelmCli {
    fn action_context(
        &self,
        namespace: &str,
        kubeconfig: &[u8],
    ) -> Result<ActionContext, EngineError> {
        let mut file = tempfile::Builder::new()
            .prefix("trellis-kubeconfig-")
            .tempfile()
            .map_err(EngineError::Kubeconfig)?;
        file.write_all(kubeconfig).map_err(EngineError::Kubeconfig)?;
        file.flush().map_err(EngineError::Kubeconfig)?;
        Ok(ActionContext::with_kubeconfig(namespace, file.into_temp_path()))
    }

    async fn release_exists(&self, ctx: &ActionContext, name: &str) -> Result<bool, EngineError> {
        let args = vec![
            "list".to_string(),
            "--all".to_string(),
            "--filter".to_string(),
            release_filter(name),
            "--output".to_string(),
            "json".to_string(),
        ];
        let stdout = self.run(ctx, &args).await?;
        release_listed(&stdout, name)
    }

    async fn install(
        &self,
        ctx: &ActionContext,
        chart: &Chart,
        values: &Values,
        options: &InstallOptions,
    ) -> Result<(), EngineError> {
        let values_path = values_file(values)?;
        let args = install_args(chart, &values_path, options);
        self.run(ctx, &args).await?;
        info!(release = %options.release_name, namespace = %ctx.namespace(), "release installed");
        Ok(())
    }

    async fn upgrade(
        &self,
        ctx: &ActionContext,
        name: &str,
        chart: &Chart,
        values: &Values,
        options: &UpgradeOptions,
    ) -> Result<(), EngineError> {
        let values_path = values_file(values)?;
        let args = upgrade_args(name, chart, &values_path, options);
        self.run(ctx, &args).await?;
        info!(release = %name, namespace = %ctx.namespace(), "release upgraded");
        Ok(())
    }
}
