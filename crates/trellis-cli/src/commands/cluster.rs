//! Cluster commands
//!
//! `apply` bootstraps Terraform, applies the infrastructure and, for a
//! cluster that already existed, converges its control-plane components.
//! `destroy` tears the infrastructure down.

use std::path::Path;

use clap::{Args, Subcommand};
use tracing::{info, Instrument};
use trellis_common::paths::{assets_dir, kubeconfig_path};
use trellis_common::{ComponentRef, DiagnosticContext, Error, Result};
use trellis_controlplane::{ControlplaneUpdater, DirChartSource, HelmCli};
use trellis_infra::{bootstrap, cluster_exists, ApplyReport, BootstrapOptions, Executor};

use super::{confirm, ClusterArgs, LoadedCluster};

#[derive(Subcommand, Debug)]
pub enum ClusterCommand {
    /// Create or update a cluster
    Apply(ApplyArgs),
    /// Destroy a cluster
    Destroy(DestroyArgs),
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Do not converge control-plane components after apply
    #[arg(long)]
    pub skip_components: bool,
}

#[derive(Args, Debug)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,
}

pub async fn run(cmd: ClusterCommand, verbose: bool) -> Result<()> {
    match cmd {
        ClusterCommand::Apply(args) => apply(args, verbose).await,
        ClusterCommand::Destroy(args) => destroy(args, verbose).await,
    }
}

async fn apply(args: ApplyArgs, verbose: bool) -> Result<()> {
    let ctx = DiagnosticContext::new().with("action", "cluster-apply");
    let cluster = LoadedCluster::load(&args.cluster.config)?;

    println!("{}", cluster.summary());
    if !args.cluster.confirm && !confirm("Do you want to proceed?").await? {
        return Err(Error::aborted("cluster apply declined"));
    }

    let options = BootstrapOptions {
        assets_dir: assets_dir(),
        verbose,
    };
    let executor = bootstrap(
        cluster.platform.as_ref(),
        cluster.backend.as_ref(),
        &options,
        &ctx,
    )
    .await?;

    let existed = cluster_exists(executor.as_ref(), &ctx).await?;
    let report = apply_infrastructure(executor.as_ref(), &ctx).await?;
    if let Some(summary) = &report.summary {
        println!(
            "Apply complete! Resources: {} added, {} changed, {} destroyed.",
            summary.add, summary.change, summary.remove
        );
    }

    if !existed {
        info!("cluster created, control-plane components were installed by the platform bootstrap");
    } else if args.skip_components {
        info!("skipping control-plane components");
    } else {
        let kubeconfig = read_kubeconfig(&cluster.asset_dir()?).await?;
        converge_components(
            executor.as_ref(),
            &options,
            kubeconfig,
            &cluster.config.controlplane.components,
            &ctx,
        )
        .await?;
    }

    println!(
        "\nYour configurations are stored in {}",
        cluster.asset_dir_setting()
    );
    Ok(())
}

async fn destroy(args: DestroyArgs, verbose: bool) -> Result<()> {
    let ctx = DiagnosticContext::new().with("action", "cluster-destroy");
    let cluster = LoadedCluster::load(&args.cluster.config)?;

    println!("{}", cluster.summary());
    if !args.cluster.confirm
        && !confirm("WARNING: This action cannot be undone. Do you really want to destroy the cluster?")
            .await?
    {
        return Err(Error::aborted("cluster destroy declined"));
    }

    let options = BootstrapOptions {
        assets_dir: assets_dir(),
        verbose,
    };
    let executor = bootstrap(
        cluster.platform.as_ref(),
        cluster.backend.as_ref(),
        &options,
        &ctx,
    )
    .await?;

    if destroy_infrastructure(executor.as_ref(), &ctx).await? {
        println!("Cluster destroyed successfully");
    } else {
        println!("Cluster already destroyed, nothing to do");
    }
    Ok(())
}

/// Apply, failing when any resource failed
pub(crate) async fn apply_infrastructure(
    executor: &dyn Executor,
    ctx: &DiagnosticContext,
) -> Result<ApplyReport> {
    let report = executor
        .apply()
        .instrument(ctx.span())
        .await
        .map_err(|e| {
            Error::Apply {
                source: Box::new(e),
            }
            .with_context(ctx)
        })?;

    report.into_result().map_err(|e| {
        Error::Apply {
            source: Box::new(e),
        }
        .with_context(ctx)
    })
}

/// Destroy the cluster if it exists; returns whether anything was destroyed
pub(crate) async fn destroy_infrastructure(
    executor: &dyn Executor,
    ctx: &DiagnosticContext,
) -> Result<bool> {
    if !cluster_exists(executor, ctx).await? {
        return Ok(false);
    }

    executor
        .destroy()
        .instrument(ctx.span())
        .await
        .map_err(|e| {
            Error::Destroy {
                source: Box::new(e),
            }
            .with_context(ctx)
        })?;
    Ok(true)
}

/// Admin kubeconfig the platform bootstrap wrote under `asset_dir`
pub(crate) async fn read_kubeconfig(asset_dir: &Path) -> Result<Vec<u8>> {
    let path = kubeconfig_path(asset_dir);
    tokio::fs::read(&path)
        .await
        .map_err(|e| Error::Credentials {
            path: path.display().to_string(),
            source: Box::new(e),
        })
}

async fn converge_components(
    executor: &dyn Executor,
    options: &BootstrapOptions,
    kubeconfig: Vec<u8>,
    components: &[ComponentRef],
    ctx: &DiagnosticContext,
) -> Result<()> {
    let Some(first) = components.first() else {
        return Ok(());
    };
    let helm = HelmCli::new().map_err(|e| Error::EngineInit {
        component: first.name.clone(),
        namespace: first.namespace.clone(),
        source: Box::new(e),
    })?;
    let charts = DirChartSource::from_assets(&options.assets_dir);

    ControlplaneUpdater::new(&helm, &charts, executor, kubeconfig, ctx)
        .upgrade_all(components)
        .await
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::{json, Value};
    use trellis_common::ErrorKind;
    use trellis_infra::terraform::{ExecutorError, ResourceFailure};
    use trellis_infra::Outputs;

    use super::*;

    /// Executor with canned outputs and apply result
    #[derive(Default)]
    struct FakeExecutor {
        outputs: Outputs,
        report: ApplyReport,
        fail_destroy: bool,
        destroyed: AtomicBool,
    }

    impl FakeExecutor {
        fn existing() -> Self {
            let mut outputs = Outputs::new();
            outputs.insert("kubeconfig".to_string(), json!("apiVersion: v1"));
            Self {
                outputs,
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl Executor for FakeExecutor {
        fn working_dir(&self) -> PathBuf {
            PathBuf::from("/tmp/demo/terraform")
        }

        async fn init(&self) -> std::result::Result<(), ExecutorError> {
            Ok(())
        }

        async fn outputs(&self) -> std::result::Result<Outputs, ExecutorError> {
            Ok(self.outputs.clone())
        }

        async fn output(&self, name: &str) -> std::result::Result<Value, ExecutorError> {
            self.outputs
                .get(name)
                .cloned()
                .ok_or_else(|| ExecutorError::OutputNotFound(name.to_string()))
        }

        async fn apply(&self) -> std::result::Result<ApplyReport, ExecutorError> {
            Ok(self.report.clone())
        }

        async fn destroy(&self) -> std::result::Result<(), ExecutorError> {
            if self.fail_destroy {
                return Err(ExecutorError::CommandFailed {
                    command: "terraform destroy".to_string(),
                    message: "state locked".to_string(),
                });
            }
            self.destroyed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    // ==========================================================================
    // Story: apply only succeeds when every resource did
    // ==========================================================================

    #[tokio::test]
    async fn successful_apply_returns_the_report() {
        let executor = FakeExecutor {
            report: ApplyReport {
                applied: vec!["aws_instance.controller[0]".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        let report = apply_infrastructure(&executor, &DiagnosticContext::new())
            .await
            .unwrap();
        assert_eq!(report.applied.len(), 1);
    }

    #[tokio::test]
    async fn failed_resources_are_an_apply_error() {
        let executor = FakeExecutor {
            report: ApplyReport {
                failed: vec![ResourceFailure {
                    address: "aws_route53_record.apiserver".to_string(),
                    message: "zone not found".to_string(),
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let ctx = DiagnosticContext::new().with("action", "cluster-apply");

        let err = apply_infrastructure(&executor, &ctx).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Apply);
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("aws_route53_record.apiserver"));
        assert_eq!(err.context().unwrap().get("action"), Some("cluster-apply"));
    }

    // ==========================================================================
    // Story: destroy is a no-op for a cluster that was never applied
    // ==========================================================================

    #[tokio::test]
    async fn destroying_a_missing_cluster_does_nothing() {
        let executor = FakeExecutor::default();

        let destroyed = destroy_infrastructure(&executor, &DiagnosticContext::new())
            .await
            .unwrap();

        assert!(!destroyed);
        assert!(!executor.destroyed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn existing_cluster_is_destroyed() {
        let executor = FakeExecutor::existing();

        let destroyed = destroy_infrastructure(&executor, &DiagnosticContext::new())
            .await
            .unwrap();

        assert!(destroyed);
        assert!(executor.destroyed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn destroy_failure_is_reported() {
        let executor = FakeExecutor {
            fail_destroy: true,
            ..FakeExecutor::existing()
        };

        let err = destroy_infrastructure(&executor, &DiagnosticContext::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Destroy);
        assert!(err.root_cause().to_string().contains("state locked"));
    }

    // ==========================================================================
    // Story: control-plane convergence needs the cluster credentials
    // ==========================================================================

    #[tokio::test]
    async fn kubeconfig_is_read_from_cluster_assets() {
        let asset_dir = tempfile::tempdir().unwrap();
        let path = kubeconfig_path(asset_dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "apiVersion: v1\n").unwrap();

        let kubeconfig = read_kubeconfig(asset_dir.path()).await.unwrap();
        assert_eq!(kubeconfig, b"apiVersion: v1\n");
    }

    #[tokio::test]
    async fn missing_kubeconfig_is_a_credentials_error() {
        let asset_dir = tempfile::tempdir().unwrap();

        let err = read_kubeconfig(asset_dir.path()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Credentials);
        assert!(err.to_string().contains("cluster-assets"));
    }

    #[tokio::test]
    async fn no_components_means_no_helm() {
        let executor = FakeExecutor::existing();
        let options = BootstrapOptions {
            assets_dir: PathBuf::from("/nonexistent"),
            verbose: false,
        };

        converge_components(&executor, &options, Vec::new(), &[], &DiagnosticContext::new())
            .await
            .unwrap();
    }
}
