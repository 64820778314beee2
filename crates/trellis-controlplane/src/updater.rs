//! Control-plane convergence
//!
//! Each component is converged in two actions: an atomic install when its
//! release is missing, then an atomic upgrade that always runs, so the
//! release ends up rendered from the values the infrastructure reports now.
//! Whether a release exists is looked up on every call; nothing is cached.

use std::fmt;
use std::io::Write;

use tracing::{debug, Instrument};
use trellis_common::config::ComponentRef;
use trellis_common::{DiagnosticContext, Error, Result};
use trellis_infra::Executor;

use crate::chart::ChartSource;
use crate::engine::{DeploymentEngine, InstallOptions, UpgradeOptions};
use crate::values::read_values;

/// Where a component is in its convergence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentState {
    /// No release exists
    Absent,
    /// The release is being installed
    Installing,
    /// The release exists
    Installed,
    /// The release is being upgraded
    Upgrading,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Upgrading => "upgrading",
        };
        f.write_str(s)
    }
}

/// Converges control-plane components of one cluster
pub struct ControlplaneUpdater<'a> {
    engine: &'a dyn DeploymentEngine,
    charts: &'a dyn ChartSource,
    executor: &'a dyn Executor,
    kubeconfig: Vec<u8>,
    ctx: DiagnosticContext,
}

impl<'a> ControlplaneUpdater<'a> {
    /// Updater authenticating with `kubeconfig` and reading values from `executor`
    pub fn new(
        engine: &'a dyn DeploymentEngine,
        charts: &'a dyn ChartSource,
        executor: &'a dyn Executor,
        kubeconfig: Vec<u8>,
        ctx: &DiagnosticContext,
    ) -> Self {
        Self {
            engine,
            charts,
            executor,
            kubeconfig,
            ctx: ctx.with("action", "controlplane-upgrade"),
        }
    }

    /// Converge every component, in order, stopping at the first failure
    pub async fn upgrade_all(&self, components: &[ComponentRef]) -> Result<()> {
        for component in components {
            self.upgrade_component(&component.name, &component.namespace)
                .await?;
        }
        Ok(())
    }

    /// Install `component` into `namespace` if missing, then upgrade it
    pub async fn upgrade_component(
        &self,
        component: &str,
        namespace: &str,
    ) -> Result<ComponentState> {
        let ctx = self
            .ctx
            .with("component", component)
            .with("namespace", namespace);

        self.converge(component, namespace)
            .instrument(ctx.span())
            .await
            .map_err(|e| e.with_context(&ctx))
    }

    async fn converge(&self, component: &str, namespace: &str) -> Result<ComponentState> {
        let action = self
            .engine
            .action_context(namespace, &self.kubeconfig)
            .map_err(|e| Error::EngineInit {
                component: component.to_string(),
                namespace: namespace.to_string(),
                source: Box::new(e),
            })?;

        let chart = self.charts.load(component).map_err(|e| Error::ChartLoad {
            component: component.to_string(),
            source: Box::new(e),
        })?;
        chart.validate().map_err(|e| Error::ChartInvalid {
            component: component.to_string(),
            source: Box::new(e),
        })?;

        let values = read_values(self.executor, component).await?;

        let exists = self
            .engine
            .release_exists(&action, component)
            .await
            .map_err(|e| Error::ReleaseQuery {
                component: component.to_string(),
                namespace: namespace.to_string(),
                source: Box::new(e),
            })?;
        let mut state = if exists {
            ComponentState::Installed
        } else {
            ComponentState::Absent
        };
        debug!(%state, "release looked up");

        if state == ComponentState::Absent {
            state = ComponentState::Installing;
            debug!(%state, "installing release");
            progress(&format!(
                "Controlplane component '{}' is missing, reinstalling...",
                component
            ));

            let options = InstallOptions {
                release_name: component.to_string(),
                namespace: namespace.to_string(),
                atomic: true,
                create_namespace: true,
            };
            let installed = self.engine.install(&action, &chart, &values, &options).await;
            finish(installed.is_ok());
            installed.map_err(|e| Error::Install {
                component: component.to_string(),
                namespace: namespace.to_string(),
                source: Box::new(e),
            })?;

            state = ComponentState::Installed;
            debug!(%state, "release installed");
        }

        state = ComponentState::Upgrading;
        debug!(%state, "upgrading release");
        progress(&format!(
            "Ensuring controlplane component '{}' is up to date... ",
            component
        ));

        let upgraded = self
            .engine
            .upgrade(&action, component, &chart, &values, &UpgradeOptions { atomic: true })
            .await;
        finish(upgraded.is_ok());
        upgraded.map_err(|e| Error::Upgrade {
            component: component.to_string(),
            namespace: namespace.to_string(),
            source: Box::new(e),
        })?;

        state = ComponentState::Installed;
        debug!(%state, "release up to date");
        Ok(state)
    }
}

fn progress(message: &str) {
    print!("{}", message);
    let _ = std::io::stdout().flush();
}

fn finish(ok: bool) {
    if ok {
        println!("Done.");
    } else {
        println!("Failed!");
    }
}
