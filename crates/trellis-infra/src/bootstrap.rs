//! Bootstrapping an initialized Terraform executor
//!
//! Steps run strictly in order and each fails with its own error kind:
//!
//! 1. expand the platform asset directory
//! 2. validate the backend
//! 3. render the backend
//! 4. configure the working directory
//! 5. create the executor
//! 6. run the platform initialization hook
//! 7. `terraform init`
//!
//! Validation happens before anything touches the filesystem. Rendering and
//! configuring overwrite earlier artifacts, so bootstrapping an already
//! bootstrapped asset directory succeeds.

use std::path::PathBuf;

use tracing::{info, Instrument};
use trellis_common::paths::{assets_dir, expand_home};
use trellis_common::{DiagnosticContext, Error, Result};

use crate::backend::Backend;
use crate::platform::Platform;
use crate::terraform::{configure, Executor, ExecutorConfig, ExecutorFactory, TerraformFactory};

/// Inputs to bootstrapping that do not come from the cluster configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Assets bundle holding the Terraform modules
    pub assets_dir: PathBuf,
    /// Echo Terraform's progress
    pub verbose: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            assets_dir: assets_dir(),
            verbose: false,
        }
    }
}

/// Bootstrap with the real Terraform executor
pub async fn bootstrap(
    platform: &dyn Platform,
    backend: &dyn Backend,
    options: &BootstrapOptions,
    ctx: &DiagnosticContext,
) -> Result<Box<dyn Executor>> {
    bootstrap_with(&TerraformFactory, platform, backend, options, ctx).await
}

/// Bootstrap using `factory` to create the executor
pub async fn bootstrap_with<F: ExecutorFactory + ?Sized>(
    factory: &F,
    platform: &dyn Platform,
    backend: &dyn Backend,
    options: &BootstrapOptions,
    ctx: &DiagnosticContext,
) -> Result<Box<dyn Executor>> {
    let meta = platform.meta();
    let ctx = ctx
        .with("platform", &meta.name)
        .with("backend", backend.kind());

    run_steps(factory, platform, backend, options)
        .instrument(ctx.span())
        .await
        .map_err(|e| e.with_context(&ctx))
}

async fn run_steps<F: ExecutorFactory + ?Sized>(
    factory: &F,
    platform: &dyn Platform,
    backend: &dyn Backend,
    options: &BootstrapOptions,
) -> Result<Box<dyn Executor>> {
    let meta = platform.meta();

    let asset_dir = expand_home(&meta.asset_dir).map_err(|e| Error::PathResolution {
        path: meta.asset_dir.clone(),
        source: Box::new(e),
    })?;

    backend.validate().map_err(|e| Error::BackendConfig {
        backend: backend.kind().to_string(),
        source: Box::new(e),
    })?;

    let rendered = backend.render().map_err(|e| Error::Render {
        backend: backend.kind().to_string(),
        source: Box::new(e),
    })?;

    let working_dir = configure(&asset_dir, &options.assets_dir, &rendered, &meta.modules)
        .map_err(|e| Error::Configure {
            dir: asset_dir.display().to_string(),
            source: Box::new(e),
        })?;

    let executor = factory
        .create(ExecutorConfig {
            working_dir: working_dir.clone(),
            verbose: options.verbose,
        })
        .map_err(|e| Error::ExecutorCreation {
            dir: working_dir.display().to_string(),
            source: Box::new(e),
        })?;

    platform
        .initialize(executor.as_ref())
        .await
        .map_err(|e| Error::PlatformInit {
            platform: meta.name.clone(),
            source: Box::new(e),
        })?;

    executor
        .init()
        .await
        .map_err(|e| Error::InfraInit {
            source: Box::new(e),
        })?;

    info!(dir = %working_dir.display(), "terraform initialized");
    Ok(executor)
}
