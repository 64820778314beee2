//! Preparing the Terraform working directory inside a cluster asset directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use trellis_common::paths::{bundled_modules_dir, terraform_modules_dir, terraform_root_dir};

/// Rendered backend configuration file
pub const BACKEND_FILE: &str = "backend.tf.json";

/// Platform module instantiation, written by the platform
pub const CLUSTER_FILE: &str = "cluster.tf.json";

/// Errors preparing the working directory
#[derive(Debug, Error)]
pub enum ConfigureError {
    /// A directory could not be created
    #[error("creating directory {}: {source}", .path.display())]
    CreateDir {
        /// Directory being created
        path: PathBuf,
        /// Underlying cause
        source: io::Error,
    },

    /// A file could not be written
    #[error("writing {}: {source}", .path.display())]
    Write {
        /// File being written
        path: PathBuf,
        /// Underlying cause
        source: io::Error,
    },

    /// The assets bundle does not contain a module the platform needs
    #[error("terraform module '{module}' not found in {}", .path.display())]
    MissingModule {
        /// Module name
        module: String,
        /// Where it was expected
        path: PathBuf,
    },

    /// Copying a module failed part way
    #[error("copying terraform module '{module}': {source}")]
    CopyModule {
        /// Module name
        module: String,
        /// Underlying cause
        source: io::Error,
    },
}

/// Prepare `<asset_dir>/terraform` for Terraform
///
/// Copies every module in `modules` from the assets bundle into
/// `<asset_dir>/terraform-modules`, replacing earlier copies, and writes the
/// rendered backend. Returns the working directory.
pub fn configure(
    asset_dir: &Path,
    assets: &Path,
    rendered_backend: &str,
    modules: &[String],
) -> Result<PathBuf, ConfigureError> {
    let working_dir = terraform_root_dir(asset_dir);
    create_dir(&working_dir)?;

    let source_root = bundled_modules_dir(assets);
    let target_root = terraform_modules_dir(asset_dir);
    create_dir(&target_root)?;

    for module in modules {
        let source = source_root.join(module);
        if !source.is_dir() {
            return Err(ConfigureError::MissingModule {
                module: module.clone(),
                path: source_root.clone(),
            });
        }

        let target = target_root.join(module);
        replace_dir(&source, &target).map_err(|source| ConfigureError::CopyModule {
            module: module.clone(),
            source,
        })?;
        debug!(module = %module, target = %target.display(), "copied terraform module");
    }

    let backend_path = working_dir.join(BACKEND_FILE);
    fs::write(&backend_path, rendered_backend).map_err(|source| ConfigureError::Write {
        path: backend_path.clone(),
        source,
    })?;

    Ok(working_dir)
}

fn create_dir(path: &Path) -> Result<(), ConfigureError> {
    fs::create_dir_all(path).map_err(|source| ConfigureError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn replace_dir(source: &Path, target: &Path) -> io::Result<()> {
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    copy_dir(source, target)
}

fn copy_dir(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&path, &dest)?;
        } else {
            fs::copy(&path, &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets_with_modules(modules: &[&str]) -> tempfile::TempDir {
        let assets = tempfile::tempdir().unwrap();
        for module in modules {
            let dir = bundled_modules_dir(assets.path()).join(module);
            fs::create_dir_all(dir.join("templates")).unwrap();
            fs::write(dir.join("main.tf"), format!("# {}\n", module)).unwrap();
            fs::write(dir.join("templates").join("user-data.yaml"), "#cloud-config\n").unwrap();
        }
        assets
    }

    fn modules(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn writes_backend_and_copies_modules() {
        let assets = assets_with_modules(&["aws", "bootkube"]);
        let asset_dir = tempfile::tempdir().unwrap();

        let working_dir = configure(
            asset_dir.path(),
            assets.path(),
            "{\"terraform\":{}}",
            &modules(&["aws", "bootkube"]),
        )
        .unwrap();

        assert_eq!(working_dir, asset_dir.path().join("terraform"));
        assert_eq!(
            fs::read_to_string(working_dir.join(BACKEND_FILE)).unwrap(),
            "{\"terraform\":{}}"
        );
        let copied = asset_dir.path().join("terraform-modules");
        assert_eq!(
            fs::read_to_string(copied.join("aws").join("main.tf")).unwrap(),
            "# aws\n"
        );
        assert!(copied
            .join("bootkube")
            .join("templates")
            .join("user-data.yaml")
            .is_file());
    }

    #[test]
    fn rerunning_overwrites_previous_artifacts() {
        let assets = assets_with_modules(&["aws"]);
        let asset_dir = tempfile::tempdir().unwrap();
        let mods = modules(&["aws"]);

        configure(asset_dir.path(), assets.path(), "first", &mods).unwrap();
        let stale = asset_dir
            .path()
            .join("terraform-modules")
            .join("aws")
            .join("stale.tf");
        fs::write(&stale, "old").unwrap();

        let working_dir = configure(asset_dir.path(), assets.path(), "second", &mods).unwrap();

        assert_eq!(
            fs::read_to_string(working_dir.join(BACKEND_FILE)).unwrap(),
            "second"
        );
        assert!(!stale.exists());
    }

    #[test]
    fn missing_module_is_reported() {
        let assets = assets_with_modules(&["aws"]);
        let asset_dir = tempfile::tempdir().unwrap();

        let err = configure(
            asset_dir.path(),
            assets.path(),
            "{}",
            &modules(&["aws", "bootkube"]),
        )
        .unwrap_err();

        assert!(matches!(err, ConfigureError::MissingModule { ref module, .. } if module == "bootkube"));
    }
}
