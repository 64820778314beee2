//! Filesystem layout of the assets bundle and per-cluster asset directories

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable overriding the assets bundle location
pub const ASSETS_DIR_ENV: &str = "TRELLIS_ASSETS_DIR";

/// Default assets bundle location for packaged installs
const DEFAULT_ASSETS_DIR: &str = "/usr/share/trellis";

/// Errors from `~` expansion
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// The current user's home directory could not be determined
    #[error("cannot determine home directory")]
    NoHomeDir,

    /// `~user` forms are not supported
    #[error("cannot expand user-specific home dir in {0}")]
    UserHomeDir(String),
}

/// Expand a leading `~` to the current user's home directory
pub fn expand_home(path: &str) -> Result<PathBuf, PathError> {
    expand_home_with(path, dirs::home_dir)
}

fn expand_home_with(
    path: &str,
    home_dir: impl FnOnce() -> Option<PathBuf>,
) -> Result<PathBuf, PathError> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };

    if !rest.is_empty() && !rest.starts_with('/') && !rest.starts_with('\\') {
        return Err(PathError::UserHomeDir(path.to_string()));
    }

    let home = home_dir().ok_or(PathError::NoHomeDir)?;
    let rest = rest.trim_start_matches(['/', '\\']);
    if rest.is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}

/// Get the assets bundle directory - checks runtime env var first, then compile-time, then default
pub fn assets_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ASSETS_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(dir) = option_env!("TRELLIS_ASSETS_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from(DEFAULT_ASSETS_DIR)
}

/// Terraform modules shipped in the assets bundle
pub fn bundled_modules_dir(assets: &Path) -> PathBuf {
    assets.join("terraform-modules")
}

/// Control-plane charts shipped in the assets bundle
pub fn controlplane_charts_dir(assets: &Path) -> PathBuf {
    assets.join("charts").join("control-plane")
}

/// Terraform working directory inside a cluster asset directory
pub fn terraform_root_dir(asset_dir: &Path) -> PathBuf {
    asset_dir.join("terraform")
}

/// Copied Terraform modules inside a cluster asset directory
pub fn terraform_modules_dir(asset_dir: &Path) -> PathBuf {
    asset_dir.join("terraform-modules")
}

/// Admin kubeconfig generated into a cluster asset directory
pub fn kubeconfig_path(asset_dir: &Path) -> PathBuf {
    asset_dir
        .join("cluster-assets")
        .join("auth")
        .join("kubeconfig")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home() -> Option<PathBuf> {
        Some(PathBuf::from("/home/ops"))
    }

    #[test]
    fn plain_paths_are_returned_unchanged() {
        assert_eq!(
            expand_home_with("/var/lib/trellis", home).unwrap(),
            PathBuf::from("/var/lib/trellis")
        );
        assert_eq!(
            expand_home_with("relative/dir", home).unwrap(),
            PathBuf::from("relative/dir")
        );
    }

    #[test]
    fn tilde_expands_to_home() {
        assert_eq!(expand_home_with("~", home).unwrap(), PathBuf::from("/home/ops"));
        assert_eq!(
            expand_home_with("~/clusters/demo", home).unwrap(),
            PathBuf::from("/home/ops/clusters/demo")
        );
    }

    #[test]
    fn missing_home_is_an_error() {
        assert_eq!(
            expand_home_with("~/clusters", || None),
            Err(PathError::NoHomeDir)
        );
    }

    #[test]
    fn missing_home_is_irrelevant_without_tilde() {
        assert!(expand_home_with("/abs", || None).is_ok());
    }

    #[test]
    fn user_specific_home_is_rejected() {
        assert_eq!(
            expand_home_with("~bob/clusters", home),
            Err(PathError::UserHomeDir("~bob/clusters".to_string()))
        );
    }

    #[test]
    fn asset_directory_layout() {
        let asset_dir = Path::new("/srv/demo");
        assert_eq!(terraform_root_dir(asset_dir), Path::new("/srv/demo/terraform"));
        assert_eq!(
            terraform_modules_dir(asset_dir),
            Path::new("/srv/demo/terraform-modules")
        );
        assert_eq!(
            kubeconfig_path(asset_dir),
            Path::new("/srv/demo/cluster-assets/auth/kubeconfig")
        );
    }

    #[test]
    fn bundle_layout() {
        let assets = Path::new("/usr/share/trellis");
        assert_eq!(
            bundled_modules_dir(assets),
            Path::new("/usr/share/trellis/terraform-modules")
        );
        assert_eq!(
            controlplane_charts_dir(assets),
            Path::new("/usr/share/trellis/charts/control-plane")
        );
    }
}
