//! Error types for Trellis
//!
//! Every variant names the orchestration step that failed and keeps the
//! collaborator's error as its `source`. Nothing in the workspace recovers
//! from these locally: they propagate to the binary, which reports them and
//! exits with [`Error::exit_code`]. Re-running the command is the recovery
//! path, since bootstrap and control-plane convergence are idempotent.

use std::fmt;

use thiserror::Error;

use crate::context::DiagnosticContext;

/// Boxed error used as the `source` of every step failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for Trellis operations
#[derive(Debug, Error)]
pub enum Error {
    /// Cluster configuration could not be read or decoded
    #[error("invalid cluster configuration: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// The platform asset directory could not be expanded
    #[error("error expanding path {path}: {source}")]
    PathResolution {
        /// The path as written in the configuration
        path: String,
        /// Underlying cause
        source: BoxError,
    },

    /// Backend settings failed validation
    #[error("failed to validate {backend} backend configuration: {source}")]
    BackendConfig {
        /// Backend kind (local, s3)
        backend: String,
        /// Underlying cause
        source: BoxError,
    },

    /// Backend configuration could not be rendered
    #[error("failed to render {backend} backend configuration: {source}")]
    Render {
        /// Backend kind (local, s3)
        backend: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The Terraform working directory could not be configured
    #[error("failed to configure terraform in {dir}: {source}")]
    Configure {
        /// Asset directory being configured
        dir: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The infrastructure executor could not be created
    #[error("failed to create terraform executor for {dir}: {source}")]
    ExecutorCreation {
        /// Working directory the executor was bound to
        dir: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The platform initialization hook failed
    #[error("failed to initialize platform {platform}: {source}")]
    PlatformInit {
        /// Platform name
        platform: String,
        /// Underlying cause
        source: BoxError,
    },

    /// `terraform init` failed
    #[error("failed to initialize terraform: {source}")]
    InfraInit {
        /// Underlying cause
        source: BoxError,
    },

    /// The output store could not be queried to detect an existing cluster
    #[error("failed to check if cluster exists: {source}")]
    ExistenceQuery {
        /// Underlying cause
        source: BoxError,
    },

    /// `terraform apply` failed or reported failed resources
    #[error("failed to apply infrastructure: {source}")]
    Apply {
        /// Underlying cause
        source: BoxError,
    },

    /// `terraform destroy` failed
    #[error("failed to destroy infrastructure: {source}")]
    Destroy {
        /// Underlying cause
        source: BoxError,
    },

    /// Cluster credentials could not be read
    #[error("failed to read cluster credentials from {path}: {source}")]
    Credentials {
        /// Where the credentials were expected
        path: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The deployment engine could not be initialized for a namespace
    #[error("failed initializing helm for {component} in {namespace}: {source}")]
    EngineInit {
        /// Control-plane component name
        component: String,
        /// Target namespace
        namespace: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The component chart could not be loaded from assets
    #[error("loading chart for {component} from assets failed: {source}")]
    ChartLoad {
        /// Control-plane component name
        component: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The component chart failed structural validation
    #[error("chart for {component} is invalid: {source}")]
    ChartInvalid {
        /// Control-plane component name
        component: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The component values output could not be read
    #[error("failed to get values for {component} from terraform: {source}")]
    ValuesFetch {
        /// Control-plane component name
        component: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The component values output is not a well-formed mapping
    #[error("failed to parse values for {component}: {source}")]
    ValuesParse {
        /// Control-plane component name
        component: String,
        /// Underlying cause
        source: BoxError,
    },

    /// Release presence could not be determined
    #[error("failed checking if {component} is installed in {namespace}: {source}")]
    ReleaseQuery {
        /// Control-plane component name
        component: String,
        /// Target namespace
        namespace: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The atomic install failed and was rolled back
    #[error("installing {component} in {namespace} failed: {source}")]
    Install {
        /// Control-plane component name
        component: String,
        /// Target namespace
        namespace: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The atomic upgrade failed and was rolled back
    #[error("updating {component} in {namespace} failed: {source}")]
    Upgrade {
        /// Control-plane component name
        component: String,
        /// Target namespace
        namespace: String,
        /// Underlying cause
        source: BoxError,
    },

    /// The user declined to proceed
    #[error("aborted: {0}")]
    Aborted(String),

    /// An error enriched with the diagnostic context it was raised under
    #[error("{source} [{context}]")]
    Contextual {
        /// Fields describing the operation in progress
        context: DiagnosticContext,
        /// The wrapped step failure
        source: Box<Error>,
    },
}

/// Orchestration step an [`Error`] originated from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Configuration loading or decoding
    Config,
    /// Asset directory expansion
    PathResolution,
    /// Backend validation
    BackendConfig,
    /// Backend rendering
    Render,
    /// Working directory configuration
    Configure,
    /// Executor construction
    ExecutorCreation,
    /// Platform initialization hook
    PlatformInit,
    /// `terraform init`
    InfraInit,
    /// Existence detection
    ExistenceQuery,
    /// `terraform apply`
    Apply,
    /// `terraform destroy`
    Destroy,
    /// Reading the kubeconfig
    Credentials,
    /// Helm action context creation
    EngineInit,
    /// Chart loading
    ChartLoad,
    /// Chart validation
    ChartInvalid,
    /// Values output lookup
    ValuesFetch,
    /// Values parsing
    ValuesParse,
    /// Release lookup
    ReleaseQuery,
    /// Atomic install
    Install,
    /// Atomic upgrade
    Upgrade,
    /// Declined confirmation
    Aborted,
}

impl ErrorKind {
    /// Name of the step failure as reported to users
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "ConfigError",
            Self::PathResolution => "PathResolutionError",
            Self::BackendConfig => "BackendConfigError",
            Self::Render => "RenderError",
            Self::Configure => "ConfigureError",
            Self::ExecutorCreation => "ExecutorCreationError",
            Self::PlatformInit => "PlatformInitError",
            Self::InfraInit => "InfraInitError",
            Self::ExistenceQuery => "ExistenceQueryError",
            Self::Apply => "ApplyError",
            Self::Destroy => "DestroyError",
            Self::Credentials => "CredentialsError",
            Self::EngineInit => "EngineInitError",
            Self::ChartLoad => "ChartLoadError",
            Self::ChartInvalid => "ChartInvalidError",
            Self::ValuesFetch => "ValuesFetchError",
            Self::ValuesParse => "ValuesParseError",
            Self::ReleaseQuery => "ReleaseQueryError",
            Self::Install => "InstallError",
            Self::Upgrade => "UpgradeError",
            Self::Aborted => "Aborted",
        }
    }

    /// Process exit status for a failure of this kind
    ///
    /// - 1: aborted by the user
    /// - 2: configuration
    /// - 3: infrastructure bootstrap
    /// - 4: infrastructure state query, apply, or destroy
    /// - 5: control-plane convergence
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Aborted => 1,
            Self::Config => 2,
            Self::PathResolution
            | Self::BackendConfig
            | Self::Render
            | Self::Configure
            | Self::ExecutorCreation
            | Self::PlatformInit
            | Self::InfraInit => 3,
            Self::ExistenceQuery | Self::Apply | Self::Destroy => 4,
            Self::Credentials
            | Self::EngineInit
            | Self::ChartLoad
            | Self::ChartInvalid
            | Self::ValuesFetch
            | Self::ValuesParse
            | Self::ReleaseQuery
            | Self::Install
            | Self::Upgrade => 5,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an error for a declined confirmation
    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::Aborted(msg.into())
    }

    /// Attach the diagnostic context the error was raised under
    ///
    /// An error that already carries a context keeps it: the innermost
    /// context is the most specific one.
    pub fn with_context(self, context: &DiagnosticContext) -> Self {
        match self {
            Self::Contextual { .. } => self,
            other => Self::Contextual {
                context: context.clone(),
                source: Box::new(other),
            },
        }
    }

    /// The step failure, with any diagnostic context layer removed
    pub fn step(&self) -> &Error {
        match self {
            Self::Contextual { source, .. } => source.step(),
            other => other,
        }
    }

    /// Diagnostic context attached to this error, if any
    pub fn context(&self) -> Option<&DiagnosticContext> {
        match self {
            Self::Contextual { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Orchestration step this error originated from
    pub fn kind(&self) -> ErrorKind {
        match self.step() {
            Self::Config { .. } => ErrorKind::Config,
            Self::PathResolution { .. } => ErrorKind::PathResolution,
            Self::BackendConfig { .. } => ErrorKind::BackendConfig,
            Self::Render { .. } => ErrorKind::Render,
            Self::Configure { .. } => ErrorKind::Configure,
            Self::ExecutorCreation { .. } => ErrorKind::ExecutorCreation,
            Self::PlatformInit { .. } => ErrorKind::PlatformInit,
            Self::InfraInit { .. } => ErrorKind::InfraInit,
            Self::ExistenceQuery { .. } => ErrorKind::ExistenceQuery,
            Self::Apply { .. } => ErrorKind::Apply,
            Self::Destroy { .. } => ErrorKind::Destroy,
            Self::Credentials { .. } => ErrorKind::Credentials,
            Self::EngineInit { .. } => ErrorKind::EngineInit,
            Self::ChartLoad { .. } => ErrorKind::ChartLoad,
            Self::ChartInvalid { .. } => ErrorKind::ChartInvalid,
            Self::ValuesFetch { .. } => ErrorKind::ValuesFetch,
            Self::ValuesParse { .. } => ErrorKind::ValuesParse,
            Self::ReleaseQuery { .. } => ErrorKind::ReleaseQuery,
            Self::Install { .. } => ErrorKind::Install,
            Self::Upgrade { .. } => ErrorKind::Upgrade,
            Self::Aborted(_) => ErrorKind::Aborted,
            Self::Contextual { .. } => unreachable!("step() strips contextual layers"),
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }

    /// Deepest error in the source chain
    pub fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        let mut current: &(dyn std::error::Error + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("bucket is required")]
    struct MissingBucket;

    // ==========================================================================
    // Story: step failures carry their origin
    // ==========================================================================

    #[test]
    fn backend_validation_failures_name_the_backend_and_cause() {
        let err = Error::BackendConfig {
            backend: "s3".to_string(),
            source: Box::new(MissingBucket),
        };

        assert_eq!(err.kind(), ErrorKind::BackendConfig);
        assert!(err.to_string().contains("s3 backend"));
        assert!(err.to_string().contains("bucket is required"));
    }

    #[test]
    fn root_cause_walks_to_the_collaborator_error() {
        let err = Error::Install {
            component: "kube-apiserver".to_string(),
            namespace: "kube-system".to_string(),
            source: Box::new(MissingBucket),
        }
        .with_context(&DiagnosticContext::new().with("component", "kube-apiserver"));

        assert_eq!(err.root_cause().to_string(), "bucket is required");
    }

    // ==========================================================================
    // Story: diagnostic context enriches errors without hiding the step
    // ==========================================================================

    #[test]
    fn contextual_errors_report_the_wrapped_step() {
        let ctx = DiagnosticContext::new()
            .with("action", "controlplane-upgrade")
            .with("component", "calico");
        let err = Error::ValuesParse {
            component: "calico".to_string(),
            source: "expected a mapping".into(),
        }
        .with_context(&ctx);

        assert_eq!(err.kind(), ErrorKind::ValuesParse);
        assert_eq!(err.context(), Some(&ctx));
        assert!(err
            .to_string()
            .contains("action=controlplane-upgrade component=calico"));
        assert!(matches!(err.step(), Error::ValuesParse { .. }));
    }

    #[test]
    fn innermost_context_wins_when_wrapped_twice() {
        let inner = DiagnosticContext::new().with("component", "kubelet");
        let outer = DiagnosticContext::new().with("action", "cluster-apply");

        let err = Error::config("bad")
            .with_context(&inner)
            .with_context(&outer);

        assert_eq!(err.context(), Some(&inner));
    }

    // ==========================================================================
    // Story: exit status reflects the failing phase
    // ==========================================================================

    #[test]
    fn exit_codes_group_failures_by_phase() {
        assert_eq!(Error::aborted("no").exit_code(), 1);
        assert_eq!(Error::config("bad").exit_code(), 2);
        assert_eq!(
            Error::InfraInit {
                source: "plugin download failed".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            Error::ExistenceQuery {
                source: "state locked".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(
            Error::Upgrade {
                component: "c".into(),
                namespace: "n".into(),
                source: "timeout".into()
            }
            .exit_code(),
            5
        );
    }

    #[test]
    fn kind_names_match_the_failure_taxonomy() {
        assert_eq!(ErrorKind::PathResolution.to_string(), "PathResolutionError");
        assert_eq!(ErrorKind::ValuesParse.to_string(), "ValuesParseError");
        assert_eq!(ErrorKind::Upgrade.to_string(), "UpgradeError");
    }
}
