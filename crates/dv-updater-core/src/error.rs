//! Error types for dv-updater-core.

use dv_updater_config::error::ConfigError;
use dv_updater_distro::DistroError;
use dv_updater_retry::RetryError;
use dv_updater_utils::error::{CommandError, FileSystemError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum UpdaterError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Distro(#[from] DistroError),

    #[error("Unsupported distribution: {0}")]
    #[diagnostic(
        code(dv_updater::unsupported_distro),
        help("dv-updater manages packages with apt (Debian family) or yum (Red Hat family)")
    )]
    UnsupportedDistro(String),

    #[error(transparent)]
    #[diagnostic(
        code(dv_updater::command),
        help("Check that the tool is installed and available in PATH")
    )]
    Command(#[from] CommandError),

    #[error(transparent)]
    #[diagnostic(code(dv_updater::filesystem))]
    FileSystem(#[from] FileSystemError),

    #[error("Error while {action}")]
    #[diagnostic(code(dv_updater::io), help("Check file permissions"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} command failed: {status}, output: {output}")]
    #[diagnostic(code(dv_updater::tool_failed))]
    ToolFailed {
        tool: String,
        status: String,
        output: String,
    },

    #[error("package database is locked while updating {0}")]
    #[diagnostic(code(dv_updater::database_locked))]
    DatabaseLocked(String),

    #[error("failed to update package {package}: {tool} error: {tool_error}, {repair} error: {repair_error}")]
    #[diagnostic(
        code(dv_updater::lock_recovery),
        help("The package database may need manual repair")
    )]
    LockRecoveryFailed {
        package: String,
        tool: String,
        tool_error: String,
        repair: String,
        repair_error: String,
    },

    #[error("package {0} not found or no version information in provided output")]
    #[diagnostic(code(dv_updater::package_not_found))]
    PackageNotFound(String),

    #[error("nothing to update")]
    #[diagnostic(code(dv_updater::nothing_to_update), severity(advice))]
    NothingToUpdate,

    #[error("binary {0} is still in use")]
    #[diagnostic(code(dv_updater::binary_busy))]
    BinaryInUse(String),

    #[error("{message}")]
    #[diagnostic(code(dv_updater::retry_exhausted))]
    RetryExhausted {
        message: String,
        #[source]
        last: Option<Box<UpdaterError>>,
    },

    #[error("{0}")]
    #[diagnostic(code(dv_updater::retry))]
    Retry(String),

    #[error("operation cancelled")]
    #[diagnostic(code(dv_updater::cancelled))]
    Cancelled,

    #[error("auto-update is disabled")]
    #[diagnostic(
        code(dv_updater::auto_update_disabled),
        help("Set auto_update.enabled = true or UPDATER_AUTO_UPDATE_ENABLED=true"),
        severity(warning)
    )]
    AutoUpdateDisabled,

    #[error("invalid service name: {0}")]
    #[diagnostic(
        code(dv_updater::invalid_service),
        help("Allowed services: dv-updater, dv-merchant, dv-processing")
    )]
    InvalidServiceName(String),
}

impl UpdaterError {
    pub fn is_nothing_to_update(&self) -> bool {
        matches!(self, Self::NothingToUpdate)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<RetryError<UpdaterError>> for UpdaterError {
    fn from(err: RetryError<UpdaterError>) -> Self {
        match err {
            RetryError::Aborted(cause) => cause,
            RetryError::Cancelled { .. } => Self::Cancelled,
            RetryError::Exhausted { .. } => {
                let message = err.to_string();
                Self::RetryExhausted {
                    message,
                    last: err.into_cause().map(Box::new),
                }
            }
            other => Self::Retry(other.to_string()),
        }
    }
}

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, UpdaterError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, UpdaterError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            UpdaterError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
