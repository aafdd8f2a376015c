//! Native package manager backends behind one capability interface.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use dv_updater_config::config::PackageManagerConfig;
use dv_updater_retry::RetryConfig;
use dv_updater_utils::command::{CommandOutput, CommandRunner, CommandSpec};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::UpdaterError,
    self_update::SelfUpdater,
    UpdaterResult,
};

pub mod apt;
pub mod lock;
pub mod yum;

pub use apt::AptManager;
pub use yum::YumManager;

/// Update state of one package.
///
/// Versions are empty strings when unknown; at least one is always known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub installed_version: String,
    pub available_version: String,
    pub need_for_update: bool,
}

impl Package {
    pub fn new(
        name: impl Into<String>,
        installed_version: impl Into<String>,
        available_version: impl Into<String>,
    ) -> UpdaterResult<Self> {
        let name = name.into();
        let installed_version = installed_version.into();
        let available_version = available_version.into();

        if installed_version.is_empty() && available_version.is_empty() {
            return Err(UpdaterError::PackageNotFound(name));
        }

        let need_for_update = !installed_version.is_empty()
            && !available_version.is_empty()
            && installed_version != available_version;

        Ok(Self {
            name,
            installed_version,
            available_version,
            need_for_update,
        })
    }
}

/// How a successful upgrade ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Upgraded,
    /// The agent upgraded itself and handed over to its supervisor.
    Restarting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Apt,
    Yum,
}

impl Backend {
    /// Backend for a discovered distribution id.
    pub fn for_distro(id: &str) -> Option<Self> {
        match id {
            "debian" | "ubuntu" | "linuxmint" | "kali" => Some(Self::Apt),
            "centos" | "rhel" | "ol" | "amzn" | "fedora" | "scientific" => Some(Self::Yum),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Apt => f.write_str("apt"),
            Backend::Yum => f.write_str("yum"),
        }
    }
}

#[async_trait]
pub trait PackageManager: Send + Sync {
    fn backend(&self) -> Backend;

    async fn get_installed_package(&self, name: &str) -> UpdaterResult<Package>;

    /// Fails with [`UpdaterError::NothingToUpdate`] when the tool lists no
    /// candidate update for `name`.
    async fn check_for_updates(&self, name: &str) -> UpdaterResult<Package>;

    async fn upgrade_package(&self, name: &str) -> UpdaterResult<UpgradeOutcome>;

    /// Fails with [`UpdaterError::Cancelled`] without running anything once
    /// `cancel` fired. A refresh that already started runs to completion.
    async fn update_repository(&self, cancel: &CancellationToken) -> UpdaterResult<()>;
}

/// State shared by the backends.
#[derive(Clone)]
pub struct ManagerContext {
    pub runner: Arc<dyn CommandRunner>,
    pub settings: PackageManagerConfig,
    pub self_updater: Arc<SelfUpdater>,
    pub own_package: String,
}

impl ManagerContext {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        settings: PackageManagerConfig,
        self_updater: Arc<SelfUpdater>,
    ) -> Self {
        Self {
            runner,
            settings,
            self_updater,
            own_package: crate::services::DV_UPDATER.to_string(),
        }
    }

    pub(crate) fn command<I, S>(&self, tool: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(tool)
            .args(args)
            .privileged(self.settings.use_sudo)
    }

    pub(crate) async fn run(&self, command: &CommandSpec) -> UpdaterResult<CommandOutput> {
        Ok(self.runner.run(command).await?)
    }

    pub(crate) fn lock_retry(&self) -> RetryConfig {
        RetryConfig::linear(
            self.settings.lock_retry_attempts,
            self.settings.lock_retry_delay(),
        )
    }

    pub(crate) fn is_own_package(&self, name: &str) -> bool {
        name == self.own_package
    }

    /// Installed state of the agent's own package before an upgrade, used
    /// to tell whether a failed attempt still replaced the binary.
    pub(crate) async fn snapshot(
        &self,
        manager: &dyn PackageManager,
        name: &str,
    ) -> Option<Package> {
        if !self.is_own_package(name) {
            return None;
        }
        match manager.get_installed_package(name).await {
            Ok(pkg) => Some(pkg),
            Err(err) => {
                debug!(pkg = %name, "installed version unknown before upgrade: {}", err);
                None
            }
        }
    }

    /// Turns the result of the upgrade command into the upgrade outcome.
    ///
    /// A failed command only counts as success when the package is
    /// verifiably installed and current afterwards. The agent's own package
    /// is handed to the self-updater after a failed command only when its
    /// installed version differs from `before`.
    pub(crate) async fn conclude_upgrade(
        &self,
        manager: &dyn PackageManager,
        name: &str,
        before: Option<Package>,
        result: UpdaterResult<CommandOutput>,
    ) -> UpdaterResult<UpgradeOutcome> {
        let err = match result {
            Ok(output) => {
                debug!(pkg = %name, "{} output: {}", manager.backend(), output.combined());
                info!(pkg = %name, "package updated successfully");
                return self.hand_over(name).await;
            }
            Err(err) => err,
        };

        let Some(current) = settle_failed_upgrade(manager, name, &err).await else {
            return Err(err);
        };

        if !self.is_own_package(name) {
            return Ok(UpgradeOutcome::Upgraded);
        }

        match before {
            Some(before) if before.installed_version != current.installed_version => {
                info!(
                    pkg = %name,
                    "installed version changed from {} to {}",
                    before.installed_version,
                    current.installed_version
                );
                self.hand_over(name).await
            }
            _ => {
                error!(pkg = %name, "installed version did not change, keeping the running process");
                Err(err)
            }
        }
    }

    async fn hand_over(&self, name: &str) -> UpdaterResult<UpgradeOutcome> {
        if !self.is_own_package(name) {
            return Ok(UpgradeOutcome::Upgraded);
        }

        self.self_updater.run().await?;
        Ok(UpgradeOutcome::Restarting)
    }
}

/// Checks a package again after its upgrade command failed.
///
/// Returns the installed package only when it is installed and no update
/// is pending any more; `None` means the failure stands.
pub(crate) async fn settle_failed_upgrade(
    manager: &dyn PackageManager,
    name: &str,
    err: &UpdaterError,
) -> Option<Package> {
    warn!(pkg = %name, "upgrade failed: {}", err);

    let installed = match manager.get_installed_package(name).await {
        Ok(pkg) => pkg,
        Err(check) => {
            error!(pkg = %name, "package is not installed: {}", check);
            return None;
        }
    };

    match manager.check_for_updates(name).await {
        Ok(pkg) if !pkg.need_for_update => {}
        Err(check) if check.is_nothing_to_update() => {}
        Ok(_) => {
            error!(pkg = %name, "package still needs an update");
            return None;
        }
        Err(check) => {
            error!(pkg = %name, "unable to re-check package: {}", check);
            return None;
        }
    }

    info!(
        pkg = %name,
        "package is current at {} despite the failure",
        installed.installed_version
    );
    Some(installed)
}

pub(crate) fn tool_failed(command: &CommandSpec, output: &CommandOutput) -> UpdaterError {
    UpdaterError::ToolFailed {
        tool: command.program_name().to_string(),
        status: exit_status(output),
        output: output.combined(),
    }
}

pub(crate) fn exit_status(output: &CommandOutput) -> String {
    match output.status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}
