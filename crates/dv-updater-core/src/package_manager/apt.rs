use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    lock::{run_locked, LockProtocol},
    tool_failed, Backend, ManagerContext, Package, PackageManager, UpgradeOutcome,
};
use crate::{error::UpdaterError, UpdaterResult};

/// Debian family backend driving `apt` and `dpkg`.
pub struct AptManager {
    ctx: ManagerContext,
}

impl AptManager {
    pub fn new(ctx: ManagerContext) -> Self {
        Self { ctx }
    }

    async fn list(&self, filter: &str, name: &str) -> UpdaterResult<String> {
        let command = self.ctx.command("apt", ["list", filter, name]);
        let output = self.ctx.run(&command).await?;
        if !output.success() {
            return Err(tool_failed(&command, &output));
        }
        Ok(output.stdout)
    }
}

/// Extracts the versions of `name` from `apt list` output.
///
/// Lines look like `name/suite[,now] VERSION ARCH [STATE]` where the state
/// is one of `installed[,...]`, `upgradable from: X` or
/// `installed,upgradable to: X`. A line without a state only names the
/// candidate version. The first matching line wins.
pub fn parse_apt_list(output: &str, name: &str) -> UpdaterResult<Package> {
    let pattern = format!(
        r"^{}/\S*\s+(\S+)\s+\S+(?:\s+\[([^\]]*)\])?",
        regex::escape(name)
    );
    let re = Regex::new(&pattern).map_err(|_| UpdaterError::PackageNotFound(name.to_string()))?;

    for line in output.lines() {
        let Some(caps) = re.captures(line.trim_end()) else {
            continue;
        };

        let version = caps.get(1).map_or("", |m| m.as_str());
        let state = caps.get(2).map_or("", |m| m.as_str().trim());

        let (installed, available) = if let Some(from) = state.strip_prefix("upgradable from:") {
            (from.trim(), version)
        } else if let Some((_, to)) = state.split_once("upgradable to:") {
            (version, to.trim())
        } else if state.starts_with("installed") {
            (version, "")
        } else {
            ("", version)
        };

        return Package::new(name, installed, available);
    }

    Err(UpdaterError::PackageNotFound(name.to_string()))
}

#[async_trait]
impl PackageManager for AptManager {
    fn backend(&self) -> Backend {
        Backend::Apt
    }

    async fn get_installed_package(&self, name: &str) -> UpdaterResult<Package> {
        let stdout = self.list("--installed", name).await?;
        parse_apt_list(&stdout, name)
    }

    async fn check_for_updates(&self, name: &str) -> UpdaterResult<Package> {
        let stdout = self.list("--upgradable", name).await?;
        match parse_apt_list(&stdout, name) {
            Err(UpdaterError::PackageNotFound(_)) => Err(UpdaterError::NothingToUpdate),
            other => other,
        }
    }

    async fn upgrade_package(&self, name: &str) -> UpdaterResult<UpgradeOutcome> {
        info!(pkg = %name, "upgrading package");

        let command = self.ctx.command(
            "apt",
            [
                "install",
                "-o",
                "Dpkg::Options::=--force-confold",
                "-y",
                "--only-upgrade",
                name,
            ],
        );
        let before = self.ctx.snapshot(self, name).await;
        let result = run_locked(
            self.ctx.runner.clone(),
            LockProtocol::dpkg(self.ctx.settings.use_sudo),
            command,
            name,
            self.ctx.lock_retry(),
        )
        .await;

        self.ctx.conclude_upgrade(self, name, before, result).await
    }

    async fn update_repository(&self, cancel: &CancellationToken) -> UpdaterResult<()> {
        if cancel.is_cancelled() {
            return Err(UpdaterError::Cancelled);
        }
        info!("updating repository");

        let source_list = format!(
            "Dir::Etc::sourcelist={}",
            self.ctx.settings.apt_source_list
        );
        let command = self.ctx.command("apt", ["update", "-o", source_list.as_str()]);
        let output = self.ctx.run(&command).await?;
        if !output.success() {
            return Err(tool_failed(&command, &output));
        }

        info!("package list updated successfully");
        debug!("apt output: {}", output.combined());
        Ok(())
    }
}
