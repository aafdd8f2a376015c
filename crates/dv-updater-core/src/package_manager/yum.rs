use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    lock::{run_locked, LockProtocol},
    tool_failed, Backend, ManagerContext, Package, PackageManager, UpgradeOutcome,
};
use crate::{error::UpdaterError, UpdaterResult};

/// Red Hat family backend driving `yum` (or its `dnf` alias) and `rpm`.
pub struct YumManager {
    ctx: ManagerContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Installed,
    Available,
    Other,
}

fn section_header(line: &str) -> Option<Section> {
    match line {
        "Installed Packages" => Some(Section::Installed),
        "Available Packages" | "Available Upgrades" | "Updated Packages" | "Upgraded Packages" => {
            Some(Section::Available)
        }
        _ if line.ends_with(" Packages") => Some(Section::Other),
        _ => None,
    }
}

/// Extracts the versions of `name` from `yum list` output.
///
/// Entries are `name.arch VERSION REPO` below an `Installed Packages` or
/// `Available Packages` header. Long names make yum wrap the entry onto a
/// second line, which is joined back. Entries outside a known section are
/// ignored.
pub fn parse_yum_list(output: &str, name: &str) -> UpdaterResult<Package> {
    let mut section = None;
    let mut pending: Option<String> = None;
    let mut installed = String::new();
    let mut available = String::new();

    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = section_header(line) {
            section = Some(header);
            pending = None;
            continue;
        }

        let joined = match pending.take() {
            Some(head) => format!("{head} {line}"),
            None => line.to_string(),
        };
        let fields: Vec<&str> = joined.split_whitespace().collect();

        if fields.len() < 2 {
            if joined.contains('.') {
                pending = Some(joined);
            }
            continue;
        }

        let package = fields[0].split('.').next().unwrap_or_default();
        if package != name {
            continue;
        }

        let version = fields[1].to_string();
        match section {
            Some(Section::Installed) => installed = version,
            Some(Section::Available) => available = version,
            Some(Section::Other) | None => {}
        }
    }

    Package::new(name, installed, available)
}

impl YumManager {
    pub fn new(ctx: ManagerContext) -> Self {
        Self { ctx }
    }

    fn repo_flag(&self) -> String {
        format!("--repo={}", self.ctx.settings.repository)
    }
}

#[async_trait]
impl PackageManager for YumManager {
    fn backend(&self) -> Backend {
        Backend::Yum
    }

    async fn get_installed_package(&self, name: &str) -> UpdaterResult<Package> {
        let command = self.ctx.command("yum", ["list", "installed", name]);
        let output = self.ctx.run(&command).await?;
        if !output.success() {
            return Err(tool_failed(&command, &output));
        }
        parse_yum_list(&output.stdout, name)
    }

    async fn check_for_updates(&self, name: &str) -> UpdaterResult<Package> {
        let repo = self.repo_flag();
        let command = self
            .ctx
            .command("yum", [repo.as_str(), "list", "--refresh", name]);
        let output = self.ctx.run(&command).await?;

        if output.exited_with(1) && output.combined().contains("No matching Packages") {
            return Err(UpdaterError::NothingToUpdate);
        }
        if !output.success() {
            return Err(tool_failed(&command, &output));
        }

        let pkg = match parse_yum_list(&output.stdout, name) {
            Err(UpdaterError::PackageNotFound(_)) => return Err(UpdaterError::NothingToUpdate),
            other => other?,
        };
        if pkg.available_version.is_empty() {
            return Err(UpdaterError::NothingToUpdate);
        }
        Ok(pkg)
    }

    async fn upgrade_package(&self, name: &str) -> UpdaterResult<UpgradeOutcome> {
        info!(pkg = %name, "upgrading package");

        let repo = self.repo_flag();
        let command = self
            .ctx
            .command("yum", [repo.as_str(), "update", "-y", name]);
        let before = self.ctx.snapshot(self, name).await;
        let result = run_locked(
            self.ctx.runner.clone(),
            LockProtocol::rpm(self.ctx.settings.use_sudo),
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

        let repo = self.repo_flag();
        let command = self
            .ctx
            .command("yum", [repo.as_str(), "list", "available", "--refresh"]);
        let output = self.ctx.run(&command).await?;
        if !output.success() {
            return Err(tool_failed(&command, &output));
        }

        info!("package list updated successfully");
        debug!("yum output: {}", output.combined());
        Ok(())
    }
}
