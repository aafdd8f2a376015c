//! Background loops: repository refresh and self-update.
//!
//! Both loops share one cancellation token. A tick that already started
//! runs to completion; no tick starts after cancellation. The first tick
//! fires one period after start.

use std::{sync::Arc, time::Duration};

use dv_updater_config::config::AutoUpdateConfig;
use tokio::{
    task::JoinSet,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    error::UpdaterError,
    package_manager::{PackageManager, UpgradeOutcome},
    services::DV_UPDATER,
    UpdaterResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfUpdateStatus {
    UpToDate,
    /// Upgraded; only seen when the process control did not exit.
    Upgraded { from: String, to: String },
    Restarting,
}

/// One self-update check, applying the update when one is pending.
pub async fn self_update(
    manager: &dyn PackageManager,
    config: &AutoUpdateConfig,
) -> UpdaterResult<SelfUpdateStatus> {
    if !config.enabled {
        return Err(UpdaterError::AutoUpdateDisabled);
    }

    let pkg = match manager.check_for_updates(DV_UPDATER).await {
        Ok(pkg) => pkg,
        Err(err) if err.is_nothing_to_update() => {
            debug!("{} is up to date", DV_UPDATER);
            return Ok(SelfUpdateStatus::UpToDate);
        }
        Err(err) => return Err(err),
    };

    if pkg.available_version.is_empty() || pkg.installed_version == pkg.available_version {
        return Ok(SelfUpdateStatus::UpToDate);
    }

    info!(
        "updating {} from {} to {}",
        DV_UPDATER, pkg.installed_version, pkg.available_version
    );
    match manager.upgrade_package(DV_UPDATER).await? {
        UpgradeOutcome::Restarting => Ok(SelfUpdateStatus::Restarting),
        UpgradeOutcome::Upgraded => {
            Ok(SelfUpdateStatus::Upgraded {
                from: pkg.installed_version,
                to: pkg.available_version,
            })
        }
    }
}

pub struct Scheduler {
    manager: Arc<dyn PackageManager>,
    config: AutoUpdateConfig,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        manager: Arc<dyn PackageManager>,
        config: AutoUpdateConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            manager,
            config,
            cancel,
        }
    }

    /// Spawns both loops onto `tasks`.
    pub fn spawn(self, tasks: &mut JoinSet<()>) {
        if !self.config.enabled {
            info!("auto-update is disabled, self-update checks are skipped");
        }

        tasks.spawn(repository_loop(
            self.manager.clone(),
            self.config.repository_interval(),
            self.cancel.clone(),
        ));
        tasks.spawn(self_update_loop(self.manager, self.config, self.cancel));
    }
}

/// Waits for the next tick; `false` once cancelled.
async fn next_tick(ticker: &mut tokio::time::Interval, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = ticker.tick() => true,
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn repository_loop(
    manager: Arc<dyn PackageManager>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = ticker(period);
    while next_tick(&mut ticker, &cancel).await {
        match manager.update_repository(&cancel).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => break,
            Err(err) => error!("repository update failed: {}", err),
        }
    }
    debug!("repository refresh loop stopped");
}

async fn self_update_loop(
    manager: Arc<dyn PackageManager>,
    config: AutoUpdateConfig,
    cancel: CancellationToken,
) {
    let mut ticker = ticker(config.check_interval());
    while next_tick(&mut ticker, &cancel).await {
        match self_update(manager.as_ref(), &config).await {
            Ok(SelfUpdateStatus::UpToDate) => {}
            Ok(status) => info!("self-update finished: {:?}", status),
            Err(UpdaterError::AutoUpdateDisabled) => {}
            Err(err) => error!("self-update failed: {}", err),
        }
    }
    debug!("self-update loop stopped");
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{
        package_manager::AptManager,
        self_update::SelfUpdater,
        test_utils::{
            executable_file, exit, manager_context, manager_context_with, ok,
            RecordingProcessControl, ScriptedRunner,
        },
    };

    const UPGRADABLE: &str =
        "Listing...\ndv-updater/stable 1.3.0 amd64 [upgradable from: 1.2.0]\n";

    fn auto_update(enabled: bool) -> AutoUpdateConfig {
        AutoUpdateConfig {
            enabled,
            ..AutoUpdateConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_update_applies_pending_version() {
        let dir = tempdir().unwrap();
        let binary = executable_file(dir.path(), "dv-updater");
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("apt list --upgradable dv-updater", ok(UPGRADABLE))
                .on("fuser", exit(1, ""))
                .on("apt install", ok("Setting up dv-updater (1.3.0) ...")),
        );
        let control = Arc::new(RecordingProcessControl::default());
        let updater =
            SelfUpdater::new(runner.clone(), &binary, false).with_process_control(control.clone());
        let apt = AptManager::new(manager_context_with(runner.clone(), updater));

        let pkg = apt.check_for_updates("dv-updater").await.unwrap();
        assert_eq!(pkg.installed_version, "1.2.0");
        assert_eq!(pkg.available_version, "1.3.0");
        assert!(pkg.need_for_update);

        let status = self_update(&apt, &auto_update(true)).await.unwrap();

        assert_eq!(status, SelfUpdateStatus::Restarting);
        assert_eq!(control.terminated(), vec![nix::unistd::Pid::this()]);
        assert_eq!(control.exits(), vec![0]);
        assert_eq!(runner.count("apt install"), 1);
    }

    #[tokio::test]
    async fn test_self_update_when_current() {
        let runner = Arc::new(ScriptedRunner::new().on("apt list --upgradable", ok("Listing...\n")));
        let apt = AptManager::new(manager_context(runner.clone()));

        let status = self_update(&apt, &auto_update(true)).await.unwrap();
        assert_eq!(status, SelfUpdateStatus::UpToDate);
        assert_eq!(runner.count("apt install"), 0);
    }

    #[tokio::test]
    async fn test_self_update_disabled() {
        let runner = Arc::new(ScriptedRunner::new());
        let apt = AptManager::new(manager_context(runner.clone()));

        let err = self_update(&apt, &auto_update(false)).await.unwrap_err();
        assert_eq!(err.to_string(), "auto-update is disabled");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repository_loop_survives_failures() {
        let runner = Arc::new(ScriptedRunner::new().on_sequence(
            "apt update",
            vec![exit(100, "E: offline"), ok("")],
        ));
        let apt: Arc<dyn PackageManager> = Arc::new(AptManager::new(manager_context(runner.clone())));
        let cancel = CancellationToken::new();

        let mut tasks = JoinSet::new();
        Scheduler::new(apt, auto_update(false), cancel.clone()).spawn(&mut tasks);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(runner.count("apt update"), 0);

        tokio::time::sleep(Duration::from_secs(122)).await;
        assert_eq!(runner.count("apt update"), 3);

        cancel.cancel();
        while tasks.join_next().await.is_some() {}

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(runner.count("apt update"), 3);
        assert_eq!(runner.count("apt list"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_lets_running_refresh_finish() {
        let runner = Arc::new(ScriptedRunner::new().on_slow(
            "apt update",
            Duration::from_secs(30),
            ok(""),
        ));
        let apt: Arc<dyn PackageManager> = Arc::new(AptManager::new(manager_context(runner.clone())));
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        Scheduler::new(apt, auto_update(false), cancel.clone()).spawn(&mut tasks);

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(runner.count("apt update"), 1);
        assert_eq!(runner.completed("apt update"), 0);

        cancel.cancel();
        while tasks.join_next().await.is_some() {}

        assert_eq!(runner.completed("apt update"), 1);
        assert!(started.elapsed() >= Duration::from_secs(90));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(runner.count("apt update"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_update_loop_checks_periodically() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("apt list --upgradable", ok("Listing...\n"))
                .on("apt update", ok("")),
        );
        let apt: Arc<dyn PackageManager> = Arc::new(AptManager::new(manager_context(runner.clone())));
        let cancel = CancellationToken::new();

        let mut tasks = JoinSet::new();
        Scheduler::new(apt, auto_update(true), cancel.clone()).spawn(&mut tasks);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runner.count("apt list --upgradable dv-updater"), 3);

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }
}
