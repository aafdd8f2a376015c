use std::sync::Arc;

use dv_updater_config::config::Config;
use dv_updater_distro::LinuxDistro;
use dv_updater_utils::command::{CommandRunner, SystemCommandRunner};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::UpdaterError,
    package_manager::{AptManager, Backend, ManagerContext, PackageManager, YumManager},
    self_update::SelfUpdater,
    UpdaterResult,
};

pub const DV_UPDATER: &str = "dv-updater";
pub const DV_MERCHANT: &str = "dv-merchant";
pub const DV_PROCESSING: &str = "dv-processing";

pub const KNOWN_SERVICES: [&str; 3] = [DV_UPDATER, DV_MERCHANT, DV_PROCESSING];

pub fn validate_service_name(name: &str) -> UpdaterResult<()> {
    if KNOWN_SERVICES.contains(&name) {
        Ok(())
    } else {
        Err(UpdaterError::InvalidServiceName(name.to_string()))
    }
}

/// Build metadata reported over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub app_version: String,
    pub app_commit: String,
}

impl SystemInfo {
    pub fn new(app_version: impl Into<String>, app_commit: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
            app_commit: app_commit.into(),
        }
    }
}

#[derive(Clone)]
pub struct Services {
    pub package_manager: Arc<dyn PackageManager>,
    pub system_info: SystemInfo,
}

impl Services {
    /// Selects the package manager for `distro`, running real commands.
    pub fn new(distro: &LinuxDistro, config: &Config, system_info: SystemInfo) -> UpdaterResult<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let use_sudo = config.package_manager.use_sudo;
        let self_updater = SelfUpdater::for_current_executable(runner.clone(), use_sudo)?;
        let ctx = ManagerContext::new(
            runner,
            config.package_manager.clone(),
            Arc::new(self_updater),
        );
        Self::with_context(distro, ctx, system_info)
    }

    pub fn with_context(
        distro: &LinuxDistro,
        ctx: ManagerContext,
        system_info: SystemInfo,
    ) -> UpdaterResult<Self> {
        let backend = Backend::for_distro(&distro.id)
            .ok_or_else(|| UpdaterError::UnsupportedDistro(distro.id.clone()))?;

        let package_manager: Arc<dyn PackageManager> = match backend {
            Backend::Apt => Arc::new(AptManager::new(ctx)),
            Backend::Yum => Arc::new(YumManager::new(ctx)),
        };
        info!(distro = %distro.id, "using {} package manager", backend);

        Ok(Self {
            package_manager,
            system_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use dv_updater_distro::ReleaseDetails;

    use super::*;
    use crate::test_utils::{manager_context, ScriptedRunner};

    fn distro(id: &str) -> LinuxDistro {
        LinuxDistro::new(id, id, "1", ReleaseDetails::default(), ReleaseDetails::default())
    }

    #[test]
    fn test_validate_service_name() {
        assert!(validate_service_name("dv-updater").is_ok());
        assert!(validate_service_name("dv-merchant").is_ok());
        assert!(validate_service_name("dv-processing").is_ok());

        let err = validate_service_name("nginx").unwrap_err();
        assert_eq!(err.to_string(), "invalid service name: nginx");
        assert!(validate_service_name("").is_err());
    }

    #[test]
    fn test_backend_selection() {
        let runner = Arc::new(ScriptedRunner::new());
        let info = SystemInfo::new("1.0.0", "abc123");

        let services =
            Services::with_context(&distro("ubuntu"), manager_context(runner.clone()), info.clone())
                .unwrap();
        assert_eq!(services.package_manager.backend(), Backend::Apt);

        let services =
            Services::with_context(&distro("rhel"), manager_context(runner.clone()), info.clone())
                .unwrap();
        assert_eq!(services.package_manager.backend(), Backend::Yum);

        let err = Services::with_context(&distro("alpine"), manager_context(runner), info)
            .err()
            .unwrap();
        assert!(matches!(err, UpdaterError::UnsupportedDistro(id) if id == "alpine"));
    }

    #[test]
    fn test_system_info_serialization() {
        let info = SystemInfo::new("1.4.2", "9f8e7d6");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["app_version"], "1.4.2");
        assert_eq!(json["app_commit"], "9f8e7d6");
    }
}
