use dv_updater_config::config::Config;
use dv_updater_core::{
    scheduler::{self, Scheduler},
    services::{Services, SystemInfo},
    UpdaterResult,
};
use dv_updater_distro::{Discovery, LinuxDistro};
use dv_updater_utils::system::is_root;
use tokio::{
    signal::unix::{signal, SignalKind},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::server::{self, ApiState};

pub fn system_info() -> SystemInfo {
    SystemInfo::new(
        env!("CARGO_PKG_VERSION"),
        option_env!("DV_UPDATER_COMMIT").unwrap_or("unknown"),
    )
}

pub fn discover_distro() -> UpdaterResult<LinuxDistro> {
    Ok(Discovery::new("/").discover()?)
}

fn build_services(config: &Config) -> UpdaterResult<Services> {
    let distro = discover_distro()?;
    if !is_root() && !config.package_manager.use_sudo {
        warn!("running without root and without sudo, package operations will likely fail");
    }
    Services::new(&distro, config, system_info())
}

async fn shutdown_signal() -> &'static str {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("unable to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

async fn watch_signals(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        name = shutdown_signal() => {
            info!("received {}, shutting down", name);
            cancel.cancel();
        }
    }
}

/// Runs the agent until SIGINT or SIGTERM.
pub async fn start(config: Config) -> UpdaterResult<()> {
    let services = build_services(&config)?;
    let listener = server::bind(&config.http).await?;

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    tasks.spawn(watch_signals(cancel.clone()));
    Scheduler::new(
        services.package_manager.clone(),
        config.auto_update.clone(),
        cancel.clone(),
    )
    .spawn(&mut tasks);

    info!(
        version = %services.system_info.app_version,
        profile = %config.app.profile,
        "dv-updater started"
    );
    let result = server::serve(listener, ApiState::new(services, &config.http), cancel.clone()).await;

    cancel.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!("background task failed: {}", err);
        }
    }

    result
}

/// One self-update pass. Failures are logged, never returned.
pub async fn self_update(config: &Config) -> UpdaterResult<()> {
    let services = build_services(config)?;

    match scheduler::self_update(services.package_manager.as_ref(), &config.auto_update).await {
        Ok(status) => info!("self-update finished: {:?}", status),
        Err(err) => error!("self update failed: {}", err),
    }
    Ok(())
}
