//! Hand-over from the running agent to its freshly installed binary.
//!
//! Once the agent's own package is upgraded, [`SelfUpdater::prepare`] waits
//! for the new binary to be released by the package manager and returns a
//! [`Termination`]. Executing it signals the current process and exits, so
//! the service supervisor starts the new version.

use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use dv_updater_retry::{Outcome, Retry, RetryConfig};
use dv_updater_utils::{
    command::CommandRunner,
    fs::{current_executable, ensure_executable_file},
};
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use tracing::{debug, error, info};

use crate::{error::UpdaterError, package_manager::lock::is_held, UpdaterResult};

/// Signals and exits the process. Tests substitute a recorder.
pub trait ProcessControl: Send + Sync {
    fn terminate(&self, pid: Pid) -> nix::Result<()>;

    fn exit(&self, code: i32);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessControl;

impl ProcessControl for SystemProcessControl {
    fn terminate(&self, pid: Pid) -> nix::Result<()> {
        kill(pid, Signal::SIGTERM)
    }

    fn exit(&self, code: i32) {
        std::process::exit(code)
    }
}

/// The decided end of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub pid: Pid,
    pub grace: Duration,
}

impl Termination {
    pub async fn execute(self, control: &dyn ProcessControl) {
        info!("restarting through the service supervisor");
        if let Err(err) = control.terminate(self.pid) {
            error!("failed to send SIGTERM to {}: {}", self.pid, err);
        }

        info!("process terminating");
        tokio::time::sleep(self.grace).await;
        control.exit(0);
    }
}

pub struct SelfUpdater {
    runner: Arc<dyn CommandRunner>,
    binary: PathBuf,
    use_sudo: bool,
    wait: RetryConfig,
    grace: Duration,
    process: Arc<dyn ProcessControl>,
}

impl SelfUpdater {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<PathBuf>, use_sudo: bool) -> Self {
        Self {
            runner,
            binary: binary.into(),
            use_sudo,
            wait: RetryConfig::linear(5, Duration::from_secs(2)),
            grace: Duration::from_secs(3),
            process: Arc::new(SystemProcessControl),
        }
    }

    /// Updater for the binary this process was started from.
    pub fn for_current_executable(
        runner: Arc<dyn CommandRunner>,
        use_sudo: bool,
    ) -> UpdaterResult<Self> {
        let binary = current_executable()?;
        debug!("executable path: {}", binary.display());
        Ok(Self::new(runner, binary, use_sudo))
    }

    pub fn with_process_control(mut self, process: Arc<dyn ProcessControl>) -> Self {
        self.process = process;
        self
    }

    /// Validates the binary and waits until no process holds it open.
    pub async fn prepare(&self) -> UpdaterResult<Termination> {
        debug!("checking whether {} is in use", self.binary.display());
        let binary = ensure_executable_file(&self.binary)?;
        let path = binary.to_string_lossy().into_owned();

        let runner = self.runner.clone();
        let use_sudo = self.use_sudo;
        Retry::new(self.wait.clone())
            .run(move || {
                let runner = runner.clone();
                let path = path.clone();
                async move {
                    if is_held(runner.as_ref(), &path, use_sudo).await {
                        debug!("binary {} is busy, retrying", path);
                        Outcome::Retry(Some(UpdaterError::BinaryInUse(path)))
                    } else {
                        Outcome::Success(())
                    }
                }
            })
            .await?;

        Ok(Termination {
            pid: Pid::this(),
            grace: self.grace,
        })
    }

    /// Prepares and executes the termination. Only returns on failure, or
    /// when the process control does not really exit.
    pub async fn run(&self) -> UpdaterResult<()> {
        let termination = self.prepare().await?;
        termination.execute(self.process.as_ref()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::test_utils::{executable_file, exit, RecordingProcessControl, ScriptedRunner};

    #[tokio::test(start_paused = true)]
    async fn test_prepare_waits_for_binary() {
        let dir = tempdir().unwrap();
        let binary = executable_file(dir.path(), "dv-updater");
        let runner = Arc::new(ScriptedRunner::new().on_sequence(
            "fuser",
            vec![exit(0, " 1200"), exit(0, " 1200"), exit(1, "")],
        ));

        let updater = SelfUpdater::new(runner.clone(), &binary, false);
        let termination = updater.prepare().await.unwrap();

        assert_eq!(termination.pid, Pid::this());
        assert_eq!(termination.grace, Duration::from_secs(3));
        assert_eq!(runner.count("fuser"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_gives_up_while_binary_busy() {
        let dir = tempdir().unwrap();
        let binary = executable_file(dir.path(), "dv-updater");
        let runner = Arc::new(ScriptedRunner::new().on("fuser", exit(0, " 1200")));

        let err = SelfUpdater::new(runner.clone(), &binary, false)
            .prepare()
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "linear retry failed after 5 attempts");
        assert_eq!(runner.count("fuser"), 5);
    }

    #[tokio::test]
    async fn test_prepare_rejects_non_executable() {
        let dir = tempdir().unwrap();
        let binary = dir.path().join("dv-updater");
        fs::write(&binary, b"data").unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        let err = SelfUpdater::new(runner.clone(), &binary, false)
            .prepare()
            .await
            .unwrap_err();

        assert!(matches!(err, UpdaterError::FileSystem(_)));
        assert_eq!(runner.count("fuser"), 0);

        let err = SelfUpdater::new(runner, dir.path(), false)
            .prepare()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not a regular file"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_termination_sequence() {
        let control = RecordingProcessControl::default();
        let termination = Termination {
            pid: Pid::from_raw(4242),
            grace: Duration::from_secs(3),
        };

        let start = tokio::time::Instant::now();
        termination.execute(&control).await;

        assert_eq!(control.terminated(), vec![Pid::from_raw(4242)]);
        assert_eq!(control.exits(), vec![0]);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_termination_continues_when_signal_fails() {
        let control = RecordingProcessControl::failing();
        Termination {
            pid: Pid::from_raw(4242),
            grace: Duration::from_secs(3),
        }
        .execute(&control)
        .await;

        assert_eq!(control.exits(), vec![0]);
    }
}
