//! Lock-aware execution of mutating package manager commands.
//!
//! Before every attempt the package database lock files are checked with
//! `fuser`. A held lock asks the retry engine for another attempt without
//! running the command. When the command itself exits with the backend's
//! lock exit code, the database repair command runs once and, if it
//! succeeds, another attempt is requested.

use std::sync::Arc;

use dv_updater_retry::{Outcome, Retry, RetryConfig};
use dv_updater_utils::command::{CommandOutput, CommandRunner, CommandSpec};
use tracing::{debug, warn};

use super::{exit_status, tool_failed};
use crate::{error::UpdaterError, UpdaterResult};

/// Backend specific lock handling.
#[derive(Debug, Clone)]
pub struct LockProtocol {
    /// Files whose holders block the package database.
    pub lock_files: Vec<String>,
    /// Exit code the tool returns when it could not take the lock.
    pub lock_exit_code: i32,
    /// Repairs the database after an interrupted run.
    pub repair: CommandSpec,
    pub use_sudo: bool,
}

impl LockProtocol {
    pub fn dpkg(use_sudo: bool) -> Self {
        Self {
            lock_files: vec!["/var/lib/dpkg/lock-frontend".to_string()],
            lock_exit_code: 100,
            repair: CommandSpec::new("dpkg")
                .args(["--configure", "-a"])
                .privileged(use_sudo),
            use_sudo,
        }
    }

    pub fn rpm(use_sudo: bool) -> Self {
        Self {
            lock_files: vec!["/var/lib/rpm/.rpm.lock".to_string()],
            lock_exit_code: 200,
            repair: CommandSpec::new("rpm")
                .arg("--rebuilddb")
                .privileged(use_sudo),
            use_sudo,
        }
    }
}

/// Whether any process holds one of the lock files open.
///
/// `fuser` exits 0 and prints the holders when a file is in use. A check
/// that cannot run counts as free.
pub async fn is_held(runner: &dyn CommandRunner, path: &str, use_sudo: bool) -> bool {
    let check = CommandSpec::new("fuser").arg(path).privileged(use_sudo);
    match runner.run(&check).await {
        Ok(output) => output.success() && !output.combined().trim().is_empty(),
        Err(err) => {
            debug!("lock check for {} failed: {}", path, err);
            false
        }
    }
}

async fn attempt(
    runner: &dyn CommandRunner,
    protocol: &LockProtocol,
    command: &CommandSpec,
    package: &str,
) -> Outcome<CommandOutput, UpdaterError> {
    for path in &protocol.lock_files {
        if is_held(runner, path, protocol.use_sudo).await {
            warn!(pkg = %package, "package database lock {} is held, retrying", path);
            return Outcome::Retry(Some(UpdaterError::DatabaseLocked(package.to_string())));
        }
    }

    let output = match runner.run(command).await {
        Ok(output) => output,
        Err(err) => return Outcome::Abort(err.into()),
    };

    if output.success() {
        debug!(pkg = %package, "{} succeeded", command);
        return Outcome::Success(output);
    }

    if !output.exited_with(protocol.lock_exit_code) {
        return Outcome::Abort(tool_failed(command, &output));
    }

    warn!(pkg = %package, "lock contention reported by {}, running {}", command, protocol.repair);
    let tool_error = format!("{}, output: {}", exit_status(&output), output.combined());
    let repair_error = match runner.run(&protocol.repair).await {
        Ok(repaired) if repaired.success() => {
            debug!(pkg = %package, "{} completed: {}", protocol.repair, repaired.combined());
            return Outcome::Retry(Some(UpdaterError::DatabaseLocked(package.to_string())));
        }
        Ok(repaired) => format!("{}, output: {}", exit_status(&repaired), repaired.combined()),
        Err(err) => err.to_string(),
    };

    Outcome::Abort(UpdaterError::LockRecoveryFailed {
        package: package.to_string(),
        tool: command.program_name().to_string(),
        tool_error,
        repair: protocol.repair.program_name().to_string(),
        repair_error,
    })
}

/// Runs `command` under the lock protocol with a linear retry.
pub async fn run_locked(
    runner: Arc<dyn CommandRunner>,
    protocol: LockProtocol,
    command: CommandSpec,
    package: &str,
    retry: RetryConfig,
) -> UpdaterResult<CommandOutput> {
    let package = package.to_string();
    let protocol = Arc::new(protocol);
    let command = Arc::new(command);

    Retry::new(retry)
        .run(move || {
            let runner = runner.clone();
            let protocol = protocol.clone();
            let command = command.clone();
            let package = package.clone();
            async move { attempt(runner.as_ref(), &protocol, &command, &package).await }
        })
        .await
        .map_err(UpdaterError::from)
}
