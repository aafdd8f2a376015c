//! Test doubles for the command and process seams.

use std::{
    collections::VecDeque,
    fs,
    io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use dv_updater_config::config::PackageManagerConfig;
use dv_updater_utils::{
    command::{CommandOutput, CommandRunner, CommandSpec},
    error::{CommandError, CommandResult},
};
use nix::unistd::Pid;

use crate::{
    package_manager::ManagerContext,
    self_update::{ProcessControl, SelfUpdater},
};

enum Reply {
    Always(CommandOutput),
    /// Replayed in order, the last entry repeats.
    Sequence(VecDeque<CommandOutput>),
    SpawnFailure,
}

struct Rule {
    pattern: String,
    reply: Reply,
    delay: Duration,
}

/// Answers commands from canned outputs and records every invocation.
///
/// Rules match when the rendered command line contains their pattern; the
/// first matching rule answers. Unmatched commands fail to spawn.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(self, pattern: &str, reply: Reply, delay: Duration) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            reply,
            delay,
        });
        self
    }

    pub fn on(self, pattern: &str, output: CommandOutput) -> Self {
        self.rule(pattern, Reply::Always(output), Duration::ZERO)
    }

    /// Like [`Self::on`], but the command takes `delay` to finish.
    pub fn on_slow(self, pattern: &str, delay: Duration, output: CommandOutput) -> Self {
        self.rule(pattern, Reply::Always(output), delay)
    }

    pub fn on_sequence(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rule(pattern, Reply::Sequence(outputs.into()), Duration::ZERO)
    }

    pub fn fail_on(self, pattern: &str) -> Self {
        self.rule(pattern, Reply::SpawnFailure, Duration::ZERO)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        count_matching(&self.calls.lock().unwrap(), pattern)
    }

    /// Number of matching commands that ran to completion.
    pub fn completed(&self, pattern: &str) -> usize {
        count_matching(&self.completed.lock().unwrap(), pattern)
    }
}

fn count_matching(lines: &[String], pattern: &str) -> usize {
    lines.iter().filter(|line| line.contains(pattern)).count()
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> CommandResult<CommandOutput> {
        let line = command.to_string();
        self.calls.lock().unwrap().push(line.clone());

        let spawn_failure = || {
            CommandError::Spawn {
                command: line.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no scripted reply"),
            }
        };

        let (reply, delay) = {
            let mut rules = self.rules.lock().unwrap();
            let Some(rule) = rules.iter_mut().find(|rule| line.contains(&rule.pattern)) else {
                return Err(spawn_failure());
            };

            let reply = match &mut rule.reply {
                Reply::Always(output) => Some(output.clone()),
                Reply::Sequence(outputs) if outputs.len() > 1 => {
                    Some(outputs.pop_front().unwrap_or_default())
                }
                Reply::Sequence(outputs) => Some(outputs.front().cloned().unwrap_or_default()),
                Reply::SpawnFailure => None,
            };
            (reply, rule.delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.completed.lock().unwrap().push(line.clone());
        reply.ok_or_else(spawn_failure)
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    exit(0, stdout)
}

pub fn exit(code: i32, stdout: &str) -> CommandOutput {
    CommandOutput {
        status: Some(code),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// Records termination requests instead of acting on them.
#[derive(Default)]
pub struct RecordingProcessControl {
    terminated: Mutex<Vec<Pid>>,
    exits: Mutex<Vec<i32>>,
    fail_signal: bool,
}

impl RecordingProcessControl {
    pub fn failing() -> Self {
        Self {
            fail_signal: true,
            ..Self::default()
        }
    }

    pub fn terminated(&self) -> Vec<Pid> {
        self.terminated.lock().unwrap().clone()
    }

    pub fn exits(&self) -> Vec<i32> {
        self.exits.lock().unwrap().clone()
    }
}

impl ProcessControl for RecordingProcessControl {
    fn terminate(&self, pid: Pid) -> nix::Result<()> {
        self.terminated.lock().unwrap().push(pid);
        if self.fail_signal {
            return Err(nix::errno::Errno::EPERM);
        }
        Ok(())
    }

    fn exit(&self, code: i32) {
        self.exits.lock().unwrap().push(code);
    }
}

pub fn executable_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"#!/bin/sh\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn settings() -> PackageManagerConfig {
    PackageManagerConfig {
        use_sudo: false,
        ..PackageManagerConfig::default()
    }
}

/// Context whose self-updater points at a binary that does not exist, for
/// tests that never upgrade the agent itself.
pub fn manager_context(runner: Arc<ScriptedRunner>) -> ManagerContext {
    let self_updater = SelfUpdater::new(runner.clone(), "/nonexistent/dv-updater", false);
    ManagerContext::new(runner, settings(), Arc::new(self_updater))
}

pub fn manager_context_with(
    runner: Arc<ScriptedRunner>,
    self_updater: SelfUpdater,
) -> ManagerContext {
    ManagerContext::new(runner, settings(), Arc::new(self_updater))
}
