/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! External process launches. Steps that invoke external tools are pure
//! data; the launch itself happens through the 'ProcessExecutor' on the
//! execution context, so tests can substitute a recording executor and run
//! the whole planner hermetically.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;

/// A process invocation, fully described by data.
#[derive(Clone, Debug)]
pub struct ProcessCommand {
    pub exe: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_directory: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ProcessCommand {
    pub fn new(exe: PathBuf, args: Vec<String>) -> Self {
        ProcessCommand {
            exe,
            args,
            env: Vec::new(),
            working_directory: None,
            timeout: None,
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_owned(), value.to_owned()));
        self
    }
}

/// The gathered result of a finished process.
#[derive(Clone, Debug)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn launch(&self, command: &ProcessCommand) -> anyhow::Result<ProcessResult>;
}

/// Launches processes on the local machine, gathering stdout and stderr.
#[derive(Debug, Default)]
pub struct LocalProcessExecutor;

#[async_trait]
impl ProcessExecutor for LocalProcessExecutor {
    async fn launch(&self, command: &ProcessCommand) -> anyhow::Result<ProcessResult> {
        let mut cmd = Command::new(&command.exe);
        cmd.args(&command.args);
        cmd.envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &command.working_directory {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let gather = async {
            let output = cmd
                .output()
                .await
                .with_context(|| format!("failed to launch `{}`", command.exe.display()))?;
            anyhow::Ok(ProcessResult {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: output.stdout,
                stderr: output.stderr,
            })
        };

        match command.timeout {
            Some(timeout) => tokio::time::timeout(timeout, gather)
                .await
                .with_context(|| {
                    format!(
                        "`{}` timed out after {}s",
                        command.exe.display(),
                        timeout.as_secs()
                    )
                })?,
            None => gather.await,
        }
    }
}

pub mod testing {
    use super::*;

    type Behavior = Box<dyn Fn(&ProcessCommand) -> anyhow::Result<ProcessResult> + Send + Sync>;

    /// A recording executor for tests: never launches anything, applies a
    /// configured behavior to synthesize results (and, typically, to create
    /// the output files the command would have produced).
    pub struct FakeProcessExecutor {
        behavior: Behavior,
        invocations: Mutex<Vec<ProcessCommand>>,
    }

    impl FakeProcessExecutor {
        /// Every launch succeeds with empty output.
        pub fn succeeding() -> Self {
            Self::with(|_| {
                Ok(ProcessResult {
                    exit_code: 0,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                })
            })
        }

        pub fn with(
            behavior: impl Fn(&ProcessCommand) -> anyhow::Result<ProcessResult>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            FakeProcessExecutor {
                behavior: Box::new(behavior),
                invocations: Mutex::new(Vec::new()),
            }
        }

        pub fn invocations(&self) -> Vec<ProcessCommand> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessExecutor for FakeProcessExecutor {
        async fn launch(&self, command: &ProcessCommand) -> anyhow::Result<ProcessResult> {
            self.invocations.lock().unwrap().push(command.clone());
            (self.behavior)(command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeProcessExecutor;
    use super::*;

    #[tokio::test]
    async fn fake_executor_records_invocations() -> anyhow::Result<()> {
        let executor = FakeProcessExecutor::succeeding();
        let command = ProcessCommand::new("dx".into(), vec!["--dex".into()]).env("K", "v");
        let result = executor.launch(&command).await?;
        assert!(result.is_success());
        let invocations = executor.invocations();
        assert_eq!(1, invocations.len());
        assert_eq!(vec!["--dex".to_owned()], invocations[0].args);
        assert_eq!(vec![("K".to_owned(), "v".to_owned())], invocations[0].env);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_executor_gathers_output() -> anyhow::Result<()> {
        let executor = LocalProcessExecutor::default();
        let command = ProcessCommand::new("sh".into(), vec!["-c".into(), "echo hi; exit 3".into()]);
        let result = executor.launch(&command).await?;
        assert_eq!(3, result.exit_code);
        assert_eq!(b"hi\n".to_vec(), result.stdout);
        Ok(())
    }
}
