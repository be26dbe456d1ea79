/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use async_trait::async_trait;

use crate::context::StepExecutionContext;
use crate::process::ProcessCommand;
use crate::step::Step;
use crate::step::StepExecutionResult;

/// Runs an already-stringified external command. This is the generic step
/// rules emit for tool invocations whose command lines were assembled from a
/// command-line-args bundle; tools with richer failure classification (like
/// the dexer) get steps of their own.
#[derive(Debug)]
pub struct RunCommandStep {
    short_name: &'static str,
    command: ProcessCommand,
}

impl RunCommandStep {
    pub fn new(short_name: &'static str, command: ProcessCommand) -> Self {
        RunCommandStep {
            short_name,
            command,
        }
    }
}

#[async_trait]
impl Step for RunCommandStep {
    fn short_name(&self) -> &'static str {
        self.short_name
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        let mut description = self.command.exe.display().to_string();
        for arg in &self.command.args {
            description.push(' ');
            description.push_str(arg);
        }
        description
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        let mut command = self.command.clone();
        if command.working_directory.is_none() {
            command.working_directory = Some(ctx.fs().root().as_path().to_path_buf());
        }
        let result = ctx.processes().launch(&command).await?;
        Ok(StepExecutionResult::of_process(&result))
    }
}
