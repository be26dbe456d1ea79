/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The step that invokes the external dexer. The dexer is opaque to the
//! build: jars in, dex container out. Its stderr is captured so that a
//! failure can be classified (see the overflow module) after the fact.

use std::collections::BTreeSet;

use async_trait::async_trait;

use anvil_core::fs::project::ProjectRelativePathBuf;
use anvil_execute::context::StepExecutionContext;
use anvil_execute::process::ProcessCommand;
use anvil_execute::step::Step;
use anvil_execute::step::StepExecutionResult;

use crate::platform::AndroidPlatformTarget;
use crate::platform::DexTool;

pub const DX_SHORT_NAME: &str = "dx";

/// Dexer behavior toggles, mapped to tool flags at invocation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DxOption {
    NoOptimize,
    ForceJumbo,
    NoLocals,
    NoDesugar,
}

/// One dexer invocation: inputs in, one dex container out.
#[derive(Debug)]
pub struct DxStep {
    platform: AndroidPlatformTarget,
    output: ProjectRelativePathBuf,
    inputs: Vec<ProjectRelativePathBuf>,
    options: BTreeSet<DxOption>,
    max_heap_size: Option<String>,
    tool: DexTool,
    /// Extra jars made visible to the desugarer without being dexed.
    classpath_files: Vec<ProjectRelativePathBuf>,
    min_sdk_version: Option<u32>,
}

impl DxStep {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: AndroidPlatformTarget,
        output: ProjectRelativePathBuf,
        inputs: Vec<ProjectRelativePathBuf>,
        options: BTreeSet<DxOption>,
        max_heap_size: Option<String>,
        tool: DexTool,
        classpath_files: Vec<ProjectRelativePathBuf>,
        min_sdk_version: Option<u32>,
    ) -> Self {
        DxStep {
            platform,
            output,
            inputs,
            options,
            max_heap_size,
            tool,
            classpath_files,
            min_sdk_version,
        }
    }

    fn command(&self) -> ProcessCommand {
        let mut args = Vec::new();
        match self.tool {
            DexTool::Dx => {
                args.push("--dex".to_owned());
                if let Some(heap) = &self.max_heap_size {
                    args.push(format!("-JXmx{}", heap));
                }
                if self.options.contains(&DxOption::NoOptimize) {
                    args.push("--no-optimize".to_owned());
                }
                if self.options.contains(&DxOption::ForceJumbo) {
                    args.push("--force-jumbo".to_owned());
                }
                if self.options.contains(&DxOption::NoLocals) {
                    args.push("--no-locals".to_owned());
                }
                if let Some(min_sdk) = self.min_sdk_version {
                    args.push(format!("--min-sdk-version={}", min_sdk));
                }
                args.push(format!("--output={}", self.output));
                args.extend(self.inputs.iter().map(|input| input.to_string()));
            }
            DexTool::D8 => {
                args.push("--output".to_owned());
                args.push(self.output.to_string());
                if self.options.contains(&DxOption::ForceJumbo) {
                    args.push("--force-jumbo".to_owned());
                }
                if self.options.contains(&DxOption::NoDesugar) {
                    args.push("--no-desugaring".to_owned());
                }
                if let Some(min_sdk) = self.min_sdk_version {
                    args.push("--min-api".to_owned());
                    args.push(min_sdk.to_string());
                }
                for classpath in &self.classpath_files {
                    args.push("--classpath".to_owned());
                    args.push(classpath.to_string());
                }
                args.extend(self.inputs.iter().map(|input| input.to_string()));
            }
        }

        let mut command =
            ProcessCommand::new(self.platform.dexer(self.tool).clone(), args);
        if self.tool == DexTool::D8 {
            if let Some(heap) = &self.max_heap_size {
                command = command.env("JAVA_OPTS", &format!("-Xmx{}", heap));
            }
        }
        command
    }
}

#[async_trait]
impl Step for DxStep {
    fn short_name(&self) -> &'static str {
        DX_SHORT_NAME
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        let command = self.command();
        let mut description = command.exe.display().to_string();
        for arg in &command.args {
            description.push(' ');
            description.push_str(arg);
        }
        description
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        let mut command = self.command();
        command.working_directory = Some(ctx.fs().root().as_path().to_path_buf());
        let result = ctx.processes().launch(&command).await?;
        Ok(StepExecutionResult::of_process(&result))
    }
}
