/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Plain filesystem steps.

use std::fs::File;
use std::io;
use std::io::Write;

use anyhow::Context;
use async_trait::async_trait;

use anvil_core::fs::project::ProjectRelativePathBuf;

use crate::context::StepExecutionContext;
use crate::step::Step;
use crate::step::StepExecutionResult;

/// Creates a directory and all of its parents.
#[derive(Debug)]
pub struct MkdirStep {
    path: ProjectRelativePathBuf,
}

impl MkdirStep {
    pub fn new(path: ProjectRelativePathBuf) -> Self {
        MkdirStep { path }
    }
}

#[async_trait]
impl Step for MkdirStep {
    fn short_name(&self) -> &'static str {
        "mkdir"
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        format!("mkdir -p {}", self.path)
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        ctx.fs().create_dir_all(&self.path)?;
        Ok(StepExecutionResult::success())
    }
}

/// Writes the given bytes to a file, creating parent directories.
#[derive(Debug)]
pub struct WriteFileStep {
    contents: Vec<u8>,
    path: ProjectRelativePathBuf,
    executable: bool,
}

impl WriteFileStep {
    pub fn new(contents: impl Into<Vec<u8>>, path: ProjectRelativePathBuf, executable: bool) -> Self {
        WriteFileStep {
            contents: contents.into(),
            path,
            executable,
        }
    }
}

#[async_trait]
impl Step for WriteFileStep {
    fn short_name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        format!("echo ... > {}", self.path)
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        if let Some(parent) = self.path.parent() {
            ctx.fs().create_dir_all(parent)?;
        }
        ctx.fs().write(&self.path, &self.contents)?;
        if self.executable {
            ctx.fs().set_executable(&self.path)?;
        }
        Ok(StepExecutionResult::success())
    }
}

/// Removes a file or directory tree. Missing paths are not an error.
#[derive(Debug)]
pub struct RmStep {
    path: ProjectRelativePathBuf,
}

impl RmStep {
    pub fn new(path: ProjectRelativePathBuf) -> Self {
        RmStep { path }
    }
}

#[async_trait]
impl Step for RmStep {
    fn short_name(&self) -> &'static str {
        "rm"
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        format!("rm -rf {}", self.path)
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        ctx.fs().remove_path_recursive(&self.path)?;
        Ok(StepExecutionResult::success())
    }
}

/// Concatenates the inputs, in order, into the output file.
#[derive(Debug)]
pub struct ConcatStep {
    inputs: Vec<ProjectRelativePathBuf>,
    output: ProjectRelativePathBuf,
}

impl ConcatStep {
    pub fn new(inputs: Vec<ProjectRelativePathBuf>, output: ProjectRelativePathBuf) -> Self {
        ConcatStep { inputs, output }
    }
}

#[async_trait]
impl Step for ConcatStep {
    fn short_name(&self) -> &'static str {
        "concat"
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        format!(
            "cat {} > {}",
            self.inputs
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            self.output
        )
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        let out_path = ctx.fs().resolve(&self.output);
        let mut out = File::create(&out_path)
            .with_context(|| format!("create({})", out_path.display()))?;
        for input in &self.inputs {
            let in_path = ctx.fs().resolve(input);
            let mut file = File::open(&in_path)
                .with_context(|| format!("open({})", in_path.display()))?;
            io::copy(&mut file, &mut out)
                .with_context(|| format!("concat {} -> {}", input, self.output))?;
        }
        out.flush()?;
        Ok(StepExecutionResult::success())
    }
}

#[cfg(test)]
mod tests {
    use anvil_core::fs::project::ProjectRelativePath;

    use super::*;
    use crate::context::testing::testing_context;

    #[tokio::test]
    async fn write_and_concat() -> anyhow::Result<()> {
        let (_t, ctx) = testing_context();

        let a = ProjectRelativePath::new("dir/a")?.to_buf();
        let b = ProjectRelativePath::new("dir/b")?.to_buf();
        let out = ProjectRelativePath::new("dir/out")?.to_buf();

        WriteFileStep::new("one,", a.clone(), false)
            .execute(&ctx)
            .await?;
        WriteFileStep::new("two", b.clone(), false)
            .execute(&ctx)
            .await?;
        ConcatStep::new(vec![a, b], out.clone()).execute(&ctx).await?;

        assert_eq!("one,two", ctx.fs().read_to_string(&out)?);
        Ok(())
    }

    #[tokio::test]
    async fn rm_is_idempotent() -> anyhow::Result<()> {
        let (_t, ctx) = testing_context();
        let path = ProjectRelativePath::new("f")?.to_buf();
        WriteFileStep::new("x", path.clone(), false)
            .execute(&ctx)
            .await?;
        RmStep::new(path.clone()).execute(&ctx).await?;
        RmStep::new(path.clone()).execute(&ctx).await?;
        assert!(!ctx.fs().exists(&path));
        Ok(())
    }
}
