/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fs::File;

use anyhow::Context;
use async_trait::async_trait;
use zip::ZipArchive;

use anvil_core::fs::project::ProjectRelativePathBuf;
use anvil_execute::context::StepExecutionContext;
use anvil_execute::step::Step;
use anvil_execute::step::StepExecutionResult;

/// Writes a `.meta` file next to a dex jar recording the jar's size and the
/// uncompressed size of its `classes.dex` entry. Applications read this at
/// install time to size buffers before unpacking.
#[derive(Debug)]
pub struct DexJarAnalysisStep {
    jar: ProjectRelativePathBuf,
    meta: ProjectRelativePathBuf,
}

impl DexJarAnalysisStep {
    pub fn new(jar: ProjectRelativePathBuf, meta: ProjectRelativePathBuf) -> Self {
        DexJarAnalysisStep { jar, meta }
    }
}

#[async_trait]
impl Step for DexJarAnalysisStep {
    fn short_name(&self) -> &'static str {
        "dex_meta"
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        format!("write dex metadata for {} into {}", self.jar, self.meta)
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        let jar_path = ctx.fs().resolve(&self.jar);
        let jar_size = jar_path
            .metadata()
            .with_context(|| format!("stat({})", jar_path.display()))?
            .len();

        let file = File::open(&jar_path)
            .with_context(|| format!("open({})", jar_path.display()))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("read zip {}", self.jar))?;
        let dex_size = archive
            .by_name("classes.dex")
            .with_context(|| format!("{} has no classes.dex entry", self.jar))?
            .size();

        ctx.fs()
            .write(&self.meta, format!("jar:{} dex:{}", jar_size, dex_size))?;
        Ok(StepExecutionResult::success())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anvil_core::fs::project::ProjectRelativePath;
    use anvil_execute::context::testing::testing_context;
    use zip::write::FileOptions;
    use zip::CompressionMethod;
    use zip::ZipWriter;

    use super::*;

    #[tokio::test]
    async fn writes_jar_and_dex_sizes() -> anyhow::Result<()> {
        let (_t, ctx) = testing_context();
        let jar = ProjectRelativePath::new("out/secondary-1.dex.jar")?.to_buf();
        let meta = ProjectRelativePath::new("out/secondary-1.dex.jar.meta")?.to_buf();
        ctx.fs().create_dir_all(ProjectRelativePath::new("out")?)?;

        let file = File::create(ctx.fs().resolve(&jar))?;
        let mut writer = ZipWriter::new(file);
        writer.start_file(
            "classes.dex",
            FileOptions::default().compression_method(CompressionMethod::Stored),
        )?;
        writer.write_all(&[0u8; 128])?;
        writer.finish()?;

        DexJarAnalysisStep::new(jar.clone(), meta.clone())
            .execute(&ctx)
            .await?;

        let jar_size = ctx.fs().resolve(&jar).metadata()?.len();
        assert_eq!(
            format!("jar:{} dex:128", jar_size),
            ctx.fs().read_to_string(&meta)?
        );
        Ok(())
    }
}
