/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fs::File;
use std::io;

use anyhow::Context;
use async_trait::async_trait;
use xz2::write::XzEncoder;

use anvil_core::fs::project::ProjectRelativePathBuf;

use crate::context::StepExecutionContext;
use crate::step::Step;
use crate::step::StepExecutionResult;

/// Xz-compresses a file. By default the destination is the source path with
/// `.xz` appended and the source is removed after a successful compression,
/// so the step reads as compress-in-place.
#[derive(Debug)]
pub struct XzStep {
    source: ProjectRelativePathBuf,
    destination: ProjectRelativePathBuf,
    compression_level: u32,
    keep_original: bool,
}

impl XzStep {
    pub fn new(source: ProjectRelativePathBuf, compression_level: u32) -> Self {
        let destination =
            ProjectRelativePathBuf::unchecked_new(format!("{}.xz", source));
        XzStep {
            source,
            destination,
            compression_level,
            keep_original: false,
        }
    }

    pub fn with_destination(
        source: ProjectRelativePathBuf,
        destination: ProjectRelativePathBuf,
        compression_level: u32,
    ) -> Self {
        XzStep {
            source,
            destination,
            compression_level,
            keep_original: false,
        }
    }
}

#[async_trait]
impl Step for XzStep {
    fn short_name(&self) -> &'static str {
        "xz"
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        format!("xz -{} {} -> {}", self.compression_level, self.source, self.destination)
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        let source_path = ctx.fs().resolve(&self.source);
        let destination_path = ctx.fs().resolve(&self.destination);

        let mut source = File::open(&source_path)
            .with_context(|| format!("open({})", source_path.display()))?;
        let destination = File::create(&destination_path)
            .with_context(|| format!("create({})", destination_path.display()))?;
        let mut encoder = XzEncoder::new(destination, self.compression_level);
        io::copy(&mut source, &mut encoder)
            .with_context(|| format!("xz {} -> {}", self.source, self.destination))?;
        encoder.finish()?;

        if !self.keep_original {
            ctx.fs().remove_path_recursive(&self.source)?;
        }
        Ok(StepExecutionResult::success())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use anvil_core::fs::project::ProjectRelativePath;
    use xz2::read::XzDecoder;

    use super::*;
    use crate::context::testing::testing_context;

    #[tokio::test]
    async fn compresses_and_removes_source() -> anyhow::Result<()> {
        let (_t, ctx) = testing_context();
        let source = ProjectRelativePath::new("blob")?.to_buf();
        ctx.fs().write(&source, vec![7u8; 4096])?;

        XzStep::new(source.clone(), 6).execute(&ctx).await?;

        assert!(!ctx.fs().exists(&source));
        let compressed = ctx.fs().read(ProjectRelativePath::new("blob.xz")?)?;
        let mut decoded = Vec::new();
        XzDecoder::new(&compressed[..]).read_to_end(&mut decoded)?;
        assert_eq!(vec![7u8; 4096], decoded);
        Ok(())
    }
}
