/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use gazebo::prelude::*;

use anvil_core::fs::project::ProjectRelativePathBuf;
use anvil_core::source_path::SourcePath;

use crate::artifact::fs::ArtifactFs;
use crate::cmd_args::CommandLineArg;
use crate::cmd_args::CommandLineArgs;
use crate::path::GenPath;
use crate::rules::resolver::FrozenRuleResolver;

/// The context rules materialize their steps against: the artifact
/// filesystem, and the frozen rule index for resolving references to other
/// targets' default outputs. Only exists once assembly has finished.
#[derive(Clone, Dupe)]
pub struct BuildContext {
    artifact_fs: ArtifactFs,
    rules: Arc<FrozenRuleResolver>,
}

impl BuildContext {
    pub fn new(artifact_fs: ArtifactFs, rules: Arc<FrozenRuleResolver>) -> Self {
        BuildContext { artifact_fs, rules }
    }

    pub fn artifact_fs(&self) -> &ArtifactFs {
        &self.artifact_fs
    }

    pub fn rules(&self) -> &FrozenRuleResolver {
        &self.rules
    }

    /// Resolves any source path to the project-relative path it lives at. A
    /// build-target source with no explicit output name resolves to the
    /// producing rule's primary output.
    pub fn resolve_source_path(
        &self,
        source: &SourcePath,
    ) -> anyhow::Result<ProjectRelativePathBuf> {
        match source {
            SourcePath::Path(path) => self.artifact_fs.resolve_cell_path(path),
            SourcePath::BuildTarget(path) => match path.output() {
                Some(output) => {
                    GenPath::new(path.target().dupe(), output.to_buf()).resolve()
                }
                None => {
                    let rule = self.rules.get_rule(path.target()).ok_or_else(|| {
                        anyhow::anyhow!("no rule for target `{}`", path.target())
                    })?;
                    rule.output_path().ok_or_else(|| {
                        anyhow::anyhow!("`{}` has no default output", path.target())
                    })
                }
            },
        }
    }

    /// Stringifies a command-line-args bundle: every artifact reference is
    /// replaced by the project-relative path it resolves to, then each
    /// argument's format string is applied.
    pub fn stringify_args(&self, args: &CommandLineArgs) -> anyhow::Result<Vec<String>> {
        let mut result = Vec::with_capacity(args.len());
        for arg in args.args() {
            let stringified = match arg.object() {
                CommandLineArg::String(s) => s.clone(),
                CommandLineArg::SourcePath(source) => {
                    self.resolve_source_path(source)?.to_string()
                }
                CommandLineArg::Artifact(artifact) => {
                    self.artifact_fs.resolve_artifact(artifact)?.to_string()
                }
                CommandLineArg::Output(output) => self
                    .artifact_fs
                    .resolve_gen(output.artifact().get_path())?
                    .to_string(),
            };
            result.push(arg.apply(&stringified));
        }
        Ok(result)
    }
}
