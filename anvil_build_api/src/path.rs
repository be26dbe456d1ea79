/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Output paths for generated artifacts. Every target's outputs live under
//! `anvil-out/gen/<cell>/<package path>/<name#flavors>/`, so output paths
//! are a pure function of the owning target and the output name, and two
//! distinct targets can never collide.

use derive_more::Display;

use anvil_core::fs::paths::ForwardRelativePath;
use anvil_core::fs::paths::ForwardRelativePathBuf;
use anvil_core::fs::project::ProjectRelativePath;
use anvil_core::fs::project::ProjectRelativePathBuf;
use anvil_core::target::BuildTarget;

/// The project-relative directory all generated artifacts live under.
pub const GEN_DIR: &str = "anvil-out/gen";

/// The path of one generated artifact: the target that owns it plus the
/// output's path relative to the target's output directory.
#[derive(Clone, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[display(fmt = "{}/{}", owner, path)]
pub struct GenPath {
    owner: BuildTarget,
    path: ForwardRelativePathBuf,
}

impl GenPath {
    pub fn new(owner: BuildTarget, path: ForwardRelativePathBuf) -> Self {
        GenPath { owner, path }
    }

    pub fn owner(&self) -> &BuildTarget {
        &self.owner
    }

    pub fn path(&self) -> &ForwardRelativePath {
        self.path.as_ref()
    }

    /// Resolves to the on-disk project-relative path.
    pub fn resolve(&self) -> anyhow::Result<ProjectRelativePathBuf> {
        Ok(gen_directory(&self.owner)?.join(self.path.as_ref()))
    }
}

/// The output directory of a target.
pub fn gen_directory(target: &BuildTarget) -> anyhow::Result<ProjectRelativePathBuf> {
    let mut dir = ProjectRelativePath::unchecked_new(GEN_DIR)
        .join(ForwardRelativePath::new(target.pkg().cell_name().as_str())?);
    dir = dir.join(target.pkg().cell_relative_path());
    Ok(dir.join(target.output_dir_name()?))
}

pub mod testing {
    use anvil_core::fs::paths::ForwardRelativePathBuf;
    use anvil_core::target::testing::BuildTargetExt;
    use anvil_core::target::BuildTarget;

    use crate::path::GenPath;

    pub trait GenPathExt {
        fn testing_new(target: &str, path: &str) -> GenPath {
            GenPath::new(
                BuildTarget::testing_parse(target),
                ForwardRelativePathBuf::unchecked_new(path.into()),
            )
        }
    }
    impl GenPathExt for GenPath {}
}

#[cfg(test)]
mod tests {
    use super::testing::GenPathExt;
    use super::*;
    use anvil_core::target::testing::BuildTargetExt;

    #[test]
    fn gen_paths_are_target_scoped() -> anyhow::Result<()> {
        let path = GenPath::testing_new("cell//foo/bar:baz", "baz.pex");
        assert_eq!(
            "anvil-out/gen/cell/foo/bar/baz/baz.pex",
            path.resolve()?.as_str()
        );

        let flavored = GenPath::testing_new("cell//foo/bar:baz#binary", "baz.pex");
        assert_eq!(
            "anvil-out/gen/cell/foo/bar/baz#binary/baz.pex",
            flavored.resolve()?.as_str()
        );
        assert_ne!(path.resolve()?, flavored.resolve()?);
        Ok(())
    }

    #[test]
    fn gen_directory_of_unflavored_target() -> anyhow::Result<()> {
        let target = BuildTarget::testing_parse("cell//pkg:name");
        assert_eq!("anvil-out/gen/cell/pkg/name", gen_directory(&target)?.as_str());
        Ok(())
    }
}
