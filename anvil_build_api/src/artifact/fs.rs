/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use gazebo::prelude::*;

use anvil_core::cells::CellPath;
use anvil_core::cells::CellResolver;
use anvil_core::fs::project::ProjectFilesystem;
use anvil_core::fs::project::ProjectRelativePathBuf;

use crate::artifact::Artifact;
use crate::path::GenPath;

/// Resolves artifacts to the project-relative paths they live at: source
/// artifacts through the cell resolver, generated artifacts through the
/// gen-path convention.
#[derive(Clone, Dupe)]
pub struct ArtifactFs {
    cells: CellResolver,
    fs: ProjectFilesystem,
}

impl ArtifactFs {
    pub fn new(cells: CellResolver, fs: ProjectFilesystem) -> Self {
        ArtifactFs { cells, fs }
    }

    pub fn cells(&self) -> &CellResolver {
        &self.cells
    }

    pub fn fs(&self) -> &ProjectFilesystem {
        &self.fs
    }

    pub fn resolve_cell_path(&self, path: &CellPath) -> anyhow::Result<ProjectRelativePathBuf> {
        self.cells.resolve_path(path)
    }

    pub fn resolve_gen(&self, path: &GenPath) -> anyhow::Result<ProjectRelativePathBuf> {
        path.resolve()
    }

    pub fn resolve_artifact(&self, artifact: &Artifact) -> anyhow::Result<ProjectRelativePathBuf> {
        match artifact {
            Artifact::Source(source) => self.resolve_cell_path(source.get_path()),
            Artifact::Build(declared) => self.resolve_gen(declared.get_path()),
        }
    }
}

pub mod testing {
    use anvil_core::cells::CellName;
    use anvil_core::cells::CellResolver;
    use anvil_core::fs::project::ProjectFilesystem;
    use anvil_core::fs::project::ProjectRelativePathBuf;
    use anvil_core::fs::project::ProjectRoot;

    use crate::artifact::fs::ArtifactFs;

    /// An artifact filesystem over a fresh tempdir, with a single cell
    /// named `cell` rooted at the project root.
    pub fn testing_artifact_fs() -> (tempfile::TempDir, ArtifactFs) {
        let tempdir = tempfile::tempdir().unwrap();
        let fs = ProjectFilesystem::new(ProjectRoot::new(tempdir.path().to_path_buf()).unwrap());
        let cells = CellResolver::of_names_and_paths(&[(
            CellName::unchecked_new("cell"),
            ProjectRelativePathBuf::unchecked_new("".into()),
        )]);
        (tempdir, ArtifactFs::new(cells, fs))
    }
}

#[cfg(test)]
mod tests {
    use anvil_core::cells::CellPath;
    use anvil_core::fs::project::ProjectRelativePath;
    use anvil_core::target::testing::BuildTargetExt;
    use anvil_core::target::BuildTarget;

    use super::testing::testing_artifact_fs;
    use super::*;
    use crate::artifact::ActionId;
    use crate::artifact::DeclaredArtifact;
    use crate::artifact::SourceArtifact;
    use crate::path::testing::GenPathExt;

    #[test]
    fn resolves_source_and_build_artifacts() -> anyhow::Result<()> {
        let (_t, artifact_fs) = testing_artifact_fs();

        let source = Artifact::from(SourceArtifact::new(CellPath::parse("cell//pkg/src.py")?));
        assert_eq!(
            ProjectRelativePath::new("pkg/src.py")?,
            &*artifact_fs.resolve_artifact(&source)?
        );

        let declared = DeclaredArtifact::new(GenPath::testing_new("cell//pkg:foo", "foo.pex"));
        declared
            .as_output()
            .bind(ActionId::new(BuildTarget::testing_parse("cell//pkg:foo"), 0))?;
        assert_eq!(
            ProjectRelativePath::new("anvil-out/gen/cell/pkg/foo/foo.pex")?,
            &*artifact_fs.resolve_artifact(&Artifact::from(declared))?
        );
        Ok(())
    }
}
