/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use anvil_core::fs::project::ProjectRelativePath;

/// How a dex output is containerized, keyed off the output path's suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DexStore {
    /// A jar containing `classes.dex`.
    Jar,
    /// A bare `.dex` file.
    Raw,
    /// A jar whose dex entry is stored uncompressed, then xz-compressed.
    Xz,
    /// Like `Xz`, but compression is deferred so several jars can be
    /// concatenated and compressed as one solid blob.
    Xzs,
}

impl DexStore {
    pub fn extension(self) -> &'static str {
        match self {
            DexStore::Jar => ".dex.jar",
            DexStore::Raw => ".dex",
            DexStore::Xz => ".dex.jar.xz",
            DexStore::Xzs => ".dex.jar.xzs",
        }
    }

    pub fn matches_path(self, path: &ProjectRelativePath) -> bool {
        path.ends_with_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_matching() -> anyhow::Result<()> {
        let jar = ProjectRelativePath::new("out/secondary-1.dex.jar")?;
        let raw = ProjectRelativePath::new("out/classes2.dex")?;
        let xz = ProjectRelativePath::new("out/secondary-1.dex.jar.xz")?;
        let xzs = ProjectRelativePath::new("out/secondary-1.dex.jar.xzs")?;

        assert!(DexStore::Jar.matches_path(jar));
        assert!(!DexStore::Jar.matches_path(xz));

        assert!(DexStore::Raw.matches_path(raw));
        assert!(!DexStore::Raw.matches_path(jar));

        assert!(DexStore::Xz.matches_path(xz));
        assert!(!DexStore::Xz.matches_path(xzs));

        assert!(DexStore::Xzs.matches_path(xzs));
        assert!(!DexStore::Xzs.matches_path(xz));
        Ok(())
    }
}
