/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A 'Cell' is a directory tree that targets and source files are addressed
//! relative to. Every source reference in the build is a 'CellPath'; the
//! 'CellResolver' maps those to project-relative paths.

use std::collections::HashMap;
use std::sync::Arc;

use derive_more::Display;
use gazebo::prelude::*;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

use crate::fs::paths::ForwardRelativePath;
use crate::fs::paths::ForwardRelativePathBuf;
use crate::fs::project::ProjectRelativePathBuf;

#[derive(Error, Debug)]
pub enum CellError {
    #[error("unknown cell name: `{0}`")]
    UnknownCell(CellName),
    #[error("cell path `{0}` is missing the `//` separator")]
    MissingSeparator(String),
}

/// The name of a cell, e.g. the `fbcode` of `fbcode//foo/bar:baz`.
#[derive(Clone, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct CellName(Arc<str>);

impl Dupe for CellName {}

impl CellName {
    pub fn unchecked_new(name: &str) -> CellName {
        CellName(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A path relative to a cell root, rendered as `cell//path`.
#[derive(Clone, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[display(fmt = "{}//{}", cell, path)]
pub struct CellPath {
    cell: CellName,
    path: ForwardRelativePathBuf,
}

impl CellPath {
    pub fn new(cell: CellName, path: ForwardRelativePathBuf) -> Self {
        CellPath { cell, path }
    }

    /// Parses the `cell//path` rendering back into a 'CellPath'.
    ///
    /// ```
    /// use anvil_core::cells::CellPath;
    ///
    /// let path = CellPath::parse("mycell//foo/bar.py")?;
    /// assert_eq!("mycell", path.cell().as_str());
    /// assert_eq!("foo/bar.py", path.path().as_str());
    /// assert!(CellPath::parse("no-separator").is_err());
    ///
    /// # anyhow::Ok(())
    /// ```
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let (cell, path) = s
            .split_once("//")
            .ok_or_else(|| CellError::MissingSeparator(s.to_owned()))?;
        Ok(CellPath::new(
            CellName::unchecked_new(cell),
            ForwardRelativePath::new(path)?.to_buf(),
        ))
    }

    pub fn cell(&self) -> &CellName {
        &self.cell
    }

    pub fn path(&self) -> &ForwardRelativePath {
        self.path.as_ref()
    }

    pub fn join<P: AsRef<ForwardRelativePath>>(&self, path: P) -> CellPath {
        CellPath::new(self.cell.dupe(), self.path.join(path))
    }
}

impl Serialize for CellPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CellPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CellPath::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Resolves cell names to the project-relative paths of their roots.
#[derive(Clone, Dupe, Debug)]
pub struct CellResolver(Arc<HashMap<CellName, ProjectRelativePathBuf>>);

impl CellResolver {
    pub fn of_names_and_paths(cells: &[(CellName, ProjectRelativePathBuf)]) -> CellResolver {
        CellResolver(Arc::new(cells.iter().cloned().collect()))
    }

    pub fn contains(&self, cell: &CellName) -> bool {
        self.0.contains_key(cell)
    }

    pub fn get(&self, cell: &CellName) -> anyhow::Result<&ProjectRelativePathBuf> {
        self.0
            .get(cell)
            .ok_or_else(|| CellError::UnknownCell(cell.dupe()).into())
    }

    /// Resolves a 'CellPath' to a 'ProjectRelativePath' by joining it onto
    /// the cell's root.
    pub fn resolve_path(&self, cell_path: &CellPath) -> anyhow::Result<ProjectRelativePathBuf> {
        Ok(self.get(cell_path.cell())?.join(cell_path.path()))
    }
}
