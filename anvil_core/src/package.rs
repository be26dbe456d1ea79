/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A 'Package' corresponds to the directory that contains a build file and
//! the sources accessible to the targets defined in it, identified by cell
//! name plus cell-relative path and rendered as `cell//path`.

use std::sync::Arc;

use derive_more::Display;
use gazebo::prelude::*;

use crate::cells::CellName;
use crate::cells::CellPath;
use crate::fs::paths::ForwardRelativePath;
use crate::fs::paths::ForwardRelativePathBuf;

/// A 'Package' as defined above.
#[derive(Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[display(fmt = "{}//{}", "self.cell_name()", "self.cell_relative_path()")]
pub struct Package(Arc<PackageData>);

impl Dupe for Package {}

#[derive(Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
struct PackageData {
    cell: CellName,
    path: ForwardRelativePathBuf,
}

impl Package {
    pub fn new(cell: CellName, path: ForwardRelativePathBuf) -> Self {
        Package(Arc::new(PackageData { cell, path }))
    }

    pub fn from_cell_path(path: &CellPath) -> Self {
        Package::new(path.cell().dupe(), path.path().to_buf())
    }

    pub fn cell_name(&self) -> &CellName {
        &self.0.cell
    }

    pub fn cell_relative_path(&self) -> &ForwardRelativePath {
        self.0.path.as_ref()
    }

    pub fn as_cell_path(&self) -> CellPath {
        CellPath::new(self.0.cell.dupe(), self.0.path.clone())
    }

    /// The cell path of a file within this package.
    pub fn join<P: AsRef<ForwardRelativePath>>(&self, path: P) -> CellPath {
        CellPath::new(self.0.cell.dupe(), self.0.path.join(path))
    }
}

pub mod testing {
    use crate::cells::CellName;
    use crate::fs::paths::ForwardRelativePathBuf;
    use crate::package::Package;

    pub trait PackageExt {
        fn testing_new(cell: &str, path: &str) -> Self;
    }

    impl PackageExt for Package {
        fn testing_new(cell: &str, path: &str) -> Self {
            Package::new(
                CellName::unchecked_new(cell),
                ForwardRelativePathBuf::unchecked_new(path.into()),
            )
        }
    }
}
