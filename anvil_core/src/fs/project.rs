/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The project root and the filesystem facade steps run against.
//!
//! A 'ProjectRelativePath' is relative to the project root, which is the
//! directory containing the outermost cell. All on-disk reads and writes the
//! build performs go through 'ProjectFilesystem' so that errors carry the
//! offending path and tests can point the whole build at a tempdir.

use std::borrow::Borrow;
use std::fs;
use std::io;
use std::io::BufRead;
use std::ops::Deref;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use derive_more::Display;
use gazebo::prelude::*;
use ref_cast::RefCast;

use crate::fs::paths::ForwardRelativePath;
use crate::fs::paths::ForwardRelativePathBuf;

/// A normalized path relative to the project root.
#[derive(Display, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, RefCast)]
#[repr(transparent)]
pub struct ProjectRelativePath(ForwardRelativePath);

/// The owned version of 'ProjectRelativePath'.
#[derive(Clone, Display, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectRelativePathBuf(ForwardRelativePathBuf);

impl ProjectRelativePath {
    pub fn unchecked_new<S: ?Sized + AsRef<str>>(s: &S) -> &Self {
        ProjectRelativePath::ref_cast(ForwardRelativePath::unchecked_new(s))
    }

    pub fn new<S: ?Sized + AsRef<str>>(s: &S) -> anyhow::Result<&ProjectRelativePath> {
        Ok(ProjectRelativePath::ref_cast(ForwardRelativePath::new(s)?))
    }

    pub fn empty() -> &'static ProjectRelativePath {
        ProjectRelativePath::unchecked_new("")
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_forward_relative_path(&self) -> &ForwardRelativePath {
        &self.0
    }

    pub fn join<P: AsRef<ForwardRelativePath>>(&self, path: P) -> ProjectRelativePathBuf {
        ProjectRelativePathBuf(self.0.join(path))
    }

    pub fn parent(&self) -> Option<&ProjectRelativePath> {
        self.0.parent().map(ProjectRelativePath::ref_cast)
    }

    pub fn file_name(&self) -> Option<&crate::fs::paths::FileName> {
        self.0.file_name()
    }

    pub fn ends_with_str(&self, suffix: &str) -> bool {
        self.0.ends_with_str(suffix)
    }

    pub fn to_buf(&self) -> ProjectRelativePathBuf {
        ProjectRelativePathBuf(self.0.to_buf())
    }
}

impl ProjectRelativePathBuf {
    pub fn unchecked_new(s: String) -> Self {
        Self(ForwardRelativePathBuf::unchecked_new(s))
    }

    pub fn new(s: String) -> anyhow::Result<Self> {
        Ok(Self(ForwardRelativePathBuf::new(s)?))
    }
}

impl From<ForwardRelativePathBuf> for ProjectRelativePathBuf {
    fn from(p: ForwardRelativePathBuf) -> Self {
        Self(p)
    }
}

impl From<ProjectRelativePathBuf> for ForwardRelativePathBuf {
    fn from(p: ProjectRelativePathBuf) -> Self {
        p.0
    }
}

impl AsRef<ForwardRelativePath> for ProjectRelativePath {
    fn as_ref(&self) -> &ForwardRelativePath {
        &self.0
    }
}

impl AsRef<ForwardRelativePath> for ProjectRelativePathBuf {
    fn as_ref(&self) -> &ForwardRelativePath {
        self.0.as_ref()
    }
}

impl AsRef<ProjectRelativePath> for ProjectRelativePath {
    fn as_ref(&self) -> &ProjectRelativePath {
        self
    }
}

impl AsRef<ProjectRelativePath> for ProjectRelativePathBuf {
    fn as_ref(&self) -> &ProjectRelativePath {
        ProjectRelativePath::ref_cast(self.0.as_ref())
    }
}

impl Borrow<ProjectRelativePath> for ProjectRelativePathBuf {
    fn borrow(&self) -> &ProjectRelativePath {
        self.as_ref()
    }
}

impl Deref for ProjectRelativePathBuf {
    type Target = ProjectRelativePath;

    fn deref(&self) -> &ProjectRelativePath {
        self.as_ref()
    }
}

impl ToOwned for ProjectRelativePath {
    type Owned = ProjectRelativePathBuf;

    fn to_owned(&self) -> ProjectRelativePathBuf {
        self.to_buf()
    }
}

/// The absolute path of the project root.
#[derive(Clone, Dupe, Debug, Display, PartialEq, Eq)]
#[display(fmt = "{}", "root.display()")]
pub struct ProjectRoot {
    root: Arc<PathBuf>,
}

impl ProjectRoot {
    pub fn new(root: PathBuf) -> anyhow::Result<Self> {
        if !root.is_absolute() {
            return Err(anyhow::anyhow!(
                "project root must be an absolute path, got `{}`",
                root.display()
            ));
        }
        Ok(Self {
            root: Arc::new(root),
        })
    }

    pub fn as_path(&self) -> &Path {
        &self.root
    }

    pub fn resolve<P: AsRef<ProjectRelativePath>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.as_str().is_empty() {
            self.root.to_path_buf()
        } else {
            self.root.join(path.as_str())
        }
    }
}

/// The shared filesystem the build reads and writes through. Cheap to clone.
#[derive(Clone, Dupe, Debug)]
pub struct ProjectFilesystem {
    root: ProjectRoot,
}

impl ProjectFilesystem {
    pub fn new(root: ProjectRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ProjectRoot {
        &self.root
    }

    pub fn resolve<P: AsRef<ProjectRelativePath>>(&self, path: P) -> PathBuf {
        self.root.resolve(path)
    }

    pub fn exists<P: AsRef<ProjectRelativePath>>(&self, path: P) -> bool {
        self.resolve(path).exists()
    }

    /// Reads the first line of the file, without the trailing newline.
    /// Returns `None` if the file does not exist or is empty.
    pub fn read_first_line<P: AsRef<ProjectRelativePath>>(&self, path: P) -> Option<String> {
        let file = fs::File::open(self.resolve(path)).ok()?;
        let mut line = String::new();
        io::BufReader::new(file).read_line(&mut line).ok()?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        if line.is_empty() { None } else { Some(line) }
    }

    pub fn read_to_string<P: AsRef<ProjectRelativePath>>(&self, path: P) -> anyhow::Result<String> {
        let abs = self.resolve(path);
        fs::read_to_string(&abs).with_context(|| format!("read_to_string({})", abs.display()))
    }

    pub fn read<P: AsRef<ProjectRelativePath>>(&self, path: P) -> anyhow::Result<Vec<u8>> {
        let abs = self.resolve(path);
        fs::read(&abs).with_context(|| format!("read({})", abs.display()))
    }

    pub fn write<P: AsRef<ProjectRelativePath>, C: AsRef<[u8]>>(
        &self,
        path: P,
        contents: C,
    ) -> anyhow::Result<()> {
        let abs = self.resolve(path);
        fs::write(&abs, contents).with_context(|| format!("write({})", abs.display()))
    }

    pub fn set_executable<P: AsRef<ProjectRelativePath>>(&self, path: P) -> anyhow::Result<()> {
        let abs = self.resolve(path);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(&abs)
                .with_context(|| format!("set_executable({})", abs.display()))?;
            let mut perms = metadata.permissions();
            perms.set_mode(perms.mode() | 0o111);
            fs::set_permissions(&abs, perms)
                .with_context(|| format!("set_executable({})", abs.display()))?;
        }
        #[cfg(not(unix))]
        let _ = abs;
        Ok(())
    }

    pub fn create_dir_all<P: AsRef<ProjectRelativePath>>(&self, path: P) -> anyhow::Result<()> {
        let abs = self.resolve(path);
        fs::create_dir_all(&abs).with_context(|| format!("create_dir_all({})", abs.display()))
    }

    /// Removes a file or a directory tree. Missing paths are not an error.
    pub fn remove_path_recursive<P: AsRef<ProjectRelativePath>>(
        &self,
        path: P,
    ) -> anyhow::Result<()> {
        let abs = self.resolve(path);
        let metadata = match fs::symlink_metadata(&abs) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("remove_path_recursive({})", abs.display()));
            }
        };
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&abs)
        } else {
            fs::remove_file(&abs)
        };
        result.with_context(|| format!("remove_path_recursive({})", abs.display()))
    }

    /// The entries of a directory, as project-relative paths, sorted by name.
    /// A missing directory reads as empty.
    pub fn directory_contents<P: AsRef<ProjectRelativePath>>(
        &self,
        path: P,
    ) -> anyhow::Result<Vec<ProjectRelativePathBuf>> {
        let dir = path.as_ref();
        let abs = self.resolve(dir);
        let entries = match fs::read_dir(&abs) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("directory_contents({})", abs.display()));
            }
        };
        let mut result = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("directory_contents({})", abs.display()))?;
            let name = entry.file_name();
            let name = name.to_str().with_context(|| {
                format!("non-utf8 file name in directory {}", abs.display())
            })?;
            result.push(dir.join(ForwardRelativePath::new(name)?));
        }
        result.sort();
        Ok(result)
    }
}
