/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Validated relative path newtypes.
//!
//! A 'ForwardRelativePath' is a platform-agnostic path relative to some root,
//! normalized such that it never contains `.`, `..`, repeated separators or a
//! leading/trailing separator. All path kinds in anvil (cell-relative,
//! project-relative, package-relative) are built on top of it, so validation
//! happens once, at the boundary.

use std::borrow::Borrow;
use std::ops::Deref;

use derive_more::Display;
use ref_cast::RefCast;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

#[derive(Error, Debug)]
enum ForwardRelativePathError {
    #[error("expected a relative path but got an absolute path instead: `{0}`")]
    PathNotRelative(String),
    #[error("expected a normalized path but got a non-normalized path instead: `{0}`")]
    PathNotNormalized(String),
}

#[derive(Error, Debug)]
enum FileNameError {
    #[error("file name is empty")]
    Empty,
    #[error("file name `{0}` is not a single normalized path component")]
    NotAComponent(String),
}

/// A normalized, platform-agnostic path relative to some root, e.g.
/// `foo/bar/baz.txt`. The empty path refers to the root itself.
#[derive(Display, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, RefCast)]
#[repr(transparent)]
pub struct ForwardRelativePath(str);

/// The owned version of 'ForwardRelativePath'.
#[derive(Clone, Display, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ForwardRelativePathBuf(String);

impl ForwardRelativePath {
    pub fn unchecked_new<S: ?Sized + AsRef<str>>(s: &S) -> &Self {
        ForwardRelativePath::ref_cast(s.as_ref())
    }

    /// Creates a 'ForwardRelativePath' if the given string is a forward,
    /// normalized relative path, otherwise error.
    ///
    /// ```
    /// use anvil_core::fs::paths::ForwardRelativePath;
    ///
    /// assert!(ForwardRelativePath::new("foo/bar").is_ok());
    /// assert!(ForwardRelativePath::new("").is_ok());
    /// assert!(ForwardRelativePath::new("/abs/bar").is_err());
    /// assert!(ForwardRelativePath::new("normalize/./bar").is_err());
    /// assert!(ForwardRelativePath::new("normalize/../bar").is_err());
    /// assert!(ForwardRelativePath::new("foo//bar").is_err());
    /// ```
    pub fn new<S: ?Sized + AsRef<str>>(s: &S) -> anyhow::Result<&ForwardRelativePath> {
        let s = s.as_ref();
        if s.starts_with('/') {
            return Err(ForwardRelativePathError::PathNotRelative(s.to_owned()).into());
        }
        if !s.is_empty() {
            for segment in s.split('/') {
                if segment.is_empty() || segment == "." || segment == ".." {
                    return Err(ForwardRelativePathError::PathNotNormalized(s.to_owned()).into());
                }
            }
        }
        Ok(ForwardRelativePath::ref_cast(s))
    }

    pub fn empty() -> &'static ForwardRelativePath {
        ForwardRelativePath::unchecked_new("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Creates an owned 'ForwardRelativePathBuf' with `path` adjoined to self.
    ///
    /// ```
    /// use anvil_core::fs::paths::{ForwardRelativePath, ForwardRelativePathBuf};
    ///
    /// let path = ForwardRelativePath::new("foo/bar")?;
    /// assert_eq!(
    ///     ForwardRelativePathBuf::unchecked_new("foo/bar/baz".into()),
    ///     path.join(ForwardRelativePath::new("baz")?)
    /// );
    /// assert_eq!(path.to_buf(), path.join(ForwardRelativePath::empty()));
    ///
    /// # anyhow::Ok(())
    /// ```
    pub fn join<P: AsRef<ForwardRelativePath>>(&self, path: P) -> ForwardRelativePathBuf {
        let path = path.as_ref();
        if self.is_empty() {
            path.to_buf()
        } else if path.is_empty() {
            self.to_buf()
        } else {
            ForwardRelativePathBuf(format!("{}/{}", &self.0, &path.0))
        }
    }

    /// Returns the path of the parent directory, if there is one.
    pub fn parent(&self) -> Option<&ForwardRelativePath> {
        if self.is_empty() {
            return None;
        }
        match self.0.rfind('/') {
            Some(i) => Some(ForwardRelativePath::unchecked_new(&self.0[..i])),
            None => Some(ForwardRelativePath::empty()),
        }
    }

    /// Returns the final component of the path, if there is one.
    pub fn file_name(&self) -> Option<&FileName> {
        if self.is_empty() {
            return None;
        }
        let name = match self.0.rfind('/') {
            Some(i) => &self.0[i + 1..],
            None => &self.0,
        };
        Some(FileName::unchecked_new(name))
    }

    /// Extracts the stem (non-extension) portion of the file name.
    pub fn file_stem(&self) -> Option<&str> {
        self.file_name().map(|n| n.file_stem())
    }

    /// Extracts the extension of the file name, if there is one.
    ///
    /// ```
    /// use anvil_core::fs::paths::ForwardRelativePath;
    ///
    /// assert_eq!(Some("rs"), ForwardRelativePath::new("hi/foo.rs")?.extension());
    ///
    /// # anyhow::Ok(())
    /// ```
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?.as_str();
        match name.rfind('.') {
            Some(i) if i > 0 => Some(&name[i + 1..]),
            _ => None,
        }
    }

    /// Returns a path that, when joined onto `base`, yields `self`.
    pub fn strip_prefix<P: ?Sized + AsRef<ForwardRelativePath>>(
        &self,
        base: &P,
    ) -> anyhow::Result<&ForwardRelativePath> {
        let base = base.as_ref();
        if base.is_empty() {
            return Ok(self);
        }
        if self.0 == base.0 {
            return Ok(ForwardRelativePath::empty());
        }
        match self.0.strip_prefix(&base.0) {
            Some(rest) if rest.starts_with('/') => Ok(ForwardRelativePath::unchecked_new(&rest[1..])),
            _ => Err(anyhow::anyhow!(
                "`{}` is not a prefix of `{}`",
                &base.0,
                &self.0
            )),
        }
    }

    pub fn starts_with<P: AsRef<ForwardRelativePath>>(&self, base: P) -> bool {
        self.strip_prefix(base.as_ref()).is_ok()
    }

    /// Whether the path string ends with the given suffix. This is a plain
    /// string comparison, used for extension-family checks such as
    /// `.dex.jar.xzs` where `extension()` is too coarse.
    pub fn ends_with_str(&self, suffix: &str) -> bool {
        self.0.ends_with(suffix)
    }

    /// Iterator over the components of this path.
    pub fn iter(&self) -> impl Iterator<Item = &FileName> {
        self.0
            .split('/')
            .filter(|s| !s.is_empty())
            .map(FileName::unchecked_new)
    }

    pub fn to_buf(&self) -> ForwardRelativePathBuf {
        ForwardRelativePathBuf(self.0.to_owned())
    }
}

impl ForwardRelativePathBuf {
    pub fn unchecked_new(s: String) -> Self {
        Self(s)
    }

    pub fn new(s: String) -> anyhow::Result<Self> {
        ForwardRelativePath::new(&s)?;
        Ok(Self(s))
    }

    pub fn push<P: AsRef<ForwardRelativePath>>(&mut self, path: P) {
        let path = path.as_ref();
        if path.is_empty() {
            return;
        }
        if !self.0.is_empty() {
            self.0.push('/');
        }
        self.0.push_str(path.as_str());
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<ForwardRelativePath> for ForwardRelativePath {
    fn as_ref(&self) -> &ForwardRelativePath {
        self
    }
}

impl AsRef<ForwardRelativePath> for ForwardRelativePathBuf {
    fn as_ref(&self) -> &ForwardRelativePath {
        ForwardRelativePath::unchecked_new(&self.0)
    }
}

impl Borrow<ForwardRelativePath> for ForwardRelativePathBuf {
    fn borrow(&self) -> &ForwardRelativePath {
        self.as_ref()
    }
}

impl Deref for ForwardRelativePathBuf {
    type Target = ForwardRelativePath;

    fn deref(&self) -> &ForwardRelativePath {
        ForwardRelativePath::unchecked_new(&self.0)
    }
}

impl ToOwned for ForwardRelativePath {
    type Owned = ForwardRelativePathBuf;

    fn to_owned(&self) -> ForwardRelativePathBuf {
        self.to_buf()
    }
}

impl<'a> TryFrom<&'a str> for &'a ForwardRelativePath {
    type Error = anyhow::Error;

    fn try_from(s: &'a str) -> anyhow::Result<&'a ForwardRelativePath> {
        ForwardRelativePath::new(s)
    }
}

impl TryFrom<String> for ForwardRelativePathBuf {
    type Error = anyhow::Error;

    fn try_from(s: String) -> anyhow::Result<ForwardRelativePathBuf> {
        ForwardRelativePathBuf::new(s)
    }
}

impl From<FileNameBuf> for ForwardRelativePathBuf {
    fn from(n: FileNameBuf) -> Self {
        ForwardRelativePathBuf(n.into_inner())
    }
}

impl Serialize for ForwardRelativePathBuf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ForwardRelativePathBuf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ForwardRelativePathBuf::new(s).map_err(serde::de::Error::custom)
    }
}

/// A single normalized path component, i.e. a directory or file name.
#[derive(Display, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, RefCast)]
#[repr(transparent)]
pub struct FileName(str);

/// The owned version of 'FileName'.
#[derive(Clone, Display, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileNameBuf(String);

impl FileName {
    pub fn unchecked_new<S: ?Sized + AsRef<str>>(s: &S) -> &Self {
        FileName::ref_cast(s.as_ref())
    }

    pub fn new<S: ?Sized + AsRef<str>>(s: &S) -> anyhow::Result<&FileName> {
        let s = s.as_ref();
        if s.is_empty() {
            return Err(FileNameError::Empty.into());
        }
        if s.contains('/') || s == "." || s == ".." {
            return Err(FileNameError::NotAComponent(s.to_owned()).into());
        }
        Ok(FileName::ref_cast(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_stem(&self) -> &str {
        match self.0.rfind('.') {
            Some(i) if i > 0 => &self.0[..i],
            _ => &self.0,
        }
    }

    pub fn to_buf(&self) -> FileNameBuf {
        FileNameBuf(self.0.to_owned())
    }
}

impl FileNameBuf {
    pub fn unchecked_new(s: String) -> Self {
        Self(s)
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<ForwardRelativePath> for FileName {
    fn as_ref(&self) -> &ForwardRelativePath {
        ForwardRelativePath::unchecked_new(&self.0)
    }
}

impl AsRef<ForwardRelativePath> for FileNameBuf {
    fn as_ref(&self) -> &ForwardRelativePath {
        ForwardRelativePath::unchecked_new(&self.0)
    }
}

impl Borrow<FileName> for FileNameBuf {
    fn borrow(&self) -> &FileName {
        FileName::unchecked_new(&self.0)
    }
}

impl Deref for FileNameBuf {
    type Target = FileName;

    fn deref(&self) -> &FileName {
        FileName::unchecked_new(&self.0)
    }
}

impl ToOwned for FileName {
    type Owned = FileNameBuf;

    fn to_owned(&self) -> FileNameBuf {
        self.to_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_relative_path_validation() {
        assert!(ForwardRelativePath::new("foo/bar.txt").is_ok());
        assert!(ForwardRelativePath::new("").is_ok());
        assert!(ForwardRelativePath::new("/foo").is_err());
        assert!(ForwardRelativePath::new("foo/").is_err());
        assert!(ForwardRelativePath::new("foo/../bar").is_err());
        assert!(ForwardRelativePath::new("./foo").is_err());
    }

    #[test]
    fn join_and_parent() -> anyhow::Result<()> {
        let p = ForwardRelativePath::new("foo/bar")?;
        assert_eq!("foo/bar/baz", p.join(ForwardRelativePath::new("baz")?).as_str());
        assert_eq!(Some(ForwardRelativePath::new("foo")?), p.parent());
        assert_eq!(
            Some(ForwardRelativePath::empty()),
            ForwardRelativePath::new("foo")?.parent()
        );
        assert_eq!(None, ForwardRelativePath::empty().parent());
        Ok(())
    }

    #[test]
    fn file_name_and_extension() -> anyhow::Result<()> {
        let p = ForwardRelativePath::new("foo/classes.dex.jar")?;
        assert_eq!(Some(FileName::new("classes.dex.jar")?), p.file_name());
        assert_eq!(Some("jar"), p.extension());
        assert!(p.ends_with_str(".dex.jar"));
        assert_eq!("classes.dex", p.file_name().unwrap().file_stem());
        Ok(())
    }

    #[test]
    fn strip_prefix() -> anyhow::Result<()> {
        let p = ForwardRelativePath::new("test/haha/foo.txt")?;
        assert_eq!(
            p.strip_prefix(ForwardRelativePath::new("test")?)?,
            ForwardRelativePath::new("haha/foo.txt")?
        );
        assert!(p.strip_prefix(ForwardRelativePath::new("asdf")?).is_err());
        assert!(p.strip_prefix(ForwardRelativePath::new("test/ha")?).is_err());
        Ok(())
    }

    #[test]
    fn paths_work_in_maps() -> anyhow::Result<()> {
        let mut map = std::collections::HashMap::new();
        let p1 = ForwardRelativePath::new("foo")?;
        let p2 = ForwardRelativePath::new("bar")?;
        map.insert(p1.to_buf(), p2.to_buf());
        assert_eq!(Some(p2), map.get(p1).map(|p| p.as_ref()));
        Ok(())
    }
}
