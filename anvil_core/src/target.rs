/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A 'BuildTarget' uniquely identifies a rule in the build graph: the
//! 'Package' defined by the build file that contains it, the 'TargetName'
//! given to it, and an ordered set of 'Flavor's selecting a variant of the
//! base target. Two targets with the same base but different flavor sets are
//! distinct rules.
//!
//! The canonical textual form is `cell//package/path:name#flavor1,flavor2`,
//! flavors sorted ascending. This form is what rule keys hash, so it must be
//! stable.

use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

use gazebo::prelude::*;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

use crate::fs::paths::ForwardRelativePath;
use crate::package::Package;

#[derive(Error, Debug)]
enum TargetError {
    #[error("invalid target name `{0}`: must be non-empty and contain only `A-Za-z0-9_.-`")]
    InvalidName(String),
    #[error("invalid flavor `{0}`: must be non-empty and contain only `a-z0-9_.-`")]
    InvalidFlavor(String),
    #[error("target literal `{0}` is missing a `:` separating package and name")]
    MissingNameSeparator(String),
}

/// The name given to a particular target within a package, e.g. the `baz` of
/// `fbcode//foo/bar:baz`.
#[derive(Clone, Debug, derive_more::Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TargetName(Arc<str>);

impl Dupe for TargetName {}

impl TargetName {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(TargetError::InvalidName(name.to_owned()).into());
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn unchecked_new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A small tag that selects a variant of a base target, e.g. `binary` in
/// `//foo:test#binary`.
#[derive(Clone, Debug, derive_more::Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Flavor(Arc<str>);

impl Dupe for Flavor {}

impl Flavor {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' || c == '.')
        {
            return Err(TargetError::InvalidFlavor(name.to_owned()).into());
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn unchecked_new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A canonically sorted set of flavors.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct FlavorSet(Arc<BTreeSet<Flavor>>);

impl Dupe for FlavorSet {}

impl FlavorSet {
    pub fn empty() -> Self {
        Self(Arc::new(BTreeSet::new()))
    }

    pub fn of(flavors: impl IntoIterator<Item = Flavor>) -> Self {
        Self(Arc::new(flavors.into_iter().collect()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, flavor: &Flavor) -> bool {
        self.0.contains(flavor)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flavor> {
        self.0.iter()
    }

    fn with(&self, flavor: Flavor) -> Self {
        let mut set: BTreeSet<Flavor> = (*self.0).clone();
        set.insert(flavor);
        Self(Arc::new(set))
    }
}

impl Display for FlavorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, flavor) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", flavor)?;
        }
        Ok(())
    }
}

/// A fully qualified build target: package, name and flavors.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BuildTarget(Arc<BuildTargetData>);

impl Dupe for BuildTarget {}

#[derive(Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
struct BuildTargetData {
    pkg: Package,
    name: TargetName,
    flavors: FlavorSet,
}

impl BuildTarget {
    pub fn new(pkg: Package, name: TargetName) -> Self {
        Self::with_flavors(pkg, name, FlavorSet::empty())
    }

    pub fn with_flavors(pkg: Package, name: TargetName, flavors: FlavorSet) -> Self {
        BuildTarget(Arc::new(BuildTargetData { pkg, name, flavors }))
    }

    pub fn pkg(&self) -> &Package {
        &self.0.pkg
    }

    pub fn name(&self) -> &TargetName {
        &self.0.name
    }

    pub fn flavors(&self) -> &FlavorSet {
        &self.0.flavors
    }

    pub fn is_flavored(&self) -> bool {
        !self.0.flavors.is_empty()
    }

    /// The same base target with `flavor` added to the flavor set. This is
    /// how descriptions mint targets for the auxiliary rules they synthesize.
    pub fn with_flavor(&self, flavor: Flavor) -> BuildTarget {
        BuildTarget(Arc::new(BuildTargetData {
            pkg: self.0.pkg.dupe(),
            name: self.0.name.dupe(),
            flavors: self.0.flavors.with(flavor),
        }))
    }

    pub fn unflavored(&self) -> BuildTarget {
        if !self.is_flavored() {
            return self.dupe();
        }
        BuildTarget(Arc::new(BuildTargetData {
            pkg: self.0.pkg.dupe(),
            name: self.0.name.dupe(),
            flavors: FlavorSet::empty(),
        }))
    }

    /// Parses the canonical `cell//path:name#flavors` form.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let (base, flavors) = match s.split_once('#') {
            Some((base, flavors)) => (base, Some(flavors)),
            None => (s, None),
        };
        let (pkg, name) = base
            .rsplit_once(':')
            .ok_or_else(|| TargetError::MissingNameSeparator(s.to_owned()))?;
        let pkg = crate::cells::CellPath::parse(pkg)?;
        let mut target = BuildTarget::new(Package::from_cell_path(&pkg), TargetName::new(name)?);
        if let Some(flavors) = flavors {
            let mut set = BTreeSet::new();
            for flavor in flavors.split(',') {
                set.insert(Flavor::new(flavor)?);
            }
            target = BuildTarget::with_flavors(
                target.pkg().dupe(),
                target.name().dupe(),
                FlavorSet(Arc::new(set)),
            );
        }
        Ok(target)
    }

    /// A file-name-safe rendering of `name#flavors`, used when laying this
    /// target's outputs out on disk.
    pub fn output_dir_name(&self) -> anyhow::Result<crate::fs::paths::ForwardRelativePathBuf> {
        let name = if self.is_flavored() {
            format!("{}#{}", self.0.name, self.0.flavors)
        } else {
            self.0.name.to_string()
        };
        Ok(ForwardRelativePath::new(&name)?.to_buf())
    }
}

impl Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.pkg, self.0.name)?;
        if !self.0.flavors.is_empty() {
            write!(f, "#{}", self.0.flavors)?;
        }
        Ok(())
    }
}

impl Serialize for BuildTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BuildTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BuildTarget::parse(&s).map_err(serde::de::Error::custom)
    }
}

pub mod testing {
    use crate::target::BuildTarget;

    pub trait BuildTargetExt {
        /// Parses a target literal for tests, panicking on malformed input.
        fn testing_parse(target: &str) -> BuildTarget {
            BuildTarget::parse(target).unwrap()
        }
    }
    impl BuildTargetExt for BuildTarget {}
}
