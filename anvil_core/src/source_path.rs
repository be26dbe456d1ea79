/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A 'SourcePath' is a typed reference to a file used as a rule input: either
//! a literal path in some cell, or the output of another build target.
//!
//! A build-target source is deliberately represented as `(target, output
//! name)` rather than as a reference to the producing rule. Rule keys hash
//! the canonical textual form of that pair and never recurse into the
//! producer, which is what keeps rule-key computation cycle free when a
//! rule's command line mentions an artifact the rule itself produces.

use std::fmt;
use std::fmt::Display;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::cells::CellPath;
use crate::fs::paths::ForwardRelativePath;
use crate::fs::paths::ForwardRelativePathBuf;
use crate::target::BuildTarget;

/// A reference to the output of another build target. `output` of `None`
/// refers to the target's default output.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BuildTargetSourcePath {
    target: BuildTarget,
    output: Option<ForwardRelativePathBuf>,
}

impl BuildTargetSourcePath {
    pub fn new(target: BuildTarget) -> Self {
        BuildTargetSourcePath {
            target,
            output: None,
        }
    }

    pub fn with_output(target: BuildTarget, output: ForwardRelativePathBuf) -> Self {
        BuildTargetSourcePath {
            target,
            output: Some(output),
        }
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    pub fn output(&self) -> Option<&ForwardRelativePath> {
        self.output.as_deref()
    }

    /// The form rule keys hash for this reference: the canonical target plus
    /// the output name. Never the output's contents.
    pub fn representation_for_rule_key(&self) -> String {
        self.to_string()
    }
}

impl Display for BuildTargetSourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output {
            Some(output) => write!(f, "{}[{}]", self.target, output),
            None => write!(f, "{}", self.target),
        }
    }
}

/// A typed reference to a source file.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum SourcePath {
    /// A literal file path relative to a cell root. Content-hashable.
    Path(CellPath),
    /// The output of another build target. Hashed by name, not content.
    BuildTarget(BuildTargetSourcePath),
}

impl SourcePath {
    pub fn path(cell_path: CellPath) -> Self {
        SourcePath::Path(cell_path)
    }

    pub fn build_target(target: BuildTarget) -> Self {
        SourcePath::BuildTarget(BuildTargetSourcePath::new(target))
    }

    pub fn build_target_output(target: BuildTarget, output: ForwardRelativePathBuf) -> Self {
        SourcePath::BuildTarget(BuildTargetSourcePath::with_output(target, output))
    }

    /// The producing target, if this is a build-target source.
    pub fn producing_target(&self) -> Option<&BuildTarget> {
        match self {
            SourcePath::Path(_) => None,
            SourcePath::BuildTarget(p) => Some(p.target()),
        }
    }

    /// Parses the textual rendering. A `:` distinguishes a target reference
    /// from a plain cell path.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        if s.contains(':') {
            let (target, output) = match s.strip_suffix(']') {
                Some(prefix) => match prefix.split_once('[') {
                    Some((target, output)) => (target, Some(output)),
                    None => (s, None),
                },
                None => (s, None),
            };
            let target = BuildTarget::parse(target)?;
            Ok(match output {
                Some(output) => SourcePath::build_target_output(
                    target,
                    ForwardRelativePath::new(output)?.to_buf(),
                ),
                None => SourcePath::build_target(target),
            })
        } else {
            Ok(SourcePath::Path(CellPath::parse(s)?))
        }
    }
}

impl Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePath::Path(p) => write!(f, "{}", p),
            SourcePath::BuildTarget(p) => write!(f, "{}", p),
        }
    }
}

impl Serialize for SourcePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourcePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SourcePath::parse(&s).map_err(serde::de::Error::custom)
    }
}
