/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! An 'Artifact' represents a file used as part of the build: either a file
//! in the source tree, or a file some rule's action generates.
//!
//! A generated artifact is first *declared* by a rule as a
//! 'DeclaredArtifact'. Marking it the output of a particular action (via
//! 'OutputArtifact') *binds* it; once bound it is a 'BuildArtifact'. Every
//! bound artifact is produced by exactly one action: binding the same
//! artifact to a second, different action is an assembly-time error.
//!
//! A bound artifact is identified by `(owning target, output path)`, never
//! by a reference to the producing rule. That back-edge-free representation
//! is what the rule-key hasher relies on to stay cycle free.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use derive_more::Display;
use gazebo::prelude::*;
use once_cell::sync::OnceCell;
use thiserror::Error;

use anvil_core::cells::CellPath;
use anvil_core::source_path::SourcePath;
use anvil_core::target::BuildTarget;

use crate::path::GenPath;

pub mod fs;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error(
        "artifact `{artifact}` was already bound to action `{bound_to}`, but attempted to bind \
         to action `{attempted}`"
    )]
    DuplicateBind {
        artifact: String,
        bound_to: ActionId,
        attempted: ActionId,
    },
    #[error(
        "artifact `{0}` should be bound by now. If it is intended as the output of an action, \
         was it declared as one?"
    )]
    UnboundArtifact(String),
}

/// Identifies one action of one rule: the owning target plus an ordinal
/// within that rule. Actions are what artifacts bind to.
#[derive(Clone, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[display(fmt = "{} (action {})", owner, id)]
pub struct ActionId {
    owner: BuildTarget,
    id: u32,
}

impl Dupe for ActionId {}

impl ActionId {
    pub fn new(owner: BuildTarget, id: u32) -> Self {
        ActionId { owner, id }
    }

    pub fn owner(&self) -> &BuildTarget {
        &self.owner
    }
}

/// A file in the source tree.
#[derive(Clone, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SourceArtifact(Arc<CellPath>);

impl Dupe for SourceArtifact {}

impl SourceArtifact {
    pub fn new(path: CellPath) -> Self {
        SourceArtifact(Arc::new(path))
    }

    pub fn get_path(&self) -> &CellPath {
        &self.0
    }
}

/// A generated file, bound to the action that produces it.
#[derive(Clone, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[display(fmt = "{}", path)]
pub struct BuildArtifact {
    path: Arc<GenPath>,
    key: ActionId,
}

impl Dupe for BuildArtifact {}

impl BuildArtifact {
    fn new(path: Arc<GenPath>, key: ActionId) -> Self {
        BuildArtifact { path, key }
    }

    pub fn get_path(&self) -> &GenPath {
        &self.path
    }

    pub fn key(&self) -> &ActionId {
        &self.key
    }

    /// The source-path form of this artifact: the producing target plus the
    /// output name. This, not the artifact's contents, is what rule keys see.
    pub fn as_source_path(&self) -> SourcePath {
        SourcePath::build_target_output(
            self.path.owner().dupe(),
            self.path.path().to_buf(),
        )
    }
}

/// An artifact declared by a rule, not necessarily bound to an action yet.
/// All declared artifacts must be bound by the time assembly finishes.
#[derive(Clone, Dupe, Debug)]
pub struct DeclaredArtifact {
    path: Arc<GenPath>,
    binding: Arc<OnceCell<ActionId>>,
}

impl DeclaredArtifact {
    pub fn new(path: GenPath) -> Self {
        DeclaredArtifact {
            path: Arc::new(path),
            binding: Arc::new(OnceCell::new()),
        }
    }

    pub fn get_path(&self) -> &GenPath {
        &self.path
    }

    /// Marks this artifact as an output of some action, to be bound later.
    pub fn as_output(&self) -> OutputArtifact {
        OutputArtifact(self.dupe())
    }

    pub fn is_bound(&self) -> bool {
        self.binding.get().is_some()
    }

    /// The bound form of this artifact, erroring if it was never bound.
    pub fn ensure_bound(&self) -> anyhow::Result<BuildArtifact> {
        match self.binding.get() {
            Some(key) => Ok(BuildArtifact::new(self.path.dupe(), key.dupe())),
            None => Err(ArtifactError::UnboundArtifact(self.path.to_string()).into()),
        }
    }
}

impl fmt::Display for DeclaredArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl Hash for DeclaredArtifact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state)
    }
}

impl PartialEq for DeclaredArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for DeclaredArtifact {}

/// An artifact marked as the output of a particular action.
#[derive(Clone, Dupe, Debug, Display, Hash, PartialEq, Eq)]
pub struct OutputArtifact(DeclaredArtifact);

impl OutputArtifact {
    /// Binds the underlying artifact to `key`. Binding twice to the same
    /// action is fine (an action can mention its output more than once);
    /// binding to a different action is an error.
    pub fn bind(&self, key: ActionId) -> anyhow::Result<BuildArtifact> {
        let bound = self.0.binding.get_or_init(|| key.dupe());
        if *bound != key {
            return Err(ArtifactError::DuplicateBind {
                artifact: self.0.path.to_string(),
                bound_to: bound.dupe(),
                attempted: key,
            }
            .into());
        }
        Ok(BuildArtifact::new(self.0.path.dupe(), key))
    }

    pub fn artifact(&self) -> &DeclaredArtifact {
        &self.0
    }
}

/// Any artifact: a source file or a (possibly still unbound) generated file.
#[derive(Clone, Dupe, Debug, Display, Hash, PartialEq, Eq)]
pub enum Artifact {
    Source(SourceArtifact),
    Build(DeclaredArtifact),
}

impl Artifact {
    pub fn is_source(&self) -> bool {
        matches!(self, Artifact::Source(_))
    }

    /// The source-path form of this artifact, used by rule keys and by
    /// late command-line stringification. Errors if a generated artifact
    /// was never bound to an action.
    pub fn as_source_path(&self) -> anyhow::Result<SourcePath> {
        match self {
            Artifact::Source(source) => Ok(SourcePath::path(source.get_path().clone())),
            Artifact::Build(declared) => Ok(declared.ensure_bound()?.as_source_path()),
        }
    }
}

impl From<SourceArtifact> for Artifact {
    fn from(artifact: SourceArtifact) -> Self {
        Artifact::Source(artifact)
    }
}

impl From<DeclaredArtifact> for Artifact {
    fn from(artifact: DeclaredArtifact) -> Self {
        Artifact::Build(artifact)
    }
}
