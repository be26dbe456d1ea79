/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Build rules and their assembly.
//!
//! A 'BuildRule' is an immutable node of the build DAG, created by a
//! 'Description' from a validated attribute bag during assembly and read
//! only from then on. A rule knows its dependencies as build targets, how to
//! contribute to its rule key, and how to materialize the ordered list of
//! steps that produce its outputs.

use std::any::Any;
use std::fmt::Debug;

use indexmap::IndexSet;
use thiserror::Error;

use anvil_core::fs::project::ProjectRelativePathBuf;
use anvil_core::target::BuildTarget;
use anvil_execute::step::Step;
use anvil_node::rule_type::RuleType;

use crate::context::BuildContext;
use crate::rule_key::RuleKeyBuilder;

pub mod description;
pub mod known_rule_types;
pub mod resolver;
pub mod testing;

fn cycle_string(cycle: &[BuildTarget]) -> String {
    cycle
        .iter()
        .map(|target| target.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("multiple rules registered for target `{0}`")]
    DuplicateTarget(BuildTarget),
    #[error("multiple descriptions with rule type `{0}`")]
    DuplicateRuleType(RuleType),
    #[error("unable to find build rule type: {0}")]
    UnknownRuleType(String),
    #[error("no target named `{0}` exists")]
    UnknownTarget(BuildTarget),
    #[error("dependency cycle detected: {}", cycle_string(.cycle))]
    DependencyCycle { cycle: Vec<BuildTarget> },
}

/// Collects the output paths a rule's steps promise to produce, so the
/// engine knows what to record in the action cache and what to expect on
/// disk after execution.
#[derive(Debug, Default)]
pub struct BuildableContext {
    recorded: IndexSet<ProjectRelativePathBuf>,
}

impl BuildableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_artifact(&mut self, path: ProjectRelativePathBuf) {
        self.recorded.insert(path);
    }

    pub fn recorded_artifacts(&self) -> &IndexSet<ProjectRelativePathBuf> {
        &self.recorded
    }
}

pub trait BuildRule: Debug + Send + Sync + 'static {
    fn build_target(&self) -> &BuildTarget;

    fn rule_type(&self) -> &RuleType;

    /// Dependencies declared by the rule's attributes.
    fn declared_deps(&self) -> &[BuildTarget];

    /// Dependencies injected beyond the declared ones (e.g. a synthesized
    /// sibling the rule's outputs feed off).
    fn extra_deps(&self) -> &[BuildTarget] {
        &[]
    }

    /// Appends everything that can affect this rule's outputs. The rule's
    /// type and canonical target are already hashed by the factory.
    fn append_to_rule_key(&self, builder: &mut RuleKeyBuilder) -> anyhow::Result<()>;

    /// The ordered steps that produce this rule's outputs, recording the
    /// produced paths into `buildable`.
    fn build_steps(
        &self,
        ctx: &BuildContext,
        buildable: &mut BuildableContext,
    ) -> anyhow::Result<Vec<Box<dyn Step>>>;

    /// The rule's primary output, if it has one. This is what a
    /// build-target source without an explicit output name resolves to.
    fn output_path(&self) -> Option<ProjectRelativePathBuf> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}
