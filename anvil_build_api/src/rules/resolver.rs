/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The rule resolver: an append-only index from build target to build rule,
//! grown during DAG assembly and frozen read-only before execution begins.
//!
//! `require_rule` memoizes description invocations, so each target is
//! materialized at most once per build. Cycles are detected as the walk
//! encounters a target currently on the assembly stack; they are fatal and
//! reported with the full cycle path.

use std::sync::Arc;

use gazebo::prelude::*;
use indexmap::IndexMap;
use indexmap::IndexSet;

use anvil_core::target::BuildTarget;
use anvil_node::nodes::TargetNode;

use crate::rules::known_rule_types::KnownRuleTypes;
use crate::rules::AssemblyError;
use crate::rules::BuildRule;

pub struct BuildRuleResolver {
    known: Arc<KnownRuleTypes>,
    nodes: IndexMap<BuildTarget, TargetNode>,
    rules: IndexMap<BuildTarget, Arc<dyn BuildRule>>,
    assembling: Vec<BuildTarget>,
}

impl BuildRuleResolver {
    pub fn new(
        known: Arc<KnownRuleTypes>,
        nodes: impl IntoIterator<Item = TargetNode>,
    ) -> anyhow::Result<Self> {
        let mut node_index = IndexMap::new();
        for node in nodes {
            let target = node.target().dupe();
            if node_index.insert(target.dupe(), node).is_some() {
                return Err(AssemblyError::DuplicateTarget(target).into());
            }
        }
        Ok(BuildRuleResolver {
            known,
            nodes: node_index,
            rules: IndexMap::new(),
            assembling: Vec::new(),
        })
    }

    /// Registers a rule. Descriptions use this for the auxiliary rules they
    /// synthesize; the resolver uses it for the rules descriptions return.
    pub fn add_to_index(&mut self, rule: Arc<dyn BuildRule>) -> anyhow::Result<()> {
        let target = rule.build_target().dupe();
        if self.rules.insert(target.dupe(), rule).is_some() {
            return Err(AssemblyError::DuplicateTarget(target).into());
        }
        Ok(())
    }

    pub fn get_rule(&self, target: &BuildTarget) -> Option<Arc<dyn BuildRule>> {
        self.rules.get(target).map(|rule| rule.dupe())
    }

    /// Returns the rule for `target`, invoking its description first if it
    /// has not been materialized yet.
    pub fn require_rule(&mut self, target: &BuildTarget) -> anyhow::Result<Arc<dyn BuildRule>> {
        if let Some(rule) = self.rules.get(target) {
            return Ok(rule.dupe());
        }
        if let Some(position) = self.assembling.iter().position(|t| t == target) {
            let mut cycle: Vec<BuildTarget> = self.assembling[position..].to_vec();
            cycle.push(target.dupe());
            return Err(AssemblyError::DependencyCycle { cycle }.into());
        }
        let node = self
            .nodes
            .get(target)
            .ok_or_else(|| AssemblyError::UnknownTarget(target.dupe()))?
            .dupe();
        let known = self.known.dupe();

        self.assembling.push(target.dupe());
        let result = known.create(node.rule_type(), target, node.raw_attrs().clone(), self);
        self.assembling.pop();
        let rule = result?;

        self.add_to_index(rule.dupe())?;
        Ok(rule)
    }

    /// Resolves all of the given targets, preserving caller order.
    pub fn get_all_rules<'a>(
        &mut self,
        targets: impl IntoIterator<Item = &'a BuildTarget>,
    ) -> anyhow::Result<Vec<Arc<dyn BuildRule>>> {
        let mut rules = Vec::new();
        for target in targets {
            rules.push(self.require_rule(target)?);
        }
        Ok(rules)
    }

    /// Ends assembly. The snapshot is read-only and shareable across
    /// threads; nothing can be added once frozen.
    pub fn freeze(self) -> FrozenRuleResolver {
        FrozenRuleResolver { rules: self.rules }
    }
}

/// The read-only snapshot of an assembled rule index.
pub struct FrozenRuleResolver {
    rules: IndexMap<BuildTarget, Arc<dyn BuildRule>>,
}

impl FrozenRuleResolver {
    pub fn get_rule(&self, target: &BuildTarget) -> Option<Arc<dyn BuildRule>> {
        self.rules.get(target).map(|rule| rule.dupe())
    }

    pub fn rules(&self) -> impl Iterator<Item = &Arc<dyn BuildRule>> {
        self.rules.values()
    }

    /// The transitive dependency closure of `roots`, in depth-first
    /// discovery order. Every reachable target must have a materialized
    /// rule.
    pub fn transitive_closure(
        &self,
        roots: &[BuildTarget],
    ) -> anyhow::Result<Vec<Arc<dyn BuildRule>>> {
        let mut visited: IndexSet<BuildTarget> = IndexSet::new();
        let mut stack: Vec<BuildTarget> = roots.iter().rev().map(|t| t.dupe()).collect();
        let mut result = Vec::new();
        while let Some(target) = stack.pop() {
            if !visited.insert(target.dupe()) {
                continue;
            }
            let rule = self
                .get_rule(&target)
                .ok_or_else(|| AssemblyError::UnknownTarget(target.dupe()))?;
            for dep in rule
                .declared_deps()
                .iter()
                .chain(rule.extra_deps())
                .rev()
            {
                if !visited.contains(dep) {
                    stack.push(dep.dupe());
                }
            }
            result.push(rule);
        }
        Ok(result)
    }
}
