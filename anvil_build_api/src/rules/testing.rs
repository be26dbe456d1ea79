/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Minimal rule and description implementations for tests: a rule with no
//! steps, and a description whose only behavior is requiring its `deps`.

use std::any::Any;
use std::sync::Arc;

use gazebo::prelude::*;
use indexmap::IndexMap;
use once_cell::sync::Lazy;

use anvil_core::target::BuildTarget;
use anvil_execute::step::Step;
use anvil_node::attrs::value::AttrValue;
use anvil_node::attrs::AttrBag;
use anvil_node::attrs::Attribute;
use anvil_node::attrs::AttributeSpec;
use anvil_node::nodes::TargetNode;
use anvil_node::rule_type::RuleType;

use crate::context::BuildContext;
use crate::rule_key::RuleKeyBuilder;
use crate::rules::description::Description;
use crate::rules::resolver::BuildRuleResolver;
use crate::rules::BuildRule;
use crate::rules::BuildableContext;

static TESTING_RULE_TYPE: Lazy<RuleType> = Lazy::new(|| RuleType::new("testing_rule"));

#[derive(Debug)]
pub struct TestingRule {
    target: BuildTarget,
    rule_type: RuleType,
    deps: Vec<BuildTarget>,
}

impl TestingRule {
    pub fn arc(target: &str, deps: &[&str]) -> Arc<dyn BuildRule> {
        Arc::new(TestingRule {
            target: BuildTarget::parse(target).unwrap(),
            rule_type: TESTING_RULE_TYPE.dupe(),
            deps: deps.iter().map(|d| BuildTarget::parse(d).unwrap()).collect(),
        })
    }
}

impl BuildRule for TestingRule {
    fn build_target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &RuleType {
        &self.rule_type
    }

    fn declared_deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn append_to_rule_key(&self, builder: &mut RuleKeyBuilder) -> anyhow::Result<()> {
        builder.set_attr(
            "deps",
            &AttrValue::Targets(self.deps.iter().map(|d| d.dupe()).collect()),
        )?;
        Ok(())
    }

    fn build_steps(
        &self,
        _ctx: &BuildContext,
        _buildable: &mut BuildableContext,
    ) -> anyhow::Result<Vec<Box<dyn Step>>> {
        Ok(Vec::new())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct TestingDescription {
    rule_type: RuleType,
    spec: AttributeSpec,
}

impl TestingDescription {
    pub fn arc(rule_type: &str) -> Arc<dyn Description> {
        Arc::new(TestingDescription {
            rule_type: RuleType::new(rule_type),
            spec: AttributeSpec::new(vec![("deps", Attribute::optional())]).unwrap(),
        })
    }
}

impl Description for TestingDescription {
    fn rule_type(&self) -> &RuleType {
        &self.rule_type
    }

    fn attribute_spec(&self) -> &AttributeSpec {
        &self.spec
    }

    fn create_rule(
        &self,
        target: &BuildTarget,
        args: &AttrBag,
        resolver: &mut BuildRuleResolver,
    ) -> anyhow::Result<Arc<dyn BuildRule>> {
        let deps: Vec<BuildTarget> = args.get_targets("deps")?.iter().map(|t| t.dupe()).collect();
        resolver.get_all_rules(deps.iter())?;
        Ok(Arc::new(TestingRule {
            target: target.dupe(),
            rule_type: self.rule_type.dupe(),
            deps,
        }))
    }
}

/// A `testing_rule` target node whose `deps` attribute is the given targets.
pub fn testing_node(target: &str, deps: &[&str]) -> TargetNode {
    let deps = AttrValue::Targets(deps.iter().map(|d| BuildTarget::parse(d).unwrap()).collect());
    TargetNode::new(
        BuildTarget::parse(target).unwrap(),
        TESTING_RULE_TYPE.dupe(),
        IndexMap::from([("deps".to_owned(), deps)]),
    )
}
