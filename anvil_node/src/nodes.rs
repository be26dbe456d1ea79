/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A 'TargetNode' is a target as declared: its build target, the name of the
//! rule type, and the raw attribute values from the build file. Nodes are
//! what the rule resolver materializes into build rules by invoking the rule
//! type's description.

use std::sync::Arc;

use gazebo::prelude::*;
use indexmap::IndexMap;

use anvil_core::target::BuildTarget;

use crate::attrs::value::AttrValue;
use crate::rule_type::RuleType;

#[derive(Clone, Debug)]
pub struct TargetNode(Arc<TargetNodeData>);

impl Dupe for TargetNode {}

#[derive(Debug)]
struct TargetNodeData {
    target: BuildTarget,
    rule_type: RuleType,
    attrs: IndexMap<String, AttrValue>,
}

impl TargetNode {
    pub fn new(
        target: BuildTarget,
        rule_type: RuleType,
        attrs: IndexMap<String, AttrValue>,
    ) -> Self {
        TargetNode(Arc::new(TargetNodeData {
            target,
            rule_type,
            attrs,
        }))
    }

    pub fn target(&self) -> &BuildTarget {
        &self.0.target
    }

    pub fn rule_type(&self) -> &RuleType {
        &self.0.rule_type
    }

    pub fn raw_attrs(&self) -> &IndexMap<String, AttrValue> {
        &self.0.attrs
    }
}
