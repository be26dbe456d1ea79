/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use anvil_core::config::Config;
use anvil_core::target::BuildTarget;
use anvil_node::attrs::AttrBag;
use anvil_node::attrs::AttributeSpec;
use anvil_node::rule_type::RuleType;

use crate::rules::resolver::BuildRuleResolver;
use crate::rules::BuildRule;

/// The factory and schema for one rule type: how `python_test` (say)
/// becomes one or more build rules.
///
/// `create_rule` receives the coerced attribute bag (unknown attributes
/// already rejected, defaults filled) and the resolver, through which it may
/// require dependency rules and register auxiliary rules it synthesizes
/// (typically under fresh flavors of the same base target). The rule it
/// returns is indexed by the resolver itself; descriptions must not add it.
pub trait Description: Send + Sync + 'static {
    fn rule_type(&self) -> &RuleType;

    fn attribute_spec(&self) -> &AttributeSpec;

    fn create_rule(
        &self,
        target: &BuildTarget,
        args: &AttrBag,
        resolver: &mut BuildRuleResolver,
    ) -> anyhow::Result<Arc<dyn BuildRule>>;
}

impl std::fmt::Debug for dyn Description {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Description").field(self.rule_type()).finish()
    }
}

/// An extension point: plugins provide additional descriptions, constructed
/// against the build configuration, and are scanned once at startup when
/// the known-rule-types registry is created.
pub trait DescriptionProvider: Send + Sync {
    fn descriptions(&self, config: &Config) -> anyhow::Result<Vec<Arc<dyn Description>>>;
}
