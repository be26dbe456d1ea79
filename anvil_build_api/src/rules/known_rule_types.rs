/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A registry of all the build rule types the build understands.

use std::sync::Arc;

use gazebo::prelude::*;
use indexmap::IndexMap;

use anvil_core::config::Config;
use anvil_core::target::BuildTarget;
use anvil_node::attrs::AttrValue;
use anvil_node::rule_type::RuleType;

use crate::rules::description::Description;
use crate::rules::description::DescriptionProvider;
use crate::rules::resolver::BuildRuleResolver;
use crate::rules::AssemblyError;
use crate::rules::BuildRule;

pub struct KnownRuleTypes {
    descriptions: IndexMap<RuleType, Arc<dyn Description>>,
}

impl std::fmt::Debug for KnownRuleTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownRuleTypes")
            .field("descriptions", &self.descriptions)
            .finish()
    }
}

impl KnownRuleTypes {
    /// Builds the registry, verifying that no two descriptions claim the
    /// same rule type.
    pub fn new(descriptions: Vec<Arc<dyn Description>>) -> anyhow::Result<Self> {
        let mut map = IndexMap::with_capacity(descriptions.len());
        for description in descriptions {
            let rule_type = description.rule_type().dupe();
            if map.insert(rule_type.dupe(), description).is_some() {
                return Err(AssemblyError::DuplicateRuleType(rule_type).into());
            }
        }
        Ok(KnownRuleTypes { descriptions: map })
    }

    /// Builds the registry from the given providers, scanned in order. This
    /// is how both the built-in rule families and plugins register.
    pub fn create_instance(
        config: &Config,
        providers: &[&dyn DescriptionProvider],
    ) -> anyhow::Result<Self> {
        let mut descriptions = Vec::new();
        for provider in providers {
            descriptions.extend(provider.descriptions(config)?);
        }
        Self::new(descriptions)
    }

    pub fn get_by_name(&self, name: &str) -> anyhow::Result<&Arc<dyn Description>> {
        self.descriptions
            .get(&RuleType::new(name))
            .ok_or_else(|| AssemblyError::UnknownRuleType(name.to_owned()).into())
    }

    pub fn get(&self, rule_type: &RuleType) -> anyhow::Result<&Arc<dyn Description>> {
        self.descriptions.get(rule_type).ok_or_else(|| {
            AssemblyError::UnknownRuleType(rule_type.name().to_owned()).into()
        })
    }

    pub fn rule_types(&self) -> impl Iterator<Item = &RuleType> {
        self.descriptions.keys()
    }

    /// Materializes one target: validates the raw attributes against the
    /// rule type's spec (unknown keys rejected, defaults filled) and
    /// invokes the description, which may register auxiliary rules through
    /// the resolver. The returned rule is not yet indexed.
    pub fn create(
        &self,
        rule_type: &RuleType,
        target: &BuildTarget,
        raw_attrs: IndexMap<String, AttrValue>,
        resolver: &mut BuildRuleResolver,
    ) -> anyhow::Result<Arc<dyn BuildRule>> {
        let description = self.get(rule_type)?.dupe();
        let args = description.attribute_spec().coerce(target, raw_attrs)?;
        description.create_rule(target, &args, resolver)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::rules::testing::TestingDescription;

    #[test]
    fn duplicate_rule_types_are_rejected() {
        let result = KnownRuleTypes::new(vec![
            TestingDescription::arc("some_rule"),
            TestingDescription::arc("some_rule"),
        ]);
        assert_matches!(result, Err(..));
    }

    #[test]
    fn unknown_rule_type_has_a_readable_error() {
        let known = KnownRuleTypes::new(vec![TestingDescription::arc("some_rule")]).unwrap();
        assert!(known.get_by_name("some_rule").is_ok());
        let err = known.get_by_name("no_such_rule").unwrap_err();
        assert_eq!(
            "unable to find build rule type: no_such_rule",
            err.to_string()
        );
    }
}
