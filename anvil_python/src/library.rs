/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::any::Any;
use std::sync::Arc;

use gazebo::prelude::*;
use once_cell::sync::Lazy;
use thiserror::Error;

use anvil_build_api::context::BuildContext;
use anvil_build_api::rule_key::RuleKeyBuilder;
use anvil_build_api::rules::description::Description;
use anvil_build_api::rules::resolver::BuildRuleResolver;
use anvil_build_api::rules::BuildRule;
use anvil_build_api::rules::BuildableContext;
use anvil_core::target::BuildTarget;
use anvil_execute::step::Step;
use anvil_node::attrs::AttrBag;
use anvil_node::attrs::Attribute;
use anvil_node::attrs::AttributeSpec;
use anvil_node::rule_type::RuleType;

use crate::binary::PythonPackageComponents;
use crate::util;

pub static PYTHON_LIBRARY: Lazy<RuleType> = Lazy::new(|| RuleType::new("python_library"));

#[derive(Error, Debug)]
pub enum PythonDepError {
    #[error(
        "`{target}`: dependency `{dep}` is a `{actual}` where a python_library was expected"
    )]
    NotAPythonLibrary {
        target: BuildTarget,
        dep: BuildTarget,
        actual: RuleType,
    },
}

/// A library of python modules and resources. Contributes no steps of its
/// own; binaries that depend on it package its components.
#[derive(Debug)]
pub struct PythonLibrary {
    target: BuildTarget,
    components: PythonPackageComponents,
    deps: Vec<BuildTarget>,
}

impl PythonLibrary {
    pub fn components(&self) -> &PythonPackageComponents {
        &self.components
    }
}

impl BuildRule for PythonLibrary {
    fn build_target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &RuleType {
        &PYTHON_LIBRARY
    }

    fn declared_deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn append_to_rule_key(&self, builder: &mut RuleKeyBuilder) -> anyhow::Result<()> {
        self.components.append_to_rule_key(builder)?;
        for dep in &self.deps {
            builder.set_string("dep", &dep.to_string())?;
        }
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

/// Collects the package components of `deps`, which must all be python
/// libraries, merged with duplicate-destination detection.
pub fn gather_dep_components(
    target: &BuildTarget,
    deps: &[BuildTarget],
    resolver: &mut BuildRuleResolver,
) -> anyhow::Result<PythonPackageComponents> {
    let mut components = PythonPackageComponents::default();
    for dep in deps {
        let rule = resolver.require_rule(dep)?;
        let library = rule.as_any().downcast_ref::<PythonLibrary>().ok_or_else(|| {
            PythonDepError::NotAPythonLibrary {
                target: target.dupe(),
                dep: dep.dupe(),
                actual: rule.rule_type().dupe(),
            }
        })?;
        components.merge(target, library.components())?;
    }
    Ok(components)
}

pub struct PythonLibraryDescription {
    spec: AttributeSpec,
}

impl PythonLibraryDescription {
    pub fn new() -> Self {
        PythonLibraryDescription {
            spec: library_attribute_spec(),
        }
    }
}

impl Default for PythonLibraryDescription {
    fn default() -> Self {
        Self::new()
    }
}

/// The attributes shared by every rule in the python family.
pub(crate) fn library_attribute_spec() -> AttributeSpec {
    AttributeSpec::new(vec![
        ("srcs", Attribute::optional()),
        ("resources", Attribute::optional()),
        ("base_module", Attribute::optional()),
        ("deps", Attribute::optional()),
    ])
    .unwrap()
}

/// Builds the module and resource maps for any python-family rule.
pub(crate) fn components_from_args(
    target: &BuildTarget,
    args: &AttrBag,
) -> anyhow::Result<PythonPackageComponents> {
    let base = util::base_path(target, args.get_opt_string("base_module")?);
    Ok(PythonPackageComponents {
        modules: util::to_module_map(target, "srcs", &base, args.get_dict("srcs")?)?,
        resources: util::to_module_map(target, "resources", &base, args.get_dict("resources")?)?,
    })
}

impl Description for PythonLibraryDescription {
    fn rule_type(&self) -> &RuleType {
        &PYTHON_LIBRARY
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
        // Materialize (and so validate) the deps eagerly.
        gather_dep_components(target, &deps, resolver)?;
        Ok(Arc::new(PythonLibrary {
            target: target.dupe(),
            components: components_from_args(target, args)?,
            deps,
        }))
    }
}
