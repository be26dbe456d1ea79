/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A validated attribute bag: every declared attribute present, in
//! declaration order, unknown keys already rejected. The typed accessors
//! default optional collections to empty rather than propagating absence.

use std::collections::BTreeSet;

use gazebo::prelude::*;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde::Serialize;

use anvil_core::fs::paths::ForwardRelativePathBuf;
use anvil_core::source_path::SourcePath;
use anvil_core::target::BuildTarget;

use crate::attrs::spec::AttrCoercionError;
use crate::attrs::value::AttrValue;

static EMPTY_DICT: Lazy<IndexMap<ForwardRelativePathBuf, SourcePath>> = Lazy::new(IndexMap::new);
static EMPTY_STRING_SET: Lazy<BTreeSet<String>> = Lazy::new(BTreeSet::new);
static EMPTY_TARGETS: Lazy<BTreeSet<BuildTarget>> = Lazy::new(BTreeSet::new);

/// The coerced attributes of one target.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttrBag {
    target: BuildTarget,
    values: IndexMap<String, AttrValue>,
}

impl AttrBag {
    pub(crate) fn new(target: BuildTarget, values: IndexMap<String, AttrValue>) -> Self {
        AttrBag { target, values }
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    /// Attributes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn get(&self, name: &str) -> anyhow::Result<&AttrValue> {
        self.values.get(name).ok_or_else(|| {
            AttrCoercionError::UnknownAttribute {
                target: self.target.dupe(),
                attr: name.to_owned(),
            }
            .into()
        })
    }

    fn wrong_type(&self, name: &str, expected: &'static str, value: &AttrValue) -> anyhow::Error {
        AttrCoercionError::WrongType {
            target: self.target.dupe(),
            attr: name.to_owned(),
            expected,
            actual: value.type_name(),
        }
        .into()
    }

    pub fn get_string(&self, name: &str) -> anyhow::Result<&str> {
        match self.get(name)? {
            AttrValue::String(s) => Ok(s),
            other => Err(self.wrong_type(name, "string", other)),
        }
    }

    pub fn get_opt_string(&self, name: &str) -> anyhow::Result<Option<&str>> {
        match self.get(name)? {
            AttrValue::String(s) => Ok(Some(s)),
            AttrValue::None => Ok(None),
            other => Err(self.wrong_type(name, "string", other)),
        }
    }

    /// Absent reads as the empty map.
    pub fn get_dict(
        &self,
        name: &str,
    ) -> anyhow::Result<&IndexMap<ForwardRelativePathBuf, SourcePath>> {
        match self.get(name)? {
            AttrValue::Dict(d) => Ok(d),
            AttrValue::None => Ok(&EMPTY_DICT),
            other => Err(self.wrong_type(name, "dict", other)),
        }
    }

    /// Absent reads as the empty set.
    pub fn get_string_set(&self, name: &str) -> anyhow::Result<&BTreeSet<String>> {
        match self.get(name)? {
            AttrValue::StringSet(s) => Ok(s),
            AttrValue::None => Ok(&EMPTY_STRING_SET),
            other => Err(self.wrong_type(name, "string_set", other)),
        }
    }

    /// Absent reads as the empty set.
    pub fn get_targets(&self, name: &str) -> anyhow::Result<&BTreeSet<BuildTarget>> {
        match self.get(name)? {
            AttrValue::Targets(t) => Ok(t),
            AttrValue::None => Ok(&EMPTY_TARGETS),
            other => Err(self.wrong_type(name, "targets", other)),
        }
    }

    /// Every target any attribute refers to, in attribute declaration order.
    pub fn declared_deps(&self) -> Vec<BuildTarget> {
        let mut deps = Vec::new();
        for (_, value) in self.iter() {
            value.traverse_targets(|t| {
                if !deps.contains(t) {
                    deps.push(t.dupe());
                }
            });
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use anvil_core::target::testing::BuildTargetExt;
    use assert_matches::assert_matches;

    use super::*;
    use crate::attrs::spec::Attribute;
    use crate::attrs::spec::AttributeSpec;

    fn bag() -> AttrBag {
        let spec = AttributeSpec::new(vec![
            ("srcs", Attribute::optional()),
            ("contacts", Attribute::optional()),
            ("main_module", Attribute::required()),
        ])
        .unwrap();
        spec.coerce(
            &BuildTarget::testing_parse("cell//a:b"),
            IndexMap::from([("main_module".to_owned(), AttrValue::String("m".into()))]),
        )
        .unwrap()
    }

    #[test]
    fn optional_collections_default_to_empty() -> anyhow::Result<()> {
        let bag = bag();
        assert!(bag.get_dict("srcs")?.is_empty());
        assert!(bag.get_string_set("contacts")?.is_empty());
        assert_eq!("m", bag.get_string("main_module")?);
        Ok(())
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let bag = bag();
        let err = bag.get_dict("main_module").unwrap_err();
        assert!(err.to_string().contains("has type `string` where `dict`"));
        assert_matches!(bag.get_string("srcs"), Err(..));
    }

    #[test]
    fn declared_deps_walks_every_attribute() -> anyhow::Result<()> {
        use anvil_core::fs::paths::ForwardRelativePathBuf;
        use anvil_core::source_path::SourcePath;

        let spec = AttributeSpec::new(vec![
            ("srcs", Attribute::optional()),
            ("deps", Attribute::optional()),
        ])?;
        let gen_target = BuildTarget::testing_parse("cell//pkg:gen");
        let dep_target = BuildTarget::testing_parse("cell//other:lib");
        let bag = spec.coerce(
            &BuildTarget::testing_parse("cell//a:b"),
            IndexMap::from([
                (
                    "srcs".to_owned(),
                    AttrValue::Dict(IndexMap::from([(
                        ForwardRelativePathBuf::unchecked_new("gen.py".into()),
                        SourcePath::build_target(gen_target.clone()),
                    )])),
                ),
                (
                    "deps".to_owned(),
                    AttrValue::Targets([dep_target.clone()].into()),
                ),
            ]),
        )?;
        assert_eq!(vec![gen_target, dep_target], bag.declared_deps());
        Ok(())
    }

    #[test]
    fn serde_round_trip_preserves_declaration_order() -> anyhow::Result<()> {
        let bag = bag();
        let json = serde_json::to_string(&bag)?;
        let restored: AttrBag = serde_json::from_str(&json)?;
        assert_eq!(bag, restored);
        let names: Vec<_> = restored.iter().map(|(n, _)| n.to_owned()).collect();
        assert_eq!(vec!["srcs", "contacts", "main_module"], names);
        Ok(())
    }
}
