/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Display;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use anvil_core::fs::paths::ForwardRelativePathBuf;
use anvil_core::source_path::SourcePath;
use anvil_core::target::BuildTarget;

/// A typed attribute value. Sets are canonically sorted on construction;
/// lists and dicts keep their declared order, which is semantic (dict keys
/// are destination paths in module maps).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<AttrValue>),
    StringSet(BTreeSet<String>),
    Dict(IndexMap<ForwardRelativePathBuf, SourcePath>),
    Source(SourcePath),
    Dep(BuildTarget),
    Targets(BTreeSet<BuildTarget>),
    None,
}

impl AttrValue {
    /// A short tag naming the variant, used in error messages and as the
    /// type-tag component of rule keys.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::String(_) => "string",
            AttrValue::List(_) => "list",
            AttrValue::StringSet(_) => "string_set",
            AttrValue::Dict(_) => "dict",
            AttrValue::Source(_) => "source",
            AttrValue::Dep(_) => "dep",
            AttrValue::Targets(_) => "targets",
            AttrValue::None => "none",
        }
    }

    /// The targets this value refers to, in iteration order. Used to collect
    /// a rule's declared deps from its attributes.
    pub fn traverse_targets(&self, mut visit: impl FnMut(&BuildTarget)) {
        self.traverse_targets_impl(&mut visit)
    }

    fn traverse_targets_impl(&self, visit: &mut impl FnMut(&BuildTarget)) {
        match self {
            AttrValue::Dep(target) => visit(target),
            AttrValue::Targets(targets) => {
                for target in targets {
                    visit(target);
                }
            }
            AttrValue::Source(source) => {
                if let Some(target) = source.producing_target() {
                    visit(target);
                }
            }
            AttrValue::Dict(dict) => {
                for source in dict.values() {
                    if let Some(target) = source.producing_target() {
                        visit(target);
                    }
                }
            }
            AttrValue::List(values) => {
                for value in values {
                    value.traverse_targets_impl(visit);
                }
            }
            AttrValue::Bool(_)
            | AttrValue::Int(_)
            | AttrValue::String(_)
            | AttrValue::StringSet(_)
            | AttrValue::None => {}
        }
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::String(v) => write!(f, "\"{}\"", v),
            AttrValue::List(v) => {
                write!(f, "[")?;
                for (i, v) in v.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    Display::fmt(v, f)?;
                }
                write!(f, "]")
            }
            AttrValue::StringSet(v) => {
                write!(f, "{{")?;
                for (i, v) in v.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{}\"", v)?;
                }
                write!(f, "}}")
            }
            AttrValue::Dict(v) => {
                write!(f, "{{")?;
                for (i, (k, v)) in v.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{}\": \"{}\"", k, v)?;
                }
                write!(f, "}}")
            }
            AttrValue::Source(v) => write!(f, "\"{}\"", v),
            AttrValue::Dep(v) => write!(f, "\"{}\"", v),
            AttrValue::Targets(v) => {
                write!(f, "[")?;
                for (i, v) in v.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{}\"", v)?;
                }
                write!(f, "]")
            }
            AttrValue::None => write!(f, "None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use anvil_core::target::testing::BuildTargetExt;

    use super::*;

    #[test]
    fn serde_round_trip() -> anyhow::Result<()> {
        let value = AttrValue::Dict(IndexMap::from([
            (
                ForwardRelativePathBuf::unchecked_new("pkg/a.py".into()),
                SourcePath::parse("cell//pkg/a.py")?,
            ),
            (
                ForwardRelativePathBuf::unchecked_new("pkg/gen.py".into()),
                SourcePath::parse("cell//pkg:gen")?,
            ),
        ]));
        let json = serde_json::to_string(&value)?;
        let restored: AttrValue = serde_json::from_str(&json)?;
        assert_eq!(value, restored);
        Ok(())
    }

    #[test]
    fn traverse_targets_finds_deps_in_collections() -> anyhow::Result<()> {
        let dep = BuildTarget::testing_parse("cell//a:b");
        let gen = BuildTarget::testing_parse("cell//pkg:gen");
        let value = AttrValue::List(vec![
            AttrValue::Dep(dep.clone()),
            AttrValue::Source(SourcePath::build_target(gen.clone())),
            AttrValue::String("no targets here".into()),
        ]);
        let mut seen = Vec::new();
        value.traverse_targets(|t| seen.push(t.clone()));
        assert_eq!(vec![dep, gen], seen);
        Ok(())
    }

    #[test]
    fn display_is_python_flavored() {
        assert_eq!("True", AttrValue::Bool(true).to_string());
        assert_eq!("None", AttrValue::None.to_string());
        assert_eq!(
            "[\"a\",\"b\"]",
            AttrValue::List(vec![
                AttrValue::String("a".into()),
                AttrValue::String("b".into())
            ])
            .to_string()
        );
    }
}
