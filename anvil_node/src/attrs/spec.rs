/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The schema of a rule type's attributes: which names it recognizes, in
//! which order, which are required, and what the defaults are. Coercing a
//! raw attribute bag against a spec is where unknown attributes are rejected
//! and defaults are filled in, so descriptions only ever see complete bags.

use gazebo::prelude::*;
use indexmap::IndexMap;
use thiserror::Error;

use anvil_core::target::BuildTarget;

use crate::attrs::bag::AttrBag;
use crate::attrs::value::AttrValue;

#[derive(Error, Debug)]
pub enum AttrCoercionError {
    #[error("`{target}` does not recognize the attribute `{attr}`")]
    UnknownAttribute { target: BuildTarget, attr: String },
    #[error("`{target}` is missing the required attribute `{attr}`")]
    MissingAttribute { target: BuildTarget, attr: String },
    #[error(
        "`{target}`: attribute `{attr}` has type `{actual}` where `{expected}` was expected"
    )]
    WrongType {
        target: BuildTarget,
        attr: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("attribute spec declares `{0}` twice")]
    DuplicateAttribute(String),
}

/// One declared attribute.
#[derive(Clone, Debug)]
pub struct Attribute {
    required: bool,
    default: AttrValue,
}

impl Attribute {
    pub fn required() -> Self {
        Attribute {
            required: true,
            default: AttrValue::None,
        }
    }

    /// Optional with no default: absent reads as `AttrValue::None`, which the
    /// bag's typed accessors turn into the empty collection.
    pub fn optional() -> Self {
        Attribute {
            required: false,
            default: AttrValue::None,
        }
    }

    pub fn with_default(default: AttrValue) -> Self {
        Attribute {
            required: false,
            default,
        }
    }
}

/// The attribute spec of one rule type. Declaration order is preserved; it
/// is the order attributes contribute to the rule key.
#[derive(Clone, Debug)]
pub struct AttributeSpec {
    attrs: IndexMap<String, Attribute>,
}

impl AttributeSpec {
    pub fn new(attrs: Vec<(&str, Attribute)>) -> anyhow::Result<Self> {
        let mut map = IndexMap::with_capacity(attrs.len());
        for (name, attr) in attrs {
            if map.insert(name.to_owned(), attr).is_some() {
                return Err(AttrCoercionError::DuplicateAttribute(name.to_owned()).into());
            }
        }
        Ok(AttributeSpec { attrs: map })
    }

    pub fn attr_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(|k| k.as_str())
    }

    /// Validates a raw attribute bag against this spec: unknown keys are
    /// rejected, missing required attributes are errors, defaults are filled,
    /// and the result carries the attributes in declaration order.
    pub fn coerce(
        &self,
        target: &BuildTarget,
        mut raw: IndexMap<String, AttrValue>,
    ) -> anyhow::Result<AttrBag> {
        let mut values = IndexMap::with_capacity(self.attrs.len());
        for (name, attr) in &self.attrs {
            match raw.shift_remove(name) {
                Some(value) => {
                    values.insert(name.clone(), value);
                }
                None if attr.required => {
                    return Err(AttrCoercionError::MissingAttribute {
                        target: target.dupe(),
                        attr: name.clone(),
                    }
                    .into());
                }
                None => {
                    values.insert(name.clone(), attr.default.clone());
                }
            }
        }
        if let Some(attr) = raw.keys().next() {
            return Err(AttrCoercionError::UnknownAttribute {
                target: target.dupe(),
                attr: attr.clone(),
            }
            .into());
        }
        Ok(AttrBag::new(target.dupe(), values))
    }
}
