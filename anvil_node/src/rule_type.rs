/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use derive_more::Display;
use gazebo::prelude::*;

/// The canonical name of a rule type, e.g. `python_test`. Used to find the
/// description that materializes targets of this type, and hashed into every
/// rule key.
#[derive(Clone, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RuleType(Arc<str>);

impl Dupe for RuleType {}

impl RuleType {
    pub fn new(name: &str) -> Self {
        RuleType(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}
