/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The python rule family: libraries that contribute module maps, binaries
//! packaged as PEX files by an external packer, and tests, which synthesize
//! a test-modules source rule and a flavored PEX sibling.

use std::sync::Arc;

use anvil_build_api::rules::description::Description;
use anvil_build_api::rules::description::DescriptionProvider;
use anvil_core::config::Config;

use crate::binary::PythonBinaryDescription;
use crate::library::PythonLibraryDescription;
use crate::test::PythonTestDescription;
use crate::toolchain::PythonConfig;

pub mod binary;
pub mod library;
pub mod test;
pub mod toolchain;
pub mod util;

/// Registers the built-in python rule types.
pub struct PythonDescriptionProvider;

impl DescriptionProvider for PythonDescriptionProvider {
    fn descriptions(&self, config: &Config) -> anyhow::Result<Vec<Arc<dyn Description>>> {
        let python_config = PythonConfig::from_config(config)?;
        Ok(vec![
            Arc::new(PythonLibraryDescription::new()),
            Arc::new(PythonBinaryDescription::new(python_config.clone())),
            Arc::new(PythonTestDescription::new(python_config)),
        ])
    }
}
