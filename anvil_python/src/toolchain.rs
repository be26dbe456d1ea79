/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use anvil_core::cells::CellPath;
use anvil_core::config::Config;

/// Python toolchain paths from the `[python]` config section. Paths are
/// cell paths (`cell//path/to/tool`), so the tools themselves participate
/// in rule keys like any other source file.
#[derive(Clone, Debug)]
pub struct PythonConfig {
    pex_tool: CellPath,
    test_main: Option<CellPath>,
}

impl PythonConfig {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pex_tool = CellPath::parse(config.get_required("python", "path_to_pex")?)?;
        let test_main = config
            .get("python", "path_to_python_test_main")
            .map(CellPath::parse)
            .transpose()?;
        Ok(PythonConfig {
            pex_tool,
            test_main,
        })
    }

    pub fn pex_tool(&self) -> &CellPath {
        &self.pex_tool
    }

    /// The test runner entry point. Optional in configuration; required the
    /// first time a `python_test` target is materialized.
    pub fn test_main(&self) -> Option<&CellPath> {
        self.test_main.as_ref()
    }
}

pub mod testing {
    use anvil_core::config::Config;

    use crate::toolchain::PythonConfig;

    pub fn testing_python_config() -> PythonConfig {
        let config = Config::parse(
            "[python]\n\
             path_to_pex = cell//tools/pex.py\n\
             path_to_python_test_main = cell//tools/__test_main__.py\n",
        )
        .unwrap();
        PythonConfig::from_config(&config).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_paths() -> anyhow::Result<()> {
        let config = Config::parse("[python]\npath_to_pex = cell//tools/pex.py\n")?;
        let python = PythonConfig::from_config(&config)?;
        assert_eq!("cell//tools/pex.py", python.pex_tool().to_string());
        assert_eq!(None, python.test_main());

        let empty = Config::parse("")?;
        assert!(PythonConfig::from_config(&empty).is_err());
        Ok(())
    }
}
