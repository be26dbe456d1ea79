/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::path::PathBuf;
use std::sync::Arc;

use gazebo::prelude::*;

use anvil_core::config::Config;

/// Which dexer to invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum DexTool {
    #[display(fmt = "dx")]
    Dx,
    #[display(fmt = "d8")]
    D8,
}

/// The android toolchain paths the dexing engine needs, read from the
/// `[android]` config section. A missing tool is a configuration error at
/// the point of first use.
#[derive(Clone, Dupe, Debug)]
pub struct AndroidPlatformTarget {
    dx: Arc<PathBuf>,
    d8: Arc<PathBuf>,
}

impl AndroidPlatformTarget {
    pub fn new(dx: PathBuf, d8: PathBuf) -> Self {
        AndroidPlatformTarget {
            dx: Arc::new(dx),
            d8: Arc::new(d8),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(AndroidPlatformTarget::new(
            config.get_required("android", "dx")?.into(),
            config.get_required("android", "d8")?.into(),
        ))
    }

    pub fn dexer(&self, tool: DexTool) -> &PathBuf {
        match tool {
            DexTool::Dx => &self.dx,
            DexTool::D8 => &self.d8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_tool_paths() -> anyhow::Result<()> {
        let config = Config::parse("[android]\ndx = tools/dx\nd8 = tools/d8\n")?;
        let platform = AndroidPlatformTarget::from_config(&config)?;
        assert_eq!(&PathBuf::from("tools/dx"), platform.dexer(DexTool::Dx));
        assert_eq!(&PathBuf::from("tools/d8"), platform.dexer(DexTool::D8));

        let empty = Config::parse("")?;
        assert!(AndroidPlatformTarget::from_config(&empty).is_err());
        Ok(())
    }
}
