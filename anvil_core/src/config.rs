/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The build configuration: a two-level `[section] key = value` map, read
//! once at startup. Descriptions and toolchains pull their settings (tool
//! paths, compression levels) out of typed views over this.

use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config line {line}: `{contents}`")]
    InvalidLine { line: usize, contents: String },
    #[error("key `{key}` outside of any section at line {line}")]
    KeyOutsideSection { key: String, line: usize },
    #[error("please configure `{key}` in the `[{section}]` section of your .anvilconfig")]
    MissingRequiredKey { section: String, key: String },
    #[error("config value `[{section}] {key} = {value}` is not a valid {expected}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// An immutable view of the parsed configuration. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct Config {
    sections: Arc<IndexMap<String, IndexMap<String, String>>>,
}

impl gazebo::dupe::Dupe for Config {}

impl Config {
    /// Parses ini-style text: `[section]` headers, `key = value` entries,
    /// `#` and `;` comments, blank lines ignored.
    pub fn parse(text: &str) -> anyhow::Result<Config> {
        let mut sections: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
        let mut current: Option<String> = None;
        for (i, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let section = section.trim().to_owned();
                sections.entry(section.clone()).or_default();
                current = Some(section);
                continue;
            }
            let (key, value) = line.split_once('=').ok_or(ConfigError::InvalidLine {
                line: i + 1,
                contents: raw_line.to_owned(),
            })?;
            let section = current.as_ref().ok_or_else(|| ConfigError::KeyOutsideSection {
                key: key.trim().to_owned(),
                line: i + 1,
            })?;
            sections
                .get_mut(section)
                .unwrap()
                .insert(key.trim().to_owned(), value.trim().to_owned());
        }
        Ok(Config {
            sections: Arc::new(sections),
        })
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(|s| s.as_str())
    }

    pub fn get_required(&self, section: &str, key: &str) -> anyhow::Result<&str> {
        self.get(section, key)
            .ok_or_else(|| {
                ConfigError::MissingRequiredKey {
                    section: section.to_owned(),
                    key: key.to_owned(),
                }
                .into()
            })
    }

    pub fn get_u32(&self, section: &str, key: &str) -> anyhow::Result<Option<u32>> {
        match self.get(section, key) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| {
                ConfigError::InvalidValue {
                    section: section.to_owned(),
                    key: key.to_owned(),
                    value: value.to_owned(),
                    expected: "integer",
                }
                .into()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_sections_and_keys() -> anyhow::Result<()> {
        let config = Config::parse(
            "# a comment\n\
             [python]\n\
             path_to_pex = tools/pex\n\
             ; another comment\n\
             [android]\n\
             dx = tools/dx\n\
             xz_compression_level = 9\n",
        )?;
        assert_eq!(Some("tools/pex"), config.get("python", "path_to_pex"));
        assert_eq!(Some("tools/dx"), config.get("android", "dx"));
        assert_eq!(Some(9), config.get_u32("android", "xz_compression_level")?);
        assert_eq!(None, config.get("android", "d8"));
        Ok(())
    }

    #[test]
    fn missing_required_key_is_actionable() {
        let config = Config::parse("[python]\n").unwrap();
        let err = config
            .get_required("python", "path_to_python_test_main")
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("please configure `path_to_python_test_main` in the `[python]` section")
        );
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert_matches!(Config::parse("[python]\nnot a kv line\n"), Err(..));
        assert_matches!(Config::parse("key = before section\n"), Err(..));
    }
}
