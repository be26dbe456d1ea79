/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Rule keys: a deterministic fingerprint of everything that can affect a
//! rule's outputs. Two runs over the same configuration must produce the
//! same key; anything observable changing must change it.
//!
//! Every value is hashed with a type-tag byte and a length so that
//! concatenations cannot collide (`["ab"]` vs `["a","b"]`). Path sources
//! hash the referenced file's content hash; build-target sources hash only
//! the canonical `(target, output)` form. The latter is the cycle break: a
//! rule whose command line mentions an artifact it itself produces must not
//! recurse into that artifact's producer.

use std::sync::Arc;
use std::sync::Mutex;

use derive_more::Display;
use gazebo::prelude::*;
use sha1::Digest;
use sha1::Sha1;

use anvil_core::cells::CellPath;
use anvil_core::cells::CellResolver;
use anvil_core::fs::project::ProjectFilesystem;
use anvil_core::hash::Sha1HashCode;
use anvil_core::source_path::SourcePath;
use anvil_core::target::BuildTarget;
use anvil_node::attrs::AttrValue;
use anvil_node::rule_type::RuleType;

use crate::cmd_args::CommandLineArg;
use crate::cmd_args::CommandLineArgs;
use crate::rules::BuildRule;

/// The fingerprint of one rule.
#[derive(Clone, Copy, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RuleKey(Sha1HashCode);

impl Dupe for RuleKey {}

impl RuleKey {
    pub fn hash(&self) -> &Sha1HashCode {
        &self.0
    }
}

/// Provides content hashes for source files. Implementations are expected
/// to be memoized snapshots of the file state at the start of the build, not
/// live reads.
pub trait FileHashCache: Send + Sync {
    fn get(&self, path: &CellPath) -> anyhow::Result<Sha1HashCode>;
}

/// Hashes files on first use and remembers the result for the rest of the
/// build.
pub struct DefaultFileHashCache {
    cells: CellResolver,
    fs: ProjectFilesystem,
    memo: Mutex<std::collections::HashMap<CellPath, Sha1HashCode>>,
}

impl DefaultFileHashCache {
    pub fn new(cells: CellResolver, fs: ProjectFilesystem) -> Self {
        DefaultFileHashCache {
            cells,
            fs,
            memo: Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl FileHashCache for DefaultFileHashCache {
    fn get(&self, path: &CellPath) -> anyhow::Result<Sha1HashCode> {
        if let Some(hash) = self.memo.lock().unwrap().get(path) {
            return Ok(hash.dupe());
        }
        let bytes = self.fs.read(self.cells.resolve_path(path)?)?;
        let hash = Sha1HashCode::hash_of(&bytes);
        self.memo.lock().unwrap().insert(path.clone(), hash);
        Ok(hash)
    }
}

// Type tags. Each hashed value starts with one of these so that values of
// different types can never hash alike.
const TAG_RULE_TYPE: u8 = 0x01;
const TAG_TARGET: u8 = 0x02;
const TAG_KEY: u8 = 0x03;
const TAG_BOOL: u8 = 0x10;
const TAG_INT: u8 = 0x11;
const TAG_STRING: u8 = 0x12;
const TAG_NONE: u8 = 0x13;
const TAG_LIST: u8 = 0x20;
const TAG_SET: u8 = 0x21;
const TAG_DICT: u8 = 0x22;
const TAG_PATH_SOURCE: u8 = 0x30;
const TAG_TARGET_SOURCE: u8 = 0x31;
const TAG_STEP: u8 = 0x40;
const TAG_ARG_FORMAT: u8 = 0x50;
const TAG_ENV: u8 = 0x51;

/// Accumulates a rule's key. Values are appended in declared order; the
/// builder is deliberately append-only so that order is part of the key.
pub struct RuleKeyBuilder<'a> {
    hasher: Sha1,
    file_hashes: &'a dyn FileHashCache,
}

impl<'a> RuleKeyBuilder<'a> {
    pub fn new(file_hashes: &'a dyn FileHashCache) -> Self {
        RuleKeyBuilder {
            hasher: Sha1::new(),
            file_hashes,
        }
    }

    fn tag(&mut self, tag: u8) {
        self.hasher.update([tag]);
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    fn tagged_str(&mut self, tag: u8, s: &str) {
        self.tag(tag);
        self.bytes(s.as_bytes());
    }

    pub fn set_rule_type(&mut self, rule_type: &RuleType) -> &mut Self {
        self.tagged_str(TAG_RULE_TYPE, rule_type.name());
        self
    }

    pub fn set_target(&mut self, target: &BuildTarget) -> &mut Self {
        self.tagged_str(TAG_TARGET, &target.to_string());
        self
    }

    /// A named scalar string contribution, e.g. generated file contents.
    pub fn set_string(&mut self, key: &str, value: &str) -> anyhow::Result<&mut Self> {
        self.tagged_str(TAG_KEY, key);
        self.tagged_str(TAG_STRING, value);
        Ok(self)
    }

    /// A named source-path contribution. Path sources contribute their
    /// content hash; build-target sources contribute their canonical form
    /// only (the cycle break).
    pub fn set_source_path(&mut self, key: &str, value: &SourcePath) -> anyhow::Result<&mut Self> {
        self.tagged_str(TAG_KEY, key);
        self.source_path(value)?;
        Ok(self)
    }

    /// A named attribute contribution, hashed by type.
    pub fn set_attr(&mut self, key: &str, value: &AttrValue) -> anyhow::Result<&mut Self> {
        self.tagged_str(TAG_KEY, key);
        self.attr_value(value)?;
        Ok(self)
    }

    /// A declared step's contribution: its short name plus the parameters
    /// the step designates as key-relevant.
    pub fn set_step(&mut self, short_name: &str, params: &[&str]) -> anyhow::Result<&mut Self> {
        self.tagged_str(TAG_STEP, short_name);
        self.hasher.update((params.len() as u64).to_le_bytes());
        for param in params {
            self.tagged_str(TAG_STRING, param);
        }
        Ok(self)
    }

    /// A command-line-args bundle: each (format string, object) pair in
    /// order, with objects reduced to their rule-key representation, then
    /// the environment in sorted order.
    pub fn set_cmd_args(&mut self, key: &str, args: &CommandLineArgs) -> anyhow::Result<&mut Self> {
        self.tagged_str(TAG_KEY, key);
        self.hasher.update((args.len() as u64).to_le_bytes());
        for arg in args.args() {
            self.tagged_str(TAG_ARG_FORMAT, arg.post_format());
            match arg.object() {
                CommandLineArg::String(s) => self.tagged_str(TAG_STRING, s),
                CommandLineArg::SourcePath(path) => self.source_path(path)?,
                CommandLineArg::Artifact(artifact) => {
                    self.artifact_representation(&artifact.as_source_path()?)?;
                }
                CommandLineArg::Output(output) => {
                    // An output artifact reduces to its inner artifact.
                    let artifact = crate::artifact::Artifact::from(output.artifact().dupe());
                    self.artifact_representation(&artifact.as_source_path()?)?;
                }
            }
        }
        for (name, value) in args.env() {
            self.tagged_str(TAG_ENV, name);
            self.tagged_str(TAG_STRING, value);
        }
        Ok(self)
    }

    fn attr_value(&mut self, value: &AttrValue) -> anyhow::Result<()> {
        match value {
            AttrValue::Bool(b) => {
                self.tag(TAG_BOOL);
                self.hasher.update([*b as u8]);
            }
            AttrValue::Int(i) => {
                self.tag(TAG_INT);
                self.hasher.update(i.to_le_bytes());
            }
            AttrValue::String(s) => self.tagged_str(TAG_STRING, s),
            AttrValue::List(values) => {
                self.tag(TAG_LIST);
                self.hasher.update((values.len() as u64).to_le_bytes());
                for value in values {
                    self.attr_value(value)?;
                }
            }
            AttrValue::StringSet(values) => {
                // Already canonically sorted.
                self.tag(TAG_SET);
                self.hasher.update((values.len() as u64).to_le_bytes());
                for value in values {
                    self.tagged_str(TAG_STRING, value);
                }
            }
            AttrValue::Dict(dict) => {
                self.tag(TAG_DICT);
                self.hasher.update((dict.len() as u64).to_le_bytes());
                for (path, source) in dict {
                    self.tagged_str(TAG_STRING, path.as_str());
                    self.source_path(source)?;
                }
            }
            AttrValue::Source(source) => self.source_path(source)?,
            AttrValue::Dep(target) => self.tagged_str(TAG_TARGET, &target.to_string()),
            AttrValue::Targets(targets) => {
                // Already canonically sorted.
                self.tag(TAG_SET);
                self.hasher.update((targets.len() as u64).to_le_bytes());
                for target in targets {
                    self.tagged_str(TAG_TARGET, &target.to_string());
                }
            }
            AttrValue::None => self.tag(TAG_NONE),
        }
        Ok(())
    }

    fn source_path(&mut self, source: &SourcePath) -> anyhow::Result<()> {
        match source {
            SourcePath::Path(path) => {
                let hash = self.file_hashes.get(path)?;
                self.tagged_str(TAG_PATH_SOURCE, &path.to_string());
                self.hasher.update(hash.as_bytes());
            }
            SourcePath::BuildTarget(path) => {
                // The cycle break: the canonical (target, output) form only,
                // never the producing rule or the output's contents.
                self.tagged_str(TAG_TARGET_SOURCE, &path.representation_for_rule_key());
            }
        }
        Ok(())
    }

    /// Like 'source_path', but for artifacts appearing in command lines: a
    /// bound build artifact always reduces to its target form; a source
    /// artifact can safely hash its contents.
    fn artifact_representation(&mut self, source: &SourcePath) -> anyhow::Result<()> {
        self.source_path(source)
    }

    pub fn finish(self) -> RuleKey {
        RuleKey(Sha1HashCode::new(self.hasher.finalize().into()))
    }
}

/// Computes rule keys: seeds the builder with the rule's type and canonical
/// target, then lets the rule append its own contributions.
#[derive(Clone, Dupe)]
pub struct RuleKeyFactory {
    file_hashes: Arc<dyn FileHashCache>,
}

impl RuleKeyFactory {
    pub fn new(file_hashes: Arc<dyn FileHashCache>) -> Self {
        RuleKeyFactory { file_hashes }
    }

    pub fn build(&self, rule: &dyn BuildRule) -> anyhow::Result<RuleKey> {
        let mut builder = RuleKeyBuilder::new(&*self.file_hashes);
        builder.set_rule_type(rule.rule_type());
        builder.set_target(rule.build_target());
        rule.append_to_rule_key(&mut builder)?;
        Ok(builder.finish())
    }
}

pub mod testing {
    use std::collections::HashMap;

    use anvil_core::cells::CellPath;
    use anvil_core::hash::Sha1HashCode;
    use gazebo::prelude::*;

    use crate::rule_key::FileHashCache;

    /// A file hash cache backed by a fixed map. Unknown paths are an error,
    /// which doubles as a check that rule keys only read the files they are
    /// supposed to.
    pub struct FakeFileHashCache {
        hashes: HashMap<CellPath, Sha1HashCode>,
    }

    impl FakeFileHashCache {
        pub fn new(hashes: HashMap<CellPath, Sha1HashCode>) -> Self {
            FakeFileHashCache { hashes }
        }

        pub fn of_contents(entries: &[(&str, &str)]) -> Self {
            Self::new(
                entries
                    .iter()
                    .map(|(path, contents)| {
                        (
                            CellPath::parse(path).unwrap(),
                            Sha1HashCode::hash_of(contents.as_bytes()),
                        )
                    })
                    .collect(),
            )
        }
    }

    impl FileHashCache for FakeFileHashCache {
        fn get(&self, path: &CellPath) -> anyhow::Result<Sha1HashCode> {
            self.hashes
                .get(path)
                .map(|hash| hash.dupe())
                .ok_or_else(|| anyhow::anyhow!("no hash recorded for `{}`", path))
        }
    }
}

#[cfg(test)]
mod tests {
    use anvil_core::target::testing::BuildTargetExt;

    use super::testing::FakeFileHashCache;
    use super::*;

    fn key_of(
        cache: &dyn FileHashCache,
        f: impl Fn(&mut RuleKeyBuilder) -> anyhow::Result<()>,
    ) -> RuleKey {
        let mut builder = RuleKeyBuilder::new(cache);
        f(&mut builder).unwrap();
        builder.finish()
    }

    #[test]
    fn determinism() -> anyhow::Result<()> {
        let cache = FakeFileHashCache::of_contents(&[("cell//pkg/a.py", "contents")]);
        let build = |builder: &mut RuleKeyBuilder| {
            builder.set_target(&BuildTarget::testing_parse("cell//pkg:t"));
            builder.set_string("contents", "TEST_MODULES = []")?;
            builder.set_source_path("src", &SourcePath::parse("cell//pkg/a.py")?)?;
            builder.set_step("write_file", &["out/__test_modules__.py"])?;
            Ok(())
        };
        assert_eq!(key_of(&cache, build), key_of(&cache, build));

        // A step's designated parameters are part of the key.
        let other_step = key_of(&cache, |builder| {
            builder.set_target(&BuildTarget::testing_parse("cell//pkg:t"));
            builder.set_string("contents", "TEST_MODULES = []")?;
            builder.set_source_path("src", &SourcePath::parse("cell//pkg/a.py")?)?;
            builder.set_step("write_file", &["somewhere/else.py"])?;
            Ok(())
        });
        assert_ne!(key_of(&cache, build), other_step);
        Ok(())
    }

    #[test]
    fn changing_file_contents_changes_the_key() -> anyhow::Result<()> {
        let before = FakeFileHashCache::of_contents(&[("cell//pkg/a.py", "v1")]);
        let after = FakeFileHashCache::of_contents(&[("cell//pkg/a.py", "v2")]);
        let build = |builder: &mut RuleKeyBuilder| {
            builder.set_source_path("src", &SourcePath::parse("cell//pkg/a.py")?)?;
            Ok(())
        };
        assert_ne!(key_of(&before, build), key_of(&after, build));
        Ok(())
    }

    #[test]
    fn build_target_sources_do_not_read_files() -> anyhow::Result<()> {
        // The cache is empty, so any content lookup would error.
        let cache = FakeFileHashCache::new(Default::default());
        let mut builder = RuleKeyBuilder::new(&cache);
        builder.set_source_path("dep", &SourcePath::parse("cell//pkg:gen[out.jar]")?)?;
        builder.finish();
        Ok(())
    }

    #[test]
    fn self_referencing_command_line_terminates_without_reading_the_artifact(
    ) -> anyhow::Result<()> {
        use crate::artifact::ActionId;
        use crate::artifact::DeclaredArtifact;
        use crate::path::testing::GenPathExt;
        use crate::path::GenPath;

        // A rule that passes its own output artifact on its command line.
        // The cache is empty, so the key computation would fail if it tried
        // to read any file contents.
        let target = BuildTarget::testing_parse("cell//pkg:self");
        let declared = DeclaredArtifact::new(GenPath::testing_new("cell//pkg:self", "self.pex"));
        let output = declared.as_output();
        output.bind(ActionId::new(target.dupe(), 0))?;

        let args = CommandLineArgs::new()
            .add("--output")
            .add_formatted(output, "{}")
            .add_env("PEX_ROOT", "/tmp/pex");

        let cache = FakeFileHashCache::new(Default::default());
        let build = |builder: &mut RuleKeyBuilder| {
            builder.set_target(&target);
            builder.set_cmd_args("cmd", &args)?;
            Ok(())
        };
        let key = key_of(&cache, build);

        // Deterministic, and sensitive to the env map.
        assert_eq!(key, key_of(&cache, build));
        let different_env = key_of(&cache, |builder| {
            builder.set_target(&target);
            builder.set_cmd_args(
                "cmd",
                &args.clone().add_env("PEX_ROOT", "/other"),
            )?;
            Ok(())
        });
        assert_ne!(key, different_env);
        Ok(())
    }

    #[test]
    fn list_concatenation_does_not_collide() -> anyhow::Result<()> {
        let cache = FakeFileHashCache::new(Default::default());
        let one = key_of(&cache, |b| {
            b.set_attr(
                "xs",
                &AttrValue::List(vec![AttrValue::String("ab".into())]),
            )?;
            Ok(())
        });
        let two = key_of(&cache, |b| {
            b.set_attr(
                "xs",
                &AttrValue::List(vec![
                    AttrValue::String("a".into()),
                    AttrValue::String("b".into()),
                ]),
            )?;
            Ok(())
        });
        assert_ne!(one, two);
        Ok(())
    }
}
