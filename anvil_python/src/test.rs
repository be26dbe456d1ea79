/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! `python_test`: wraps a PEX that runs the declared test modules.
//!
//! The description synthesizes two auxiliary rules under fresh flavors of
//! the same base target: a `test_module` rule generating the source file
//! that lists the test modules, and a `binary` rule packaging everything
//! (the generated list included) into the PEX the test runner executes.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use gazebo::prelude::*;
use indexmap::IndexMap;
use once_cell::sync::Lazy;

use anvil_build_api::artifact::ActionId;
use anvil_build_api::artifact::DeclaredArtifact;
use anvil_build_api::context::BuildContext;
use anvil_build_api::path::GenPath;
use anvil_build_api::rule_key::RuleKeyBuilder;
use anvil_build_api::rules::description::Description;
use anvil_build_api::rules::resolver::BuildRuleResolver;
use anvil_build_api::rules::BuildRule;
use anvil_build_api::rules::BuildableContext;
use anvil_core::config::ConfigError;
use anvil_core::fs::paths::ForwardRelativePathBuf;
use anvil_core::fs::project::ProjectRelativePathBuf;
use anvil_core::source_path::SourcePath;
use anvil_core::target::BuildTarget;
use anvil_core::target::Flavor;
use anvil_execute::step::fs::MkdirStep;
use anvil_execute::step::fs::WriteFileStep;
use anvil_execute::step::Step;
use anvil_node::attrs::AttrBag;
use anvil_node::attrs::Attribute;
use anvil_node::attrs::AttributeSpec;
use anvil_node::rule_type::RuleType;

use crate::binary::PythonBinary;
use crate::library::components_from_args;
use crate::library::gather_dep_components;
use crate::toolchain::PythonConfig;
use crate::util;

pub static PYTHON_TEST: Lazy<RuleType> = Lazy::new(|| RuleType::new("python_test"));
pub static CREATE_TEST_MODULES_LIST: Lazy<RuleType> =
    Lazy::new(|| RuleType::new("create_test_modules_list"));

static BINARY_FLAVOR: Lazy<Flavor> = Lazy::new(|| Flavor::unchecked_new("binary"));
static TEST_MODULE_FLAVOR: Lazy<Flavor> = Lazy::new(|| Flavor::unchecked_new("test_module"));

const TEST_MAIN_NAME: &str = "__test_main__.py";
const TEST_MODULES_LIST_NAME: &str = "__test_modules__.py";

/// The contents of the generated source file listing the test modules:
/// sorted ascending, four-space indent, the closing bracket on its own
/// line, no trailing newline.
fn test_modules_list_contents(modules: &BTreeSet<String>) -> String {
    let mut contents = String::from("TEST_MODULES = [\n");
    for module in modules {
        contents.push_str(&format!("    \"{}\",\n", module));
    }
    contents.push(']');
    contents
}

/// The synthesized rule that writes the test-modules list. Keeping this a
/// separate rule lets the ordinary binary rule package the file without
/// knowing it was generated.
#[derive(Debug)]
pub struct TestModulesSourceRule {
    target: BuildTarget,
    contents: String,
    output: DeclaredArtifact,
}

impl TestModulesSourceRule {
    fn new(target: BuildTarget, contents: String) -> anyhow::Result<Self> {
        let output = DeclaredArtifact::new(GenPath::new(
            target.dupe(),
            ForwardRelativePathBuf::unchecked_new(TEST_MODULES_LIST_NAME.to_owned()),
        ));
        output.as_output().bind(ActionId::new(target.dupe(), 0))?;
        Ok(TestModulesSourceRule {
            target,
            contents,
            output,
        })
    }
}

impl BuildRule for TestModulesSourceRule {
    fn build_target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &RuleType {
        &CREATE_TEST_MODULES_LIST
    }

    fn declared_deps(&self) -> &[BuildTarget] {
        &[]
    }

    fn append_to_rule_key(&self, builder: &mut RuleKeyBuilder) -> anyhow::Result<()> {
        builder.set_string("contents", &self.contents)?;
        builder.set_string("output", self.output.get_path().path().as_str())?;
        Ok(())
    }

    fn build_steps(
        &self,
        ctx: &BuildContext,
        buildable: &mut BuildableContext,
    ) -> anyhow::Result<Vec<Box<dyn Step>>> {
        let output_path = ctx.artifact_fs().resolve_gen(self.output.get_path())?;
        let mut steps: Vec<Box<dyn Step>> = Vec::new();
        if let Some(parent) = output_path.parent() {
            steps.push(Box::new(MkdirStep::new(parent.to_buf())));
        }
        steps.push(Box::new(WriteFileStep::new(
            self.contents.clone(),
            output_path.clone(),
            false,
        )));
        buildable.record_artifact(output_path);
        Ok(steps)
    }

    fn output_path(&self) -> Option<ProjectRelativePathBuf> {
        self.output.get_path().resolve().ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The test rule itself: a thin wrapper naming the PEX to run plus the
/// metadata the test runner consumes. Running tests is the runner's
/// concern, not the build core's, so there are no steps here.
#[derive(Debug)]
pub struct PythonTest {
    target: BuildTarget,
    binary: BuildTarget,
    deps: Vec<BuildTarget>,
    extra_deps: Vec<BuildTarget>,
    labels: BTreeSet<String>,
    contacts: BTreeSet<String>,
    source_under_test: Vec<BuildTarget>,
    binary_output: Option<ProjectRelativePathBuf>,
}

impl PythonTest {
    pub fn binary(&self) -> &BuildTarget {
        &self.binary
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    pub fn contacts(&self) -> &BTreeSet<String> {
        &self.contacts
    }

    pub fn source_under_test(&self) -> &[BuildTarget] {
        &self.source_under_test
    }
}

impl BuildRule for PythonTest {
    fn build_target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &RuleType {
        &PYTHON_TEST
    }

    fn declared_deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn extra_deps(&self) -> &[BuildTarget] {
        &self.extra_deps
    }

    fn append_to_rule_key(&self, builder: &mut RuleKeyBuilder) -> anyhow::Result<()> {
        builder.set_source_path("binary", &SourcePath::build_target(self.binary.dupe()))?;
        builder.set_attr(
            "labels",
            &anvil_node::attrs::AttrValue::StringSet(self.labels.clone()),
        )?;
        builder.set_attr(
            "contacts",
            &anvil_node::attrs::AttrValue::StringSet(self.contacts.clone()),
        )?;
        builder.set_attr(
            "source_under_test",
            &anvil_node::attrs::AttrValue::Targets(
                self.source_under_test.iter().map(|t| t.dupe()).collect(),
            ),
        )?;
        Ok(())
    }

    fn build_steps(
        &self,
        _ctx: &BuildContext,
        _buildable: &mut BuildableContext,
    ) -> anyhow::Result<Vec<Box<dyn Step>>> {
        Ok(Vec::new())
    }

    fn output_path(&self) -> Option<ProjectRelativePathBuf> {
        self.binary_output.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct PythonTestDescription {
    config: PythonConfig,
    spec: AttributeSpec,
}

impl PythonTestDescription {
    pub fn new(config: PythonConfig) -> Self {
        PythonTestDescription {
            config,
            spec: AttributeSpec::new(vec![
                ("srcs", Attribute::optional()),
                ("resources", Attribute::optional()),
                ("base_module", Attribute::optional()),
                ("deps", Attribute::optional()),
                ("contacts", Attribute::optional()),
                ("labels", Attribute::optional()),
                ("source_under_test", Attribute::optional()),
            ])
            .unwrap(),
        }
    }
}

impl Description for PythonTestDescription {
    fn rule_type(&self) -> &RuleType {
        &PYTHON_TEST
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
        let test_main = self.config.test_main().ok_or_else(|| {
            ConfigError::MissingRequiredKey {
                section: "python".to_owned(),
                key: "path_to_python_test_main".to_owned(),
            }
        })?;

        let test_components = components_from_args(target, args)?;

        // Convert the declared module paths into importable test module
        // names; the generated source file lists them, sorted.
        let mut test_modules = BTreeSet::new();
        for path in test_components.modules.keys() {
            test_modules.insert(util::to_module_name(target, path)?);
        }

        let modules_target = target.with_flavor(TEST_MODULE_FLAVOR.dupe());
        let modules_rule: Arc<dyn BuildRule> = Arc::new(TestModulesSourceRule::new(
            modules_target.dupe(),
            test_modules_list_contents(&test_modules),
        )?);
        resolver.add_to_index(modules_rule)?;

        // Everything that goes into the test's PEX: the generated modules
        // list, the shared test main, the declared sources, and the
        // components of every library dep.
        let mut all_components = test_components;
        let generated: IndexMap<ForwardRelativePathBuf, SourcePath> = IndexMap::from([
            (
                ForwardRelativePathBuf::unchecked_new(TEST_MODULES_LIST_NAME.to_owned()),
                SourcePath::build_target_output(
                    modules_target.dupe(),
                    ForwardRelativePathBuf::unchecked_new(TEST_MODULES_LIST_NAME.to_owned()),
                ),
            ),
            (
                ForwardRelativePathBuf::unchecked_new(TEST_MAIN_NAME.to_owned()),
                SourcePath::path(test_main.clone()),
            ),
        ]);
        all_components.merge(
            target,
            &crate::binary::PythonPackageComponents {
                modules: generated,
                resources: IndexMap::new(),
            },
        )?;

        let deps: Vec<BuildTarget> = args.get_targets("deps")?.iter().map(|t| t.dupe()).collect();
        all_components.merge(target, &gather_dep_components(target, &deps, resolver)?)?;

        // The PEX sibling, under the `binary` flavor of the same base.
        let binary_target = target.with_flavor(BINARY_FLAVOR.dupe());
        let binary = PythonBinary::new(
            binary_target.dupe(),
            self.config.pex_tool().clone(),
            "__test_main__".to_owned(),
            all_components,
            deps.iter().map(|t| t.dupe()).collect(),
        )?;
        let binary_output = binary.output_path();
        resolver.add_to_index(Arc::new(binary))?;

        let source_under_test: Vec<BuildTarget> = args
            .get_targets("source_under_test")?
            .iter()
            .map(|t| t.dupe())
            .collect();
        resolver.get_all_rules(source_under_test.iter())?;

        Ok(Arc::new(PythonTest {
            target: target.dupe(),
            binary: binary_target.dupe(),
            deps,
            extra_deps: vec![binary_target, modules_target],
            labels: args.get_string_set("labels")?.clone(),
            contacts: args.get_string_set("contacts")?.clone(),
            source_under_test,
            binary_output,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use anvil_build_api::artifact::fs::testing::testing_artifact_fs;
    use anvil_build_api::rule_key::testing::FakeFileHashCache;
    use anvil_build_api::rule_key::RuleKeyFactory;
    use anvil_build_api::rules::known_rule_types::KnownRuleTypes;
    use anvil_core::target::testing::BuildTargetExt;
    use anvil_execute::context::testing::testing_context;
    use anvil_execute::runner::run_steps;
    use anvil_node::attrs::AttrValue;
    use anvil_node::nodes::TargetNode;

    use super::*;
    use crate::toolchain::testing::testing_python_config;
    use crate::PythonDescriptionProvider;

    fn known_rule_types() -> Arc<KnownRuleTypes> {
        let config = testing_python_config();
        Arc::new(
            KnownRuleTypes::new(vec![
                Arc::new(crate::library::PythonLibraryDescription::new()),
                Arc::new(crate::binary::PythonBinaryDescription::new(config.clone())),
                Arc::new(PythonTestDescription::new(config)),
            ])
            .unwrap(),
        )
    }

    fn test_node(target: &str) -> TargetNode {
        let srcs = AttrValue::Dict(IndexMap::from([
            (
                ForwardRelativePathBuf::unchecked_new("test_b.py".into()),
                SourcePath::parse("cell//pkg/test_b.py").unwrap(),
            ),
            (
                ForwardRelativePathBuf::unchecked_new("test_a.py".into()),
                SourcePath::parse("cell//pkg/test_a.py").unwrap(),
            ),
        ]));
        TargetNode::new(
            BuildTarget::testing_parse(target),
            PYTHON_TEST.dupe(),
            IndexMap::from([
                ("srcs".to_owned(), srcs),
                (
                    "labels".to_owned(),
                    AttrValue::StringSet(["unit".to_owned()].into()),
                ),
            ]),
        )
    }

    #[test]
    fn test_modules_list_contents_format() {
        let modules = BTreeSet::from(["pkg.test_b".to_owned(), "pkg.test_a".to_owned()]);
        assert_eq!(
            "TEST_MODULES = [\n    \"pkg.test_a\",\n    \"pkg.test_b\",\n]",
            test_modules_list_contents(&modules)
        );
        assert_eq!("TEST_MODULES = [\n]", test_modules_list_contents(&BTreeSet::new()));
    }

    #[test]
    fn description_synthesizes_flavored_siblings() -> anyhow::Result<()> {
        let mut resolver = anvil_build_api::rules::resolver::BuildRuleResolver::new(
            known_rule_types(),
            vec![test_node("cell//pkg:my_test")],
        )?;
        let test_target = BuildTarget::testing_parse("cell//pkg:my_test");
        let rule = resolver.require_rule(&test_target)?;

        let test = rule.as_any().downcast_ref::<PythonTest>().unwrap();
        assert_eq!("cell//pkg:my_test#binary", test.binary().to_string());
        assert_eq!(&BTreeSet::from(["unit".to_owned()]), test.labels());

        let frozen = resolver.freeze();
        let binary = frozen
            .get_rule(&BuildTarget::testing_parse("cell//pkg:my_test#binary"))
            .expect("binary sibling registered");
        assert_eq!("python_binary", binary.rule_type().name());

        let modules = frozen
            .get_rule(&BuildTarget::testing_parse("cell//pkg:my_test#test_module"))
            .expect("test modules rule registered");
        assert_eq!("create_test_modules_list", modules.rule_type().name());
        Ok(())
    }

    #[tokio::test]
    async fn test_modules_rule_writes_the_exact_bytes() -> anyhow::Result<()> {
        let mut resolver = anvil_build_api::rules::resolver::BuildRuleResolver::new(
            known_rule_types(),
            vec![test_node("cell//pkg:my_test")],
        )?;
        resolver.require_rule(&BuildTarget::testing_parse("cell//pkg:my_test"))?;
        let frozen = Arc::new(resolver.freeze());

        let modules = frozen
            .get_rule(&BuildTarget::testing_parse("cell//pkg:my_test#test_module"))
            .unwrap();

        let (_t, artifact_fs) = testing_artifact_fs();
        let build_ctx =
            anvil_build_api::context::BuildContext::new(artifact_fs.dupe(), frozen.dupe());
        let mut buildable = BuildableContext::new();
        let steps = modules.build_steps(&build_ctx, &mut buildable)?;

        let (_t2, exec_ctx) = testing_context();
        run_steps(&exec_ctx, &steps, Some(modules.build_target()))
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        let output = buildable.recorded_artifacts().first().unwrap();
        assert_eq!(
            "TEST_MODULES = [\n    \"pkg.test_a\",\n    \"pkg.test_b\",\n]",
            exec_ctx.fs().read_to_string(output)?
        );
        Ok(())
    }

    #[test]
    fn rule_keys_are_deterministic_and_cycle_free() -> anyhow::Result<()> {
        let file_hashes = Arc::new(FakeFileHashCache::of_contents(&[
            ("cell//tools/pex.py", "pex tool"),
            ("cell//tools/__test_main__.py", "test main"),
            ("cell//pkg/test_a.py", "a"),
            ("cell//pkg/test_b.py", "b"),
        ]));
        let factory = RuleKeyFactory::new(file_hashes);

        let compute_keys = || -> anyhow::Result<HashMap<String, String>> {
            let mut resolver = anvil_build_api::rules::resolver::BuildRuleResolver::new(
                known_rule_types(),
                vec![test_node("cell//pkg:my_test")],
            )?;
            resolver.require_rule(&BuildTarget::testing_parse("cell//pkg:my_test"))?;
            let frozen = resolver.freeze();
            let mut keys = HashMap::new();
            for rule in frozen.rules() {
                keys.insert(
                    rule.build_target().to_string(),
                    factory.build(rule.as_ref())?.to_string(),
                );
            }
            Ok(keys)
        };

        // The binary's command line references its own output PEX; key
        // computation terminates (cycle break) and is deterministic.
        let first = compute_keys()?;
        let second = compute_keys()?;
        assert_eq!(first, second);
        assert_eq!(3, first.len());
        Ok(())
    }

    #[test]
    fn attr_bag_round_trip_reproduces_the_rule_key() -> anyhow::Result<()> {
        let file_hashes = Arc::new(FakeFileHashCache::of_contents(&[
            ("cell//tools/pex.py", "pex tool"),
            ("cell//tools/__test_main__.py", "test main"),
            ("cell//pkg/test_a.py", "a"),
            ("cell//pkg/test_b.py", "b"),
        ]));
        let factory = RuleKeyFactory::new(file_hashes);
        let target = BuildTarget::testing_parse("cell//pkg:my_test");
        let description = PythonTestDescription::new(testing_python_config());

        let key_for_bag = |bag: &anvil_node::attrs::AttrBag| -> anyhow::Result<String> {
            let mut resolver = anvil_build_api::rules::resolver::BuildRuleResolver::new(
                known_rule_types(),
                vec![],
            )?;
            let rule = description.create_rule(&target, bag, &mut resolver)?;
            Ok(factory.build(rule.as_ref())?.to_string())
        };

        let bag = description
            .attribute_spec()
            .coerce(&target, test_node("cell//pkg:my_test").raw_attrs().clone())?;
        let restored: anvil_node::attrs::AttrBag =
            serde_json::from_str(&serde_json::to_string(&bag)?)?;

        assert_eq!(key_for_bag(&bag)?, key_for_bag(&restored)?);
        Ok(())
    }

    #[test]
    fn missing_test_main_is_a_configuration_error() -> anyhow::Result<()> {
        let config = anvil_core::config::Config::parse(
            "[python]\npath_to_pex = cell//tools/pex.py\n",
        )?;
        let python_config = crate::toolchain::PythonConfig::from_config(&config)?;
        let description = PythonTestDescription::new(python_config);
        let target = BuildTarget::testing_parse("cell//pkg:my_test");

        let bag = description.attribute_spec().coerce(&target, IndexMap::new())?;
        let mut resolver = anvil_build_api::rules::resolver::BuildRuleResolver::new(
            known_rule_types(),
            vec![],
        )?;
        let err = description
            .create_rule(&target, &bag, &mut resolver)
            .unwrap_err();
        assert!(
            err.to_string().contains("path_to_python_test_main"),
            "{}",
            err
        );
        Ok(())
    }

    #[test]
    fn provider_registers_the_family() -> anyhow::Result<()> {
        use anvil_build_api::rules::description::DescriptionProvider;

        let config = anvil_core::config::Config::parse(
            "[python]\npath_to_pex = cell//tools/pex.py\n",
        )?;
        let providers: [&dyn DescriptionProvider; 1] = [&PythonDescriptionProvider];
        let known = KnownRuleTypes::create_instance(&config, &providers)?;
        let names: Vec<&str> = known.rule_types().map(|t| t.name()).collect();
        assert_eq!(vec!["python_library", "python_binary", "python_test"], names);
        Ok(())
    }
}
