/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! `python_binary`: packages a module map into a PEX using the configured
//! packer. The packer invocation is assembled as a command-line-args bundle
//! whose output artifact is the rule's own PEX, which is exactly the shape
//! the rule-key cycle break exists for.

use std::any::Any;
use std::sync::Arc;

use gazebo::prelude::*;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use thiserror::Error;

use anvil_build_api::artifact::ActionId;
use anvil_build_api::artifact::DeclaredArtifact;
use anvil_build_api::cmd_args::CommandLineArgs;
use anvil_build_api::context::BuildContext;
use anvil_build_api::path::GenPath;
use anvil_build_api::rule_key::RuleKeyBuilder;
use anvil_build_api::rules::description::Description;
use anvil_build_api::rules::resolver::BuildRuleResolver;
use anvil_build_api::rules::BuildRule;
use anvil_build_api::rules::BuildableContext;
use anvil_core::cells::CellPath;
use anvil_core::fs::paths::ForwardRelativePathBuf;
use anvil_core::fs::project::ProjectRelativePathBuf;
use anvil_core::source_path::SourcePath;
use anvil_core::target::BuildTarget;
use anvil_execute::process::ProcessCommand;
use anvil_execute::step::fs::MkdirStep;
use anvil_execute::step::run::RunCommandStep;
use anvil_execute::step::Step;
use anvil_node::attrs::AttrBag;
use anvil_node::attrs::Attribute;
use anvil_node::attrs::AttributeSpec;
use anvil_node::rule_type::RuleType;

use crate::library::gather_dep_components;
use crate::toolchain::PythonConfig;

pub static PYTHON_BINARY: Lazy<RuleType> = Lazy::new(|| RuleType::new("python_binary"));

#[derive(Error, Debug)]
enum PythonBinaryError {
    #[error("`{target}`: component `{path}` is provided by two different sources")]
    ConflictingComponent {
        target: BuildTarget,
        path: ForwardRelativePathBuf,
    },
    #[error("pex invocation for `{target}` produced an empty command line")]
    EmptyCommandLine { target: BuildTarget },
}

/// Everything that goes into a python package: modules and resources, by
/// destination path within the package.
#[derive(Clone, Debug, Default)]
pub struct PythonPackageComponents {
    pub modules: IndexMap<ForwardRelativePathBuf, SourcePath>,
    pub resources: IndexMap<ForwardRelativePathBuf, SourcePath>,
}

impl PythonPackageComponents {
    /// Adds all of `other`, rejecting destinations that are already present
    /// with a different source.
    pub fn merge(
        &mut self,
        target: &BuildTarget,
        other: &PythonPackageComponents,
    ) -> anyhow::Result<()> {
        merge_component_map(target, &mut self.modules, &other.modules)?;
        merge_component_map(target, &mut self.resources, &other.resources)?;
        Ok(())
    }

    pub fn append_to_rule_key(&self, builder: &mut RuleKeyBuilder) -> anyhow::Result<()> {
        for (dest, source) in &self.modules {
            builder.set_source_path(dest.as_str(), source)?;
        }
        for (dest, source) in &self.resources {
            builder.set_source_path(dest.as_str(), source)?;
        }
        Ok(())
    }
}

fn merge_component_map(
    target: &BuildTarget,
    into: &mut IndexMap<ForwardRelativePathBuf, SourcePath>,
    from: &IndexMap<ForwardRelativePathBuf, SourcePath>,
) -> anyhow::Result<()> {
    for (dest, source) in from {
        match into.get(dest) {
            None => {
                into.insert(dest.clone(), source.clone());
            }
            Some(existing) if existing == source => {}
            Some(_) => {
                return Err(PythonBinaryError::ConflictingComponent {
                    target: target.dupe(),
                    path: dest.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

/// A PEX built from a module map by the configured packer.
#[derive(Debug)]
pub struct PythonBinary {
    target: BuildTarget,
    pex_tool: CellPath,
    main_module: String,
    components: PythonPackageComponents,
    deps: Vec<BuildTarget>,
    output: DeclaredArtifact,
}

impl PythonBinary {
    pub fn new(
        target: BuildTarget,
        pex_tool: CellPath,
        main_module: String,
        components: PythonPackageComponents,
        deps: Vec<BuildTarget>,
    ) -> anyhow::Result<Self> {
        let output = DeclaredArtifact::new(GenPath::new(
            target.dupe(),
            ForwardRelativePathBuf::unchecked_new(format!("{}.pex", target.name())),
        ));
        output.as_output().bind(ActionId::new(target.dupe(), 0))?;
        Ok(PythonBinary {
            target,
            pex_tool,
            main_module,
            components,
            deps,
            output,
        })
    }

    pub fn pex_output(&self) -> &DeclaredArtifact {
        &self.output
    }

    /// The packer command line. Also the rule's principal key contribution:
    /// it names the tool, the entry point, every component, and the output
    /// artifact (which reduces to this target's canonical form).
    fn pex_command(&self) -> CommandLineArgs {
        let mut args = CommandLineArgs::new()
            .add(SourcePath::path(self.pex_tool.clone()))
            .add_formatted(self.output.as_output(), "--output={}")
            .add_formatted(self.main_module.clone(), "--entry-point={}");
        for (dest, source) in &self.components.modules {
            args = args.add_formatted(source.clone(), &format!("--module={}={{}}", dest));
        }
        for (dest, source) in &self.components.resources {
            args = args.add_formatted(source.clone(), &format!("--resource={}={{}}", dest));
        }
        args.add_env("PEX_ROOT", "anvil-out/pex-root")
    }
}

impl BuildRule for PythonBinary {
    fn build_target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &RuleType {
        &PYTHON_BINARY
    }

    fn declared_deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn append_to_rule_key(&self, builder: &mut RuleKeyBuilder) -> anyhow::Result<()> {
        builder.set_string("main_module", &self.main_module)?;
        builder.set_cmd_args("pex_command", &self.pex_command())?;
        Ok(())
    }

    fn build_steps(
        &self,
        ctx: &BuildContext,
        buildable: &mut BuildableContext,
    ) -> anyhow::Result<Vec<Box<dyn Step>>> {
        let output_path = ctx.artifact_fs().resolve_gen(self.output.get_path())?;

        let command_line = self.pex_command();
        let argv = ctx.stringify_args(&command_line)?;
        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| PythonBinaryError::EmptyCommandLine {
                target: self.target.dupe(),
            })?;
        let mut command = ProcessCommand::new(exe.into(), args.to_vec());
        for (key, value) in command_line.env() {
            command = command.env(key, value);
        }

        let mut steps: Vec<Box<dyn Step>> = Vec::new();
        if let Some(parent) = output_path.parent() {
            steps.push(Box::new(MkdirStep::new(parent.to_buf())));
        }
        steps.push(Box::new(RunCommandStep::new("pex", command)));
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

pub struct PythonBinaryDescription {
    config: PythonConfig,
    spec: AttributeSpec,
}

impl PythonBinaryDescription {
    pub fn new(config: PythonConfig) -> Self {
        PythonBinaryDescription {
            config,
            spec: AttributeSpec::new(vec![
                ("main_module", Attribute::required()),
                ("deps", Attribute::optional()),
            ])
            .unwrap(),
        }
    }
}

impl Description for PythonBinaryDescription {
    fn rule_type(&self) -> &RuleType {
        &PYTHON_BINARY
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
        let deps: Vec<BuildTarget> = args.get_targets("deps")?.iter().map(|t| t.dupe()).collect();
        let components = gather_dep_components(target, &deps, resolver)?;
        Ok(Arc::new(PythonBinary::new(
            target.dupe(),
            self.config.pex_tool().clone(),
            args.get_string("main_module")?.to_owned(),
            components,
            deps,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use anvil_build_api::artifact::fs::testing::testing_artifact_fs;
    use anvil_build_api::rules::known_rule_types::KnownRuleTypes;
    use anvil_build_api::rules::resolver::BuildRuleResolver;
    use anvil_build_api::rules::BuildableContext;
    use anvil_core::target::testing::BuildTargetExt;
    use anvil_execute::context::testing::testing_context;
    use anvil_execute::runner::run_steps;
    use anvil_node::attrs::AttrValue;
    use anvil_node::nodes::TargetNode;

    use super::*;
    use crate::library::PythonLibraryDescription;
    use crate::toolchain::testing::testing_python_config;

    fn nodes() -> Vec<TargetNode> {
        let srcs = AttrValue::Dict(IndexMap::from([(
            ForwardRelativePathBuf::unchecked_new("lib.py".into()),
            SourcePath::parse("cell//pkg/lib.py").unwrap(),
        )]));
        vec![
            TargetNode::new(
                BuildTarget::testing_parse("cell//pkg:lib"),
                crate::library::PYTHON_LIBRARY.dupe(),
                IndexMap::from([("srcs".to_owned(), srcs)]),
            ),
            TargetNode::new(
                BuildTarget::testing_parse("cell//pkg:bin"),
                PYTHON_BINARY.dupe(),
                IndexMap::from([
                    (
                        "main_module".to_owned(),
                        AttrValue::String("pkg.lib".to_owned()),
                    ),
                    (
                        "deps".to_owned(),
                        AttrValue::Targets(BTreeSet::from([BuildTarget::testing_parse(
                            "cell//pkg:lib",
                        )])),
                    ),
                ]),
            ),
        ]
    }

    #[tokio::test]
    async fn pex_is_built_by_one_tool_invocation() -> anyhow::Result<()> {
        let config = testing_python_config();
        let known = Arc::new(KnownRuleTypes::new(vec![
            Arc::new(PythonLibraryDescription::new()),
            Arc::new(PythonBinaryDescription::new(config)),
        ])?);
        let mut resolver = BuildRuleResolver::new(known, nodes())?;
        let binary = resolver.require_rule(&BuildTarget::testing_parse("cell//pkg:bin"))?;
        let frozen = Arc::new(resolver.freeze());

        let (_t, artifact_fs) = testing_artifact_fs();
        let build_ctx = BuildContext::new(artifact_fs, frozen);
        let mut buildable = BuildableContext::new();
        let steps = binary.build_steps(&build_ctx, &mut buildable)?;

        let names: Vec<_> = steps.iter().map(|step| step.short_name()).collect();
        assert_eq!(vec!["mkdir", "pex"], names);
        assert_eq!(
            "anvil-out/gen/cell/pkg/bin/bin.pex",
            buildable.recorded_artifacts().first().unwrap().as_str()
        );

        let (_t2, exec_ctx) = testing_context();
        run_steps(&exec_ctx, &steps, Some(binary.build_target()))
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        // The pex tool saw the resolved output path and module map.
        let description = steps[1].description(&exec_ctx);
        assert!(description.contains("tools/pex.py"), "{}", description);
        assert!(
            description.contains("--output=anvil-out/gen/cell/pkg/bin/bin.pex"),
            "{}",
            description
        );
        assert!(
            description.contains("--module=pkg/lib.py=pkg/lib.py"),
            "{}",
            description
        );
        Ok(())
    }
}
