/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The smart dexing planner: runs one dexer pipeline per output path, in
//! parallel under a bounded budget, skipping outputs whose recorded input
//! hash is unchanged.
//!
//! Caching is by input checksum rather than output freshness: upstream
//! splitting always rewrites its zip outputs even when their contents did
//! not change, so mtimes prove nothing. The hash of each output's inputs is
//! recorded in the success directory as the last step of its pipeline; a
//! partial failure therefore leaves no marker and the output rebuilds on
//! the next run.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use gazebo::prelude::*;
use indexmap::IndexMap;
use indexmap::IndexSet;
use once_cell::sync::OnceCell;
use sha1::Digest;
use sha1::Sha1;
use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::warn;

use anvil_core::fs::paths::ForwardRelativePath;
use anvil_core::fs::project::ProjectFilesystem;
use anvil_core::fs::project::ProjectRelativePath;
use anvil_core::fs::project::ProjectRelativePathBuf;
use anvil_core::hash::Sha1HashCode;
use anvil_core::target::BuildTarget;
use anvil_execute::context::StepExecutionContext;
use anvil_execute::runner::run_step;
use anvil_execute::runner::run_steps;
use anvil_execute::runner::StepFailedError;
use anvil_execute::step::fs::ConcatStep;
use anvil_execute::step::fs::RmStep;
use anvil_execute::step::fs::WriteFileStep;
use anvil_execute::step::xz::XzStep;
use anvil_execute::step::zip::RepackZipEntriesStep;
use anvil_execute::step::zip::ZipCompressionLevel;
use anvil_execute::step::zip::ZipScrubberStep;
use anvil_execute::step::Step;
use anvil_execute::step::StepExecutionResult;

use crate::dex_store::DexStore;
use crate::dx::DxOption;
use crate::dx::DxStep;
use crate::jar_analysis::DexJarAnalysisStep;
use crate::overflow::check_overflow;
use crate::overflow::DexOverflowError;
use crate::platform::AndroidPlatformTarget;
use crate::platform::DexTool;

pub const SMART_DEX_SHORT_NAME: &str = "smart_dex";

const SECONDARY_SOLID_DEX_EXTENSION: &str = ".dex.jar.xzs";
const UNCOMPRESSED_BLOB_NAME: &str = "uncompressed.dex.blob";

/// Which inputs each output is dexed from.
pub type OutputToInputs = IndexMap<ProjectRelativePathBuf, IndexSet<ProjectRelativePathBuf>>;

/// Construction of the output map may need upstream rules to have resolved,
/// so it is supplied lazily and materialized (once) on first use.
pub type OutputToInputsSupplier =
    Box<dyn Fn() -> anyhow::Result<OutputToInputs> + Send + Sync>;

#[derive(Error, Debug)]
enum SmartDexError {
    #[error("suffix of `{0}` does not have a corresponding dex store type")]
    UnknownSuffix(ProjectRelativePathBuf),
}

/// Content hashes for every dex input, snapshotted before planning starts.
pub trait DexInputHashesProvider: Send + Sync {
    fn dex_input_hashes(&self) -> anyhow::Result<IndexMap<ProjectRelativePathBuf, Sha1HashCode>>;
}

/// A fixed map of input hashes.
pub struct DexInputHashes(pub IndexMap<ProjectRelativePathBuf, Sha1HashCode>);

impl DexInputHashesProvider for DexInputHashes {
    fn dex_input_hashes(&self) -> anyhow::Result<IndexMap<ProjectRelativePathBuf, Sha1HashCode>> {
        Ok(self.0.clone())
    }
}

/// A thread budget for the dexer: half the logical cores, at least one.
/// Hyperthreads do not make external dexers faster but do cost memory, so
/// this approximates the physical core count.
pub fn determine_optimal_thread_count() -> usize {
    std::cmp::max(num_cpus::get() / 2, 1)
}

pub struct SmartDexingParams {
    pub build_target: BuildTarget,
    pub platform: AndroidPlatformTarget,
    pub outputs_to_inputs: OutputToInputsSupplier,
    /// If set, files in this directory that the plan did not produce are
    /// pruned after the dex phase (`.meta` files excepted).
    pub secondary_output_dir: Option<ProjectRelativePathBuf>,
    pub dex_input_hashes: Arc<dyn DexInputHashesProvider>,
    /// Where per-output success hashes live: `<success_dir>/<output name>`.
    pub success_dir: ProjectRelativePathBuf,
    pub dx_options: BTreeSet<DxOption>,
    /// Maximum pipelines in flight at once.
    pub concurrency: usize,
    pub xz_compression_level: u32,
    pub dx_max_heap_size: Option<String>,
    pub dex_tool: DexTool,
    pub desugar_interface_methods: bool,
    /// Extra jars visible to the desugarer of every pseudo rule.
    pub additional_desugar_deps: IndexSet<ProjectRelativePathBuf>,
    pub min_sdk_version: Option<u32>,
}

pub struct SmartDexingStep {
    params: SmartDexingParams,
    outputs_to_inputs: OnceCell<OutputToInputs>,
}

impl fmt::Debug for SmartDexingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartDexingStep")
            .field("build_target", &self.params.build_target)
            .field("success_dir", &self.params.success_dir)
            .field("concurrency", &self.params.concurrency)
            .finish_non_exhaustive()
    }
}

impl SmartDexingStep {
    pub fn new(params: SmartDexingParams) -> Self {
        SmartDexingStep {
            params,
            outputs_to_inputs: OnceCell::new(),
        }
    }

    fn outputs_to_inputs(&self) -> anyhow::Result<&OutputToInputs> {
        self.outputs_to_inputs
            .get_or_try_init(|| (self.params.outputs_to_inputs)())
    }

    /// One pseudo rule per output, skipping the ones whose recorded input
    /// hash matches. The step set this returns depends only on the output
    /// map, the input hashes and the success directory.
    fn generate_dx_step_lists(
        &self,
        fs: &ProjectFilesystem,
        outputs_to_inputs: &OutputToInputs,
    ) -> anyhow::Result<Vec<Vec<Box<dyn Step>>>> {
        let dex_input_hashes = self.params.dex_input_hashes.dex_input_hashes()?;
        let all_inputs: IndexSet<ProjectRelativePathBuf> =
            outputs_to_inputs.values().flatten().cloned().collect();

        let mut pipelines = Vec::new();
        for (output, inputs) in outputs_to_inputs {
            let classpath_files: Vec<ProjectRelativePathBuf> =
                if self.params.desugar_interface_methods {
                    all_inputs
                        .iter()
                        .filter(|input| !inputs.contains(*input))
                        .chain(self.params.additional_desugar_deps.iter())
                        .cloned()
                        .collect()
                } else {
                    Vec::new()
                };

            let output_name = output
                .file_name()
                .ok_or_else(|| SmartDexError::UnknownSuffix(output.clone()))?;
            let pseudo_rule = DxPseudoRule {
                platform: self.params.platform.dupe(),
                srcs: inputs.clone(),
                output_path: output.clone(),
                output_hash_path: self.params.success_dir.join(output_name),
                dx_options: self.params.dx_options.clone(),
                xz_compression_level: self.params.xz_compression_level,
                dx_max_heap_size: self.params.dx_max_heap_size.clone(),
                dex_tool: self.params.dex_tool,
                classpath_files,
                min_sdk_version: self.params.min_sdk_version,
            };

            let new_hash = pseudo_rule.hash_inputs(&dex_input_hashes);
            if pseudo_rule.check_is_cached(fs, &new_hash) {
                debug!("up to date: {}", output);
                continue;
            }
            pipelines.push(pseudo_rule.steps(&new_hash)?);
        }
        Ok(pipelines)
    }

    /// Runs pipelines with at most `concurrency` in flight. After the first
    /// failure no new pipelines start; in-flight ones are drained, their
    /// failures logged. The first failure is the one reported.
    async fn run_pipelines(
        &self,
        ctx: &StepExecutionContext,
        pipelines: Vec<Vec<Box<dyn Step>>>,
    ) -> Result<(), StepFailedError> {
        let concurrency = std::cmp::max(self.params.concurrency, 1);
        let mut pending = pipelines.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut first_failure: Option<StepFailedError> = None;

        loop {
            if first_failure.is_none() {
                while in_flight.len() < concurrency {
                    match pending.next() {
                        Some(steps) => in_flight.push(async move {
                            run_steps(ctx, &steps, Some(&self.params.build_target)).await
                        }),
                        None => break,
                    }
                }
            }
            match in_flight.next().await {
                Some(Ok(())) => {}
                Some(Err(failure)) => {
                    if first_failure.is_none() {
                        first_failure = Some(failure);
                    } else {
                        warn!("additional dex pipeline failure: {:#}", failure);
                    }
                }
                None => break,
            }
        }

        match first_failure {
            None => Ok(()),
            Some(failure) => Err(failure),
        }
    }

    /// Prunes files we did not generate from the secondary output dir. The
    /// whole directory is packaged, and this run may have produced fewer
    /// outputs than the last one left behind.
    fn remove_extraneous_secondary_artifacts(
        &self,
        fs: &ProjectFilesystem,
        secondary_output_dir: &ProjectRelativePath,
        produced: &OutputToInputs,
    ) -> anyhow::Result<()> {
        for entry in fs.directory_contents(secondary_output_dir)? {
            if !produced.contains_key(&entry) && !entry.ends_with_str(".meta") {
                debug!("pruning stale secondary output: {}", entry);
                fs.remove_path_recursive(&entry)?;
            }
        }
        Ok(())
    }

    /// Groups solid-compression outputs by the first dash-separated token
    /// of their file name: `secondary-1.dex.jar.xzs` and
    /// `secondary-2.dex.jar.xzs` both land in `secondary.dex.jar.xzs`.
    fn create_xzs_outputs_to_inputs(
        outputs_to_inputs: &OutputToInputs,
    ) -> IndexMap<ProjectRelativePathBuf, Vec<ProjectRelativePathBuf>> {
        let mut groups: IndexMap<ProjectRelativePathBuf, Vec<ProjectRelativePathBuf>> =
            IndexMap::new();
        for output in outputs_to_inputs.keys() {
            if !DexStore::Xzs.matches_path(output) {
                continue;
            }
            let file_name = match output.file_name() {
                Some(name) => name.as_str(),
                None => continue,
            };
            let token = file_name.split('-').next().unwrap_or(file_name);
            let parent = output.parent().unwrap_or_else(|| ProjectRelativePath::empty());
            let group_output = parent.join(ForwardRelativePath::unchecked_new(&format!(
                "{}{}",
                token, SECONDARY_SOLID_DEX_EXTENSION
            )));
            groups.entry(group_output).or_default().push(output.clone());
        }
        groups
    }

    /// Concatenates each group into a blob and compresses the blob as a
    /// unit. Groups run sequentially, one at a time, strictly after every
    /// dex pipeline has finished.
    async fn run_xzs_commands(
        &self,
        ctx: &StepExecutionContext,
        groups: &IndexMap<ProjectRelativePathBuf, Vec<ProjectRelativePathBuf>>,
    ) -> Result<(), StepFailedError> {
        for (group_output, dex_jars) in groups {
            let parent = group_output
                .parent()
                .unwrap_or_else(|| ProjectRelativePath::empty());
            let blob =
                parent.join(ForwardRelativePath::unchecked_new(UNCOMPRESSED_BLOB_NAME));

            let concat = ConcatStep::new(dex_jars.clone(), blob.clone());
            let xz = XzStep::with_destination(
                blob,
                group_output.clone(),
                self.params.xz_compression_level,
            );
            run_step(ctx, &concat, Some(&self.params.build_target)).await?;
            run_step(ctx, &xz, Some(&self.params.build_target)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Step for SmartDexingStep {
    fn short_name(&self) -> &'static str {
        SMART_DEX_SHORT_NAME
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        let outputs_to_inputs = match self.outputs_to_inputs() {
            Ok(map) => map,
            Err(_) => return SMART_DEX_SHORT_NAME.to_owned(),
        };
        let mut description = String::from(SMART_DEX_SHORT_NAME);
        if let Some(min_sdk) = self.params.min_sdk_version {
            description.push_str(&format!(" --min-sdk-version {}", min_sdk));
        }
        for (output, inputs) in outputs_to_inputs {
            description.push_str(&format!(
                " -out {} -in {}",
                output,
                inputs
                    .iter()
                    .map(|input| input.as_str())
                    .collect::<Vec<_>>()
                    .join(":")
            ));
        }
        description
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        let outputs_to_inputs = self.outputs_to_inputs()?;

        let pipelines = self.generate_dx_step_lists(ctx.fs(), outputs_to_inputs)?;
        if let Err(failure) = self.run_pipelines(ctx, pipelines).await {
            match check_overflow(&failure) {
                Some(overflow_type) => {
                    let overflow = DexOverflowError::new(overflow_type, &failure);
                    error!("{}", overflow.message());
                }
                None => error!("there was an error in smart dexing step: {:#}", failure),
            }
            return Ok(StepExecutionResult::error());
        }

        if let Some(secondary_output_dir) = &self.params.secondary_output_dir {
            self.remove_extraneous_secondary_artifacts(
                ctx.fs(),
                secondary_output_dir,
                outputs_to_inputs,
            )?;

            let xzs_groups = Self::create_xzs_outputs_to_inputs(outputs_to_inputs);
            if !xzs_groups.is_empty() {
                if let Err(failure) = self.run_xzs_commands(ctx, &xzs_groups).await {
                    error!(
                        "there was an error producing an xzs file from dex jars: {:#}",
                        failure
                    );
                    return Ok(StepExecutionResult::error());
                }
            }
        }

        Ok(StepExecutionResult::success())
    }
}

/// The per-output unit of caching and execution. Not a real build rule:
/// upstream zip splitting rewrites its outputs unconditionally, so this
/// checksums inputs itself instead of using the ordinary rule-level cache.
struct DxPseudoRule {
    platform: AndroidPlatformTarget,
    srcs: IndexSet<ProjectRelativePathBuf>,
    output_path: ProjectRelativePathBuf,
    output_hash_path: ProjectRelativePathBuf,
    dx_options: BTreeSet<DxOption>,
    xz_compression_level: u32,
    dx_max_heap_size: Option<String>,
    dex_tool: DexTool,
    classpath_files: Vec<ProjectRelativePathBuf>,
    min_sdk_version: Option<u32>,
}

impl DxPseudoRule {
    /// The combined hash of this output's inputs, in sorted path order. A
    /// missing entry in the snapshot is a programmer error.
    fn hash_inputs(&self, dex_input_hashes: &IndexMap<ProjectRelativePathBuf, Sha1HashCode>) -> String {
        let mut sorted: Vec<&ProjectRelativePathBuf> = self.srcs.iter().collect();
        sorted.sort();

        let mut hasher = Sha1::new();
        for src in sorted {
            let hash = dex_input_hashes
                .get(src)
                .unwrap_or_else(|| panic!("no hash key exists for path {}", src));
            hash.update(&mut hasher);
        }
        hex::encode(hasher.finalize())
    }

    /// Fresh iff the output exists and the recorded hash matches. The
    /// output's mtime is deliberately not consulted.
    fn check_is_cached(&self, fs: &ProjectFilesystem, new_hash: &str) -> bool {
        if !fs.exists(&self.output_hash_path) || !fs.exists(&self.output_path) {
            return false;
        }
        fs.read_first_line(&self.output_hash_path).as_deref() == Some(new_hash)
    }

    /// The ordered pipeline for this output. The success-hash write is the
    /// last step, so a partial failure leaves no marker.
    fn steps(&self, new_hash: &str) -> anyhow::Result<Vec<Box<dyn Step>>> {
        let mut steps = Vec::new();
        self.add_dx_steps(&mut steps)?;
        steps.push(Box::new(WriteFileStep::new(
            new_hash.as_bytes().to_vec(),
            self.output_hash_path.clone(),
            false,
        )) as Box<dyn Step>);
        Ok(steps)
    }

    fn dx_step(&self, output: ProjectRelativePathBuf) -> Box<dyn Step> {
        Box::new(DxStep::new(
            self.platform.dupe(),
            output,
            self.srcs.iter().cloned().collect(),
            self.dx_options.clone(),
            self.dx_max_heap_size.clone(),
            self.dex_tool,
            self.classpath_files.clone(),
            self.min_sdk_version,
        ))
    }

    /// The pipeline shape is keyed off the output suffix, much as the dexer
    /// itself decides whether to emit a bare dex or embed it in a jar based
    /// on the destination file name.
    fn add_dx_steps(&self, steps: &mut Vec<Box<dyn Step>>) -> anyhow::Result<()> {
        let output = self.output_path.as_str();
        if DexStore::Xz.matches_path(&self.output_path) {
            // Dex into a temp jar, repack with classes.dex STOREd (xz over
            // an already-deflated entry is wasted work), analyze, compress.
            let temp_jar = ProjectRelativePathBuf::unchecked_new(format!(
                "{}.tmp.jar",
                output.strip_suffix(".jar.xz").unwrap()
            ));
            let repacked_jar =
                ProjectRelativePathBuf::unchecked_new(output.strip_suffix(".xz").unwrap().to_owned());
            steps.push(self.dx_step(temp_jar.clone()));
            steps.push(Box::new(RepackZipEntriesStep::new(
                temp_jar.clone(),
                repacked_jar.clone(),
                ["classes.dex".to_owned()],
                ZipCompressionLevel::None,
            )));
            steps.push(Box::new(RmStep::new(temp_jar)));
            steps.push(Box::new(DexJarAnalysisStep::new(
                repacked_jar.clone(),
                meta_path(&repacked_jar),
            )));
            steps.push(Box::new(XzStep::new(repacked_jar, self.xz_compression_level)));
        } else if DexStore::Xzs.matches_path(&self.output_path) {
            // Same shape as the xz case, except compression is deferred to
            // the solid-concat phase.
            let temp_jar = ProjectRelativePathBuf::unchecked_new(format!(
                "{}.tmp.jar",
                output.strip_suffix(".jar.xzs").unwrap()
            ));
            steps.push(self.dx_step(temp_jar.clone()));
            steps.push(Box::new(RepackZipEntriesStep::new(
                temp_jar.clone(),
                self.output_path.clone(),
                ["classes.dex".to_owned()],
                ZipCompressionLevel::None,
            )));
            steps.push(Box::new(RmStep::new(temp_jar)));
            steps.push(Box::new(DexJarAnalysisStep::new(
                self.output_path.clone(),
                meta_path(&self.output_path),
            )));
        } else if DexStore::Jar.matches_path(&self.output_path)
            || DexStore::Raw.matches_path(&self.output_path)
            || output.ends_with("classes.dex")
        {
            steps.push(self.dx_step(self.output_path.clone()));
            if DexStore::Jar.matches_path(&self.output_path) {
                steps.push(Box::new(DexJarAnalysisStep::new(
                    self.output_path.clone(),
                    meta_path(&self.output_path),
                )));
                steps.push(Box::new(ZipScrubberStep::new(self.output_path.clone())));
            }
        } else {
            return Err(SmartDexError::UnknownSuffix(self.output_path.clone()).into());
        }
        Ok(())
    }
}

fn meta_path(jar: &ProjectRelativePath) -> ProjectRelativePathBuf {
    ProjectRelativePathBuf::unchecked_new(format!("{}.meta", jar))
}
