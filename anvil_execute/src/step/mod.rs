/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A 'Step' is the smallest executable unit of the build: files in, files
//! out. Steps carry no caching and no concurrency of their own; rules emit
//! ordered lists of them and runners decide what executes where.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::context::StepExecutionContext;
use crate::process::ProcessResult;

pub mod fs;
pub mod run;
pub mod xz;
pub mod zip;

/// The outcome of executing one step. An exit code of zero is success; a
/// failed process step carries its captured stderr so failures can be
/// classified (e.g. dex method-count overflow) after the fact.
#[derive(Clone, Debug)]
pub struct StepExecutionResult {
    exit_code: i32,
    stderr: Option<String>,
}

impl StepExecutionResult {
    pub fn success() -> Self {
        StepExecutionResult {
            exit_code: 0,
            stderr: None,
        }
    }

    pub fn error() -> Self {
        StepExecutionResult {
            exit_code: 1,
            stderr: None,
        }
    }

    pub fn of_process(result: &ProcessResult) -> Self {
        StepExecutionResult {
            exit_code: result.exit_code,
            stderr: Some(result.stderr_lossy()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }
}

#[async_trait]
pub trait Step: Debug + Send + Sync {
    /// A short name for logs and failure classification, e.g. `dx`.
    fn short_name(&self) -> &'static str;

    /// A human readable description of what this step does.
    fn description(&self, ctx: &StepExecutionContext) -> String;

    async fn execute(&self, ctx: &StepExecutionContext)
        -> anyhow::Result<StepExecutionResult>;
}
