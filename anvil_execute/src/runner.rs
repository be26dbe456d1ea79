/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Runs steps, attributing failures to the target that owns them. There is
//! deliberately no retry policy here; retries are a higher-layer concern.

use std::fmt;

use thiserror::Error;
use tracing::debug;
use tracing::error;

use anvil_core::target::BuildTarget;

use crate::context::StepExecutionContext;
use crate::step::Step;

/// A step that did not succeed, with enough structure for callers to
/// classify the failure (e.g. recognize a dex method-count overflow from the
/// step's short name and captured stderr).
#[derive(Error, Debug)]
pub struct StepFailedError {
    step_short_name: String,
    description: String,
    owning_target: Option<BuildTarget>,
    exit_code: Option<i32>,
    stderr: Option<String>,
    #[source]
    source: Option<anyhow::Error>,
}

impl fmt::Display for StepFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owning_target {
            Some(target) => write!(f, "{}: ", target)?,
            None => {}
        }
        write!(f, "step `{}` failed: {}", self.step_short_name, self.description)?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit code {})", code)?;
        }
        Ok(())
    }
}

impl StepFailedError {
    pub fn step_short_name(&self) -> &str {
        &self.step_short_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn owning_target(&self) -> Option<&BuildTarget> {
        self.owning_target.as_ref()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }
}

/// Executes one step, logging it and converting a non-success result into a
/// 'StepFailedError' carrying the owning target.
pub async fn run_step(
    ctx: &StepExecutionContext,
    step: &dyn Step,
    owning_target: Option<&BuildTarget>,
) -> Result<(), StepFailedError> {
    let description = step.description(ctx);
    debug!(step = step.short_name(), "{}", description);

    match step.execute(ctx).await {
        Ok(result) if result.is_success() => Ok(()),
        Ok(result) => {
            error!(
                step = step.short_name(),
                exit_code = result.exit_code(),
                "step failed: {}",
                description
            );
            Err(StepFailedError {
                step_short_name: step.short_name().to_owned(),
                description,
                owning_target: owning_target.cloned(),
                exit_code: Some(result.exit_code()),
                stderr: result.stderr().map(|s| s.to_owned()),
                source: None,
            })
        }
        Err(e) => {
            error!(step = step.short_name(), "step raised: {:#}", e);
            Err(StepFailedError {
                step_short_name: step.short_name().to_owned(),
                description,
                owning_target: owning_target.cloned(),
                exit_code: None,
                stderr: None,
                source: Some(e),
            })
        }
    }
}

/// Executes a sequence of steps in order, stopping at the first failure.
pub async fn run_steps(
    ctx: &StepExecutionContext,
    steps: &[Box<dyn Step>],
    owning_target: Option<&BuildTarget>,
) -> Result<(), StepFailedError> {
    for step in steps {
        run_step(ctx, step.as_ref(), owning_target).await?;
    }
    Ok(())
}

pub mod testing {
    use anvil_core::target::BuildTarget;

    use crate::runner::StepFailedError;

    /// A synthetic step failure, for exercising failure classification.
    pub fn failed_step(
        short_name: &str,
        owning_target: Option<BuildTarget>,
        stderr: &str,
    ) -> StepFailedError {
        StepFailedError {
            step_short_name: short_name.to_owned(),
            description: format!("{} ...", short_name),
            owning_target,
            exit_code: Some(1),
            stderr: Some(stderr.to_owned()),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use anvil_core::target::testing::BuildTargetExt;

    use super::*;
    use crate::context::testing::testing_context;
    use crate::step::StepExecutionResult;

    #[derive(Debug)]
    struct FixedStep(StepExecutionResult);

    #[async_trait]
    impl Step for FixedStep {
        fn short_name(&self) -> &'static str {
            "fixed"
        }

        fn description(&self, _ctx: &StepExecutionContext) -> String {
            "a fixed step".to_owned()
        }

        async fn execute(
            &self,
            _ctx: &StepExecutionContext,
        ) -> anyhow::Result<StepExecutionResult> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn failure_carries_owner_and_exit_code() {
        let (_t, ctx) = testing_context();
        let target = BuildTarget::testing_parse("cell//a:b");
        let err = run_step(&ctx, &FixedStep(StepExecutionResult::error()), Some(&target))
            .await
            .unwrap_err();
        assert_eq!("fixed", err.step_short_name());
        assert_eq!(Some(&target), err.owning_target());
        assert_eq!(Some(1), err.exit_code());
        assert!(err.to_string().contains("cell//a:b"));
    }

    #[tokio::test]
    async fn sequence_stops_at_first_failure() {
        let (_t, ctx) = testing_context();
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(FixedStep(StepExecutionResult::success())),
            Box::new(FixedStep(StepExecutionResult::error())),
            Box::new(FixedStep(StepExecutionResult::success())),
        ];
        assert!(run_steps(&ctx, &steps, None).await.is_err());
    }
}
