/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Classification of dexer failures that mean "too much code for one dex",
//! recognized by pattern over the failed step and rendered with an
//! actionable message instead of raw tool output.

use anvil_execute::runner::StepFailedError;

use crate::dx::DX_SHORT_NAME;

/// Which 64K reference table overflowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowType {
    Method,
    Field,
}

// The dialects of the two dexers we invoke.
const D8_OVERFLOW: &str = "Cannot fit requested classes in a single dex file";
const DX_METHOD_OVERFLOW: &str = "method ID not in [0, 0xffff]";
const DX_FIELD_OVERFLOW: &str = "field ID not in [0, 0xffff]";

/// Checks whether a failed step was the dexer hitting a reference-table
/// limit. Anything else is `None` and reported as an ordinary step failure.
pub fn check_overflow(error: &StepFailedError) -> Option<OverflowType> {
    if error.step_short_name() != DX_SHORT_NAME {
        return None;
    }
    let stderr = error.stderr()?;
    if stderr.contains(DX_FIELD_OVERFLOW) || stderr.contains("# fields:") {
        return Some(OverflowType::Field);
    }
    if stderr.contains(DX_METHOD_OVERFLOW)
        || stderr.contains(D8_OVERFLOW)
        || stderr.contains("# methods:")
    {
        return Some(OverflowType::Method);
    }
    None
}

/// A classified overflow, rendered for humans.
#[derive(Debug)]
pub struct DexOverflowError {
    overflow: OverflowType,
    step_description: String,
    owning_target: Option<String>,
}

impl DexOverflowError {
    pub fn new(overflow: OverflowType, failed: &StepFailedError) -> Self {
        DexOverflowError {
            overflow,
            step_description: failed.description().to_owned(),
            owning_target: failed.owning_target().map(|target| target.to_string()),
        }
    }

    pub fn overflow_type(&self) -> OverflowType {
        self.overflow
    }

    pub fn message(&self) -> String {
        let what = match self.overflow {
            OverflowType::Method => "method references",
            OverflowType::Field => "field references",
        };
        let mut message = String::new();
        if let Some(target) = &self.owning_target {
            message.push_str(&format!("{}: ", target));
        }
        message.push_str(&format!(
            "the number of {} in the output dex exceeds the 64K limit.\n\
             Failed invocation: {}\n\
             Try splitting the inputs across more secondary dexes, raising the \
             secondary dex count, or trimming dependencies that pull in unused code.",
            what, self.step_description
        ));
        message
    }
}

#[cfg(test)]
mod tests {
    use anvil_execute::runner::testing::failed_step;

    use super::*;

    #[test]
    fn classifies_each_dialect() {
        for (stderr, expected) in [
            (D8_OVERFLOW, Some(OverflowType::Method)),
            (DX_METHOD_OVERFLOW, Some(OverflowType::Method)),
            (DX_FIELD_OVERFLOW, Some(OverflowType::Field)),
            ("some unrelated dexer crash", None),
        ] {
            let error = failed_step(DX_SHORT_NAME, None, stderr);
            assert_eq!(expected, check_overflow(&error), "stderr: {}", stderr);
        }
    }

    #[test]
    fn non_dexer_steps_are_never_overflows() {
        let error = failed_step("write_file", None, D8_OVERFLOW);
        assert_eq!(None, check_overflow(&error));
    }

    #[test]
    fn message_is_actionable() {
        let error = failed_step(DX_SHORT_NAME, None, D8_OVERFLOW);
        let overflow = DexOverflowError::new(OverflowType::Method, &error);
        let message = overflow.message();
        assert!(message.contains("method references"));
        assert!(message.contains("64K limit"));
    }
}
