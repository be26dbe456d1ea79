/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A container for the objects that become an external program's command
//! line. Objects are stringified late, by the artifact filesystem, when the
//! rule's steps are materialized; until then artifacts stay typed.
//!
//! For rule keys the objects are reduced first: an 'OutputArtifact' to its
//! inner artifact, and a bound artifact whose source is a build-target
//! source to the producing target's canonical form. Without that reduction
//! a rule holding its own output in its command line would recurse into
//! itself when keyed.

use std::collections::BTreeMap;

use anvil_core::source_path::SourcePath;

use crate::artifact::Artifact;
use crate::artifact::OutputArtifact;

/// The format string applied when none is given: the bare stringification.
pub const DEFAULT_FORMAT_STRING: &str = "{}";

/// One raw command line argument.
#[derive(Clone, Debug)]
pub enum CommandLineArg {
    String(String),
    SourcePath(SourcePath),
    Artifact(Artifact),
    Output(OutputArtifact),
}

impl From<&str> for CommandLineArg {
    fn from(s: &str) -> Self {
        CommandLineArg::String(s.to_owned())
    }
}

impl From<String> for CommandLineArg {
    fn from(s: String) -> Self {
        CommandLineArg::String(s)
    }
}

impl From<Artifact> for CommandLineArg {
    fn from(artifact: Artifact) -> Self {
        CommandLineArg::Artifact(artifact)
    }
}

impl From<OutputArtifact> for CommandLineArg {
    fn from(output: OutputArtifact) -> Self {
        CommandLineArg::Output(output)
    }
}

impl From<SourcePath> for CommandLineArg {
    fn from(path: SourcePath) -> Self {
        CommandLineArg::SourcePath(path)
    }
}

/// An argument plus the format string applied after stringification. The
/// format string contains a single `{}` that the stringified object
/// replaces.
#[derive(Clone, Debug)]
pub struct ArgAndFormatString {
    object: CommandLineArg,
    post_format: String,
}

impl ArgAndFormatString {
    pub fn object(&self) -> &CommandLineArg {
        &self.object
    }

    pub fn post_format(&self) -> &str {
        &self.post_format
    }

    /// Applies the format string to the stringified object.
    pub fn apply(&self, stringified: &str) -> String {
        self.post_format.replacen("{}", stringified, 1)
    }
}

/// An ordered list of arguments plus a sorted environment map.
#[derive(Clone, Debug, Default)]
pub struct CommandLineArgs {
    args: Vec<ArgAndFormatString>,
    env: BTreeMap<String, String>,
}

impl CommandLineArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, object: impl Into<CommandLineArg>) -> Self {
        self.args.push(ArgAndFormatString {
            object: object.into(),
            post_format: DEFAULT_FORMAT_STRING.to_owned(),
        });
        self
    }

    /// Adds an argument with a post-stringification format string, e.g.
    /// `--out={}`.
    pub fn add_formatted(mut self, object: impl Into<CommandLineArg>, format: &str) -> Self {
        self.args.push(ArgAndFormatString {
            object: object.into(),
            post_format: format.to_owned(),
        });
        self
    }

    pub fn add_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn args(&self) -> impl Iterator<Item = &ArgAndFormatString> {
        self.args.iter()
    }

    /// The environment, in sorted order.
    pub fn env(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Visits the artifacts this command line reads and the outputs it
    /// promises to produce, inferring which is which from the object type.
    pub fn visit_inputs_and_outputs(
        &self,
        mut inputs: impl FnMut(&Artifact),
        mut outputs: impl FnMut(&OutputArtifact),
    ) {
        for arg in &self.args {
            match &arg.object {
                CommandLineArg::Artifact(artifact) => inputs(artifact),
                CommandLineArg::Output(output) => outputs(output),
                CommandLineArg::String(_) | CommandLineArg::SourcePath(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_string_is_applied_after_stringification() {
        let arg = ArgAndFormatString {
            object: CommandLineArg::String("x.pex".to_owned()),
            post_format: "--output={}".to_owned(),
        };
        assert_eq!("--output=x.pex", arg.apply("x.pex"));
    }

    #[test]
    fn env_iterates_sorted() {
        let args = CommandLineArgs::new()
            .add_env("ZZ", "1")
            .add_env("AA", "2");
        let env: Vec<_> = args.env().collect();
        assert_eq!(vec![("AA", "2"), ("ZZ", "1")], env);
    }
}
