/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use gazebo::prelude::*;

use anvil_core::fs::project::ProjectFilesystem;

use crate::process::ProcessExecutor;

/// Everything a step needs to execute: the project filesystem it reads and
/// writes through, and the executor external tools launch through. Cheap to
/// clone; shared across all pipelines of a build.
#[derive(Clone, Dupe)]
pub struct StepExecutionContext {
    fs: ProjectFilesystem,
    processes: Arc<dyn ProcessExecutor>,
}

impl StepExecutionContext {
    pub fn new(fs: ProjectFilesystem, processes: Arc<dyn ProcessExecutor>) -> Self {
        StepExecutionContext { fs, processes }
    }

    pub fn fs(&self) -> &ProjectFilesystem {
        &self.fs
    }

    pub fn processes(&self) -> &dyn ProcessExecutor {
        &*self.processes
    }
}

pub mod testing {
    use std::sync::Arc;

    use anvil_core::fs::project::ProjectFilesystem;
    use anvil_core::fs::project::ProjectRoot;

    use crate::context::StepExecutionContext;
    use crate::process::ProcessExecutor;
    use crate::process::testing::FakeProcessExecutor;

    /// A context rooted at a fresh tempdir with a succeeding fake executor.
    pub fn testing_context() -> (tempfile::TempDir, StepExecutionContext) {
        testing_context_with(Arc::new(FakeProcessExecutor::succeeding()))
    }

    pub fn testing_context_with(
        processes: Arc<dyn ProcessExecutor>,
    ) -> (tempfile::TempDir, StepExecutionContext) {
        let tempdir = tempfile::tempdir().unwrap();
        let fs =
            ProjectFilesystem::new(ProjectRoot::new(tempdir.path().to_path_buf()).unwrap());
        (tempdir, StepExecutionContext::new(fs, processes))
    }
}
