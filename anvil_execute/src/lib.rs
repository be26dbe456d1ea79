/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Step execution for anvil: the 'Step' trait and its results, the concrete
//! filesystem/compression/archive steps, the process executor that external
//! tools launch through, and the step runner that wraps execution with
//! logging and failure attribution.

pub mod context;
pub mod process;
pub mod runner;
pub mod step;
