/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The android dexing engine: the dx/d8 tool step, dex container suffix
//! classification, dex-jar analysis, overflow diagnostics, and the smart
//! dexing planner that fans dexing out across outputs with per-output
//! input-hash caching.

pub mod dex_store;
pub mod dx;
pub mod jar_analysis;
pub mod overflow;
pub mod platform;
pub mod smart_dex;
