/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The action cache seam: a key-value store from rule key to the artifact
//! set a successful build of that rule produced. The store itself is an
//! external collaborator; the core only fetches and stores. Fetch errors are
//! indistinguishable from misses by design, so a flaky cache can never fail
//! a build.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use gazebo::prelude::*;
use indexmap::IndexMap;
use tracing::debug;

use anvil_core::fs::project::ProjectRelativePathBuf;

use crate::rule_key::RuleKey;

/// One cached output: its bytes, or the symlink it was.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CachedEntry {
    Bytes(Vec<u8>),
    Symlink(PathBuf),
}

/// The outputs of one successful rule build, by project-relative path.
/// Restoring these constitutes a successful build of the rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CachedArtifacts(pub IndexMap<ProjectRelativePathBuf, CachedEntry>);

#[async_trait]
pub trait ActionCache: Send + Sync {
    async fn fetch(&self, key: &RuleKey) -> anyhow::Result<Option<CachedArtifacts>>;

    /// Idempotent; last writer wins per key.
    async fn store(&self, key: &RuleKey, artifacts: CachedArtifacts) -> anyhow::Result<()>;
}

/// Fetches from the cache, demoting errors to misses.
pub async fn fetch_ignoring_errors(
    cache: &dyn ActionCache,
    key: &RuleKey,
) -> Option<CachedArtifacts> {
    match cache.fetch(key).await {
        Ok(result) => result,
        Err(e) => {
            debug!("cache fetch for {} failed, treating as miss: {:#}", key, e);
            None
        }
    }
}

/// A cache that never hits and never stores.
#[derive(Debug, Default)]
pub struct NoopActionCache;

#[async_trait]
impl ActionCache for NoopActionCache {
    async fn fetch(&self, _key: &RuleKey) -> anyhow::Result<Option<CachedArtifacts>> {
        Ok(None)
    }

    async fn store(&self, _key: &RuleKey, _artifacts: CachedArtifacts) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An in-memory cache, for tests and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryActionCache {
    entries: Mutex<HashMap<RuleKey, CachedArtifacts>>,
}

#[async_trait]
impl ActionCache for InMemoryActionCache {
    async fn fetch(&self, key: &RuleKey) -> anyhow::Result<Option<CachedArtifacts>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn store(&self, key: &RuleKey, artifacts: CachedArtifacts) -> anyhow::Result<()> {
        self.entries.lock().unwrap().insert(key.dupe(), artifacts);
        Ok(())
    }
}
