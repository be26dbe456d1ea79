/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use indexmap::IndexMap;
use thiserror::Error;

use anvil_core::fs::paths::ForwardRelativePath;
use anvil_core::fs::paths::ForwardRelativePathBuf;
use anvil_core::source_path::SourcePath;
use anvil_core::target::BuildTarget;

#[derive(Error, Debug)]
enum PythonUtilError {
    #[error("`{target}`: `{attr}` declares `{path}` twice")]
    DuplicateModulePath {
        target: BuildTarget,
        attr: &'static str,
        path: ForwardRelativePathBuf,
    },
    #[error("`{target}`: `{path}` is not a python module (expected a `.py` file)")]
    NotAModule {
        target: BuildTarget,
        path: ForwardRelativePathBuf,
    },
}

/// The module namespace a target's sources land under: the explicit
/// `base_module` (dotted form) if given, otherwise the target's package
/// path.
pub fn base_path(target: &BuildTarget, base_module: Option<&str>) -> ForwardRelativePathBuf {
    match base_module {
        Some(module) if module.is_empty() => ForwardRelativePathBuf::unchecked_new(String::new()),
        Some(module) => ForwardRelativePathBuf::unchecked_new(module.replace('.', "/")),
        None => target.pkg().cell_relative_path().to_buf(),
    }
}

/// Rebases a `srcs`-style map of destination path to source under `base`,
/// rejecting colliding destinations.
pub fn to_module_map(
    target: &BuildTarget,
    attr: &'static str,
    base: &ForwardRelativePath,
    entries: &IndexMap<ForwardRelativePathBuf, SourcePath>,
) -> anyhow::Result<IndexMap<ForwardRelativePathBuf, SourcePath>> {
    let mut modules = IndexMap::with_capacity(entries.len());
    for (path, source) in entries {
        let dest = base.join(path);
        if modules.insert(dest.clone(), source.clone()).is_some() {
            return Err(PythonUtilError::DuplicateModulePath {
                target: target.clone(),
                attr,
                path: dest,
            }
            .into());
        }
    }
    Ok(modules)
}

/// Converts a module path to the dotted name used to import it:
/// `pkg/foo/bar.py` becomes `pkg.foo.bar`.
pub fn to_module_name(target: &BuildTarget, path: &ForwardRelativePath) -> anyhow::Result<String> {
    let stripped = path.as_str().strip_suffix(".py").ok_or_else(|| {
        PythonUtilError::NotAModule {
            target: target.clone(),
            path: path.to_buf(),
        }
    })?;
    Ok(stripped.replace('/', "."))
}

#[cfg(test)]
mod tests {
    use anvil_core::target::testing::BuildTargetExt;

    use super::*;

    #[test]
    fn base_path_defaults_to_package() {
        let target = BuildTarget::testing_parse("cell//foo/bar:t");
        assert_eq!("foo/bar", base_path(&target, None).as_str());
        assert_eq!("my/mod", base_path(&target, Some("my.mod")).as_str());
        assert_eq!("", base_path(&target, Some("")).as_str());
    }

    #[test]
    fn module_names() -> anyhow::Result<()> {
        let target = BuildTarget::testing_parse("cell//foo:t");
        assert_eq!(
            "foo.tests.test_thing",
            to_module_name(&target, ForwardRelativePath::new("foo/tests/test_thing.py")?)?
        );
        assert!(to_module_name(&target, ForwardRelativePath::new("foo/data.txt")?).is_err());
        Ok(())
    }

    #[test]
    fn module_map_is_rebased() -> anyhow::Result<()> {
        let target = BuildTarget::testing_parse("cell//foo:t");
        let entries = IndexMap::from([(
            ForwardRelativePathBuf::unchecked_new("test_a.py".into()),
            SourcePath::parse("cell//foo/test_a.py")?,
        )]);
        let modules = to_module_map(
            &target,
            "srcs",
            ForwardRelativePath::new("foo")?,
            &entries,
        )?;
        assert!(modules.contains_key(&ForwardRelativePathBuf::unchecked_new("foo/test_a.py".into())));
        Ok(())
    }
}
