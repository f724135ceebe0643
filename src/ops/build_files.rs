//! Discovery of the BUILD files that make up a repository.
//!
//! Package patterns are globs over package directories (`*` stays within one
//! directory, `**` spans any number). Each pattern selects the `BUILD` and
//! `BUILD.bazel` files of the matching packages.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};

use crate::util::fs::{glob_files, relative_path, to_posix};

/// Names a package's build file may have.
pub const BUILD_FILE_NAMES: &[&str] = &["BUILD", "BUILD.bazel"];

/// Package pattern used when none is given.
pub const DEFAULT_INCLUDE_PACKAGE: &str = "**";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn build_file_patterns(package_patterns: &[String]) -> Vec<String> {
    let mut patterns = Vec::with_capacity(package_patterns.len() * BUILD_FILE_NAMES.len());
    for package in package_patterns {
        for name in BUILD_FILE_NAMES {
            if package.is_empty() {
                patterns.push(name.to_string());
            } else {
                patterns.push(format!("{}/{}", package.trim_end_matches('/'), name));
            }
        }
    }
    patterns
}

/// Find the build files under `root_dir` in packages matching `include` but
/// not `exclude`.
///
/// Returns absolute paths in sorted order. An empty `include` means every
/// package.
pub fn find_build_files(
    root_dir: &Path,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<PathBuf>> {
    let default_include = [DEFAULT_INCLUDE_PACKAGE.to_string()];
    let include = if include.is_empty() {
        &default_include[..]
    } else {
        include
    };

    let excludes = build_file_patterns(exclude)
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("invalid package pattern: {}", p)))
        .collect::<Result<Vec<_>>>()?;

    let mut build_files = glob_files(root_dir, &build_file_patterns(include))?;
    build_files.retain(|path| {
        let relative = to_posix(&relative_path(root_dir, path));
        let excluded = excludes
            .iter()
            .any(|p| p.matches_with(&relative, MATCH_OPTIONS));
        if excluded {
            tracing::debug!("excluding {}", relative);
        }
        !excluded
    });
    Ok(build_files)
}
