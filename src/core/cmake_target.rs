//! CMake-side identifiers generated for Bazel labels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::label::TargetId;

/// A CMake project name (the `project()` of a translated repository).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CMakePackage(String);

impl CMakePackage {
    pub fn new(name: impl Into<String>) -> Self {
        CMakePackage(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CMakePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A CMake target name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CMakeTarget(String);

impl CMakeTarget {
    pub fn new(name: impl Into<String>) -> Self {
        CMakeTarget(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CMakeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The CMake names generated for one Bazel label.
///
/// `target` is the real CMake target; `alias` is the namespaced name other
/// targets link against (`project::name`). Build-order and link references go
/// through [`CMakeTargetPair::dep`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CMakeTargetPair {
    pub cmake_package: CMakePackage,
    pub target: CMakeTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<CMakeTarget>,
}

impl CMakeTargetPair {
    pub fn new(cmake_package: CMakePackage, target: CMakeTarget) -> Self {
        CMakeTargetPair {
            cmake_package,
            target,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: CMakeTarget) -> Self {
        self.alias = Some(alias);
        self
    }

    /// The name dependents should reference.
    pub fn dep(&self) -> &CMakeTarget {
        self.alias.as_ref().unwrap_or(&self.target)
    }

    /// Derive the default names for `target_id` inside `cmake_package`.
    ///
    /// Package components and the target name are joined with `_`; a trailing
    /// target name equal to the last package component is not repeated.
    /// Characters CMake does not accept in target names become `_`.
    pub fn generate(target_id: &TargetId, cmake_package: &CMakePackage) -> Self {
        let mut parts: Vec<&str> = target_id
            .package_name
            .split('/')
            .filter(|p| !p.is_empty())
            .collect();
        if parts.last() != Some(&target_id.target_name.as_str()) {
            parts.push(&target_id.target_name);
        }
        let name: String = parts
            .join("_")
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        CMakeTargetPair::new(
            cmake_package.clone(),
            CMakeTarget::new(format!("{}_{}", cmake_package, name)),
        )
        .with_alias(CMakeTarget::new(format!("{}::{}", cmake_package, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_names() {
        let pkg = CMakePackage::new("absl");
        let t = TargetId::parse("@com_google_absl//absl/strings:cord").unwrap();
        let pair = CMakeTargetPair::generate(&t, &pkg);
        assert_eq!(pair.target.as_str(), "absl_absl_strings_cord");
        assert_eq!(pair.dep().as_str(), "absl::absl_strings_cord");
    }

    #[test]
    fn test_generate_collapses_repeated_name() {
        let pkg = CMakePackage::new("proj");
        let t = TargetId::parse("@repo//a/b:b").unwrap();
        let pair = CMakeTargetPair::generate(&t, &pkg);
        assert_eq!(pair.target.as_str(), "proj_a_b");
    }

    #[test]
    fn test_generate_sanitizes() {
        let pkg = CMakePackage::new("proj");
        let t = TargetId::parse("@repo//:gen+file").unwrap();
        let pair = CMakeTargetPair::generate(&t, &pkg);
        assert_eq!(pair.target.as_str(), "proj_gen_file");
    }

    #[test]
    fn test_dep_without_alias() {
        let pair = CMakeTargetPair::new(CMakePackage::new("p"), CMakeTarget::new("p_x"));
        assert_eq!(pair.dep().as_str(), "p_x");
    }
}
