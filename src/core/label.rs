//! Label identification - WHERE a declaration lives (repository + package + name).
//!
//! Labels are parsed relative to a package context and always format to the
//! fully qualified `@repo//package:name` form, which re-parses to the same id.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Target name selecting every target in a package.
pub const ALL_TARGETS: &str = "all";

/// Target name selecting every target in a package and its subpackages.
pub const RECURSIVE_TARGETS: &str = "...";

/// Error produced when a label string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("empty label")]
    Empty,

    #[error("invalid repository name in label `{label}`")]
    InvalidRepository { label: String },

    #[error("invalid package name in label `{label}`")]
    InvalidPackage { label: String },

    #[error("invalid target name in label `{label}`")]
    InvalidTarget { label: String },

    #[error("label `{0}` must be fully qualified (`@repo//package:name`)")]
    NotAbsolute(String),
}

/// A named source of build declarations (root project or external dependency).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Create a repository id. A leading `@` or `@@` is stripped.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        let name = name
            .strip_prefix("@@")
            .or_else(|| name.strip_prefix('@'))
            .unwrap_or(name);
        RepositoryId(name.to_string())
    }

    /// Get the repository name (without `@`).
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Get the id of a package within this repository.
    pub fn get_package_id(&self, package_name: impl Into<String>) -> PackageId {
        PackageId {
            repository_id: self.clone(),
            package_name: package_name.into(),
        }
    }

    /// Parse a label relative to the root package of this repository.
    pub fn parse_target(&self, label: &str) -> Result<TargetId, LabelError> {
        self.get_package_id("").parse_target(label)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A directory scope within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub repository_id: RepositoryId,
    pub package_name: String,
}

impl PackageId {
    /// Get the id of a target declared in this package.
    pub fn get_target_id(&self, target_name: impl Into<String>) -> TargetId {
        TargetId {
            repository_id: self.repository_id.clone(),
            package_name: self.package_name.clone(),
            target_name: target_name.into(),
        }
    }

    /// Parse a label relative to this package.
    ///
    /// Accepts `@repo//pkg:name`, `@repo//pkg`, `@repo`, `//pkg:name`, `//pkg`,
    /// `:name` and bare `name`.
    pub fn parse_target(&self, label: &str) -> Result<TargetId, LabelError> {
        if label.is_empty() {
            return Err(LabelError::Empty);
        }

        let (repository_id, rest) = if let Some(stripped) = label.strip_prefix('@') {
            let stripped = stripped.strip_prefix('@').unwrap_or(stripped);
            let (repo, rest) = match stripped.find("//") {
                Some(i) => (&stripped[..i], &stripped[i..]),
                None => (stripped, ""),
            };
            if !is_valid_repository_name(repo) {
                return Err(LabelError::InvalidRepository {
                    label: label.to_string(),
                });
            }
            if rest.is_empty() {
                // `@repo` is shorthand for `@repo//:repo`.
                let repository_id = RepositoryId(repo.to_string());
                return Ok(repository_id.get_package_id("").get_target_id(repo));
            }
            (RepositoryId(repo.to_string()), rest)
        } else {
            (self.repository_id.clone(), label)
        };

        if let Some(absolute) = rest.strip_prefix("//") {
            let (package_name, target_name) = split_package_and_target(absolute, label)?;
            return Ok(TargetId {
                repository_id,
                package_name,
                target_name,
            });
        }

        let target_name = rest.strip_prefix(':').unwrap_or(rest);
        if !is_valid_target_name(target_name) {
            return Err(LabelError::InvalidTarget {
                label: label.to_string(),
            });
        }
        Ok(self.get_target_id(target_name))
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}//{}", self.repository_id, self.package_name)
    }
}

/// A uniquely addressable build declaration.
///
/// Ordering is by (repository, package, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId {
    pub repository_id: RepositoryId,
    pub package_name: String,
    pub target_name: String,
}

impl TargetId {
    /// Parse a fully qualified label (`@repo//package:name`).
    pub fn parse(label: &str) -> Result<Self, LabelError> {
        if !label.starts_with('@') {
            return Err(LabelError::NotAbsolute(label.to_string()));
        }
        // The context package is irrelevant for absolute labels.
        RepositoryId::new("").get_package_id("").parse_target(label)
    }

    /// Get the package containing this target.
    pub fn package_id(&self) -> PackageId {
        self.repository_id.get_package_id(self.package_name.clone())
    }

    /// Get the id of a sibling target in the same package.
    pub fn get_target_id(&self, target_name: impl Into<String>) -> TargetId {
        self.package_id().get_target_id(target_name)
    }

    /// Parse a label relative to this target's package.
    pub fn parse_target(&self, label: &str) -> Result<TargetId, LabelError> {
        self.package_id().parse_target(label)
    }

    /// Format as a fully qualified label.
    pub fn as_label(&self) -> String {
        self.to_string()
    }

    /// Whether this names `:all` or `/...`.
    pub fn is_special(&self) -> bool {
        self.target_name == ALL_TARGETS || self.target_name == RECURSIVE_TARGETS
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}//{}:{}",
            self.repository_id, self.package_name, self.target_name
        )
    }
}

impl Serialize for TargetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_label())
    }
}

impl<'de> Deserialize<'de> for TargetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        TargetId::parse(&label).map_err(serde::de::Error::custom)
    }
}

/// Expand the special target names `all` and `...` against `available`.
///
/// `all` selects candidates in the same package; `...` selects candidates in
/// the same package or any package below it. Any other target is returned as-is.
/// An empty result is not an error.
pub fn expand_special_targets<'a>(
    target: &TargetId,
    available: impl IntoIterator<Item = &'a TargetId>,
) -> Vec<TargetId> {
    match target.target_name.as_str() {
        ALL_TARGETS => available
            .into_iter()
            .filter(|u| u.repository_id == target.repository_id)
            .filter(|u| u.package_name == target.package_name)
            .cloned()
            .collect(),
        RECURSIVE_TARGETS => available
            .into_iter()
            .filter(|u| u.repository_id == target.repository_id)
            .filter(|u| is_package_prefix(&target.package_name, &u.package_name))
            .cloned()
            .collect(),
        _ => vec![target.clone()],
    }
}

/// Whether `package` equals `prefix` or lies beneath it.
fn is_package_prefix(prefix: &str, package: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    package == prefix
        || package
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn split_package_and_target(absolute: &str, label: &str) -> Result<(String, String), LabelError> {
    let (package, target) = match absolute.split_once(':') {
        Some((package, target)) => (package, target.to_string()),
        None => {
            if absolute == RECURSIVE_TARGETS {
                ("", RECURSIVE_TARGETS.to_string())
            } else if let Some(package) = absolute.strip_suffix("/...") {
                (package, RECURSIVE_TARGETS.to_string())
            } else {
                // Implicit name: the last package component.
                let name = absolute.rsplit('/').next().unwrap_or(absolute);
                (absolute, name.to_string())
            }
        }
    };

    if !is_valid_package_name(package) {
        return Err(LabelError::InvalidPackage {
            label: label.to_string(),
        });
    }
    if !is_valid_target_name(&target) {
        return Err(LabelError::InvalidTarget {
            label: label.to_string(),
        });
    }
    Ok((package.to_string(), target))
}

fn is_valid_repository_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '~' | '+'))
}

fn is_valid_package_name(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    !name.starts_with('/')
        && !name.ends_with('/')
        && !name.contains("//")
        && !name.contains(':')
}

fn is_valid_target_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(':') && !name.starts_with('/') && !name.contains("//")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(repo: &str, package: &str) -> PackageId {
        RepositoryId::new(repo).get_package_id(package)
    }

    #[test]
    fn test_fully_qualified_round_trip() {
        for label in [
            "@repo//pkg:name",
            "@repo//a/b/c:lib.a",
            "@com_google_absl//absl/strings:strings",
            "@repo//:root",
        ] {
            let target = pkg("other", "x").parse_target(label).unwrap();
            assert_eq!(target.as_label(), label);
            assert_eq!(TargetId::parse(label).unwrap(), target);
        }
    }

    #[test]
    fn test_relative_forms_normalize() {
        let context = pkg("repo", "a/b");

        let t = context.parse_target(":x").unwrap();
        assert_eq!(t.as_label(), "@repo//a/b:x");

        let t = context.parse_target("x.txt").unwrap();
        assert_eq!(t.as_label(), "@repo//a/b:x.txt");

        let t = context.parse_target("//c/d").unwrap();
        assert_eq!(t.as_label(), "@repo//c/d:d");

        let t = context.parse_target("@dep").unwrap();
        assert_eq!(t.as_label(), "@dep//:dep");

        // The normalized form re-parses to an identical id.
        assert_eq!(TargetId::parse(&t.as_label()).unwrap(), t);
    }

    #[test]
    fn test_canonical_repository_prefix() {
        let t = pkg("repo", "").parse_target("@@dep//x:y").unwrap();
        assert_eq!(t.repository_id, RepositoryId::new("dep"));
        assert_eq!(t.as_label(), "@dep//x:y");
    }

    #[test]
    fn test_recursive_pattern_parsing() {
        let context = pkg("repo", "");
        let t = context.parse_target("//a/...").unwrap();
        assert_eq!(t.package_name, "a");
        assert_eq!(t.target_name, RECURSIVE_TARGETS);
        assert!(t.is_special());

        let t = context.parse_target("//...").unwrap();
        assert_eq!(t.package_name, "");
        assert_eq!(t.target_name, RECURSIVE_TARGETS);
    }

    #[test]
    fn test_invalid_labels() {
        let context = pkg("repo", "");
        assert_eq!(context.parse_target(""), Err(LabelError::Empty));
        assert!(matches!(
            context.parse_target("//a/:x"),
            Err(LabelError::InvalidPackage { .. })
        ));
        assert!(matches!(
            context.parse_target("//a:"),
            Err(LabelError::InvalidTarget { .. })
        ));
        assert!(matches!(
            context.parse_target("@//a:b"),
            Err(LabelError::InvalidRepository { .. })
        ));
        assert!(matches!(
            TargetId::parse("//a:b"),
            Err(LabelError::NotAbsolute(_))
        ));
    }

    #[test]
    fn test_expand_special_targets() {
        let context = pkg("repo", "");
        let candidates: Vec<TargetId> = ["//a:x", "//a:y", "//a/b:z", "//ab:w"]
            .iter()
            .map(|l| context.parse_target(l).unwrap())
            .collect();

        let all = expand_special_targets(&context.parse_target("//a:all").unwrap(), &candidates);
        assert_eq!(all, vec![candidates[0].clone(), candidates[1].clone()]);

        let recursive =
            expand_special_targets(&context.parse_target("//a/...").unwrap(), &candidates);
        assert_eq!(
            recursive,
            vec![
                candidates[0].clone(),
                candidates[1].clone(),
                candidates[2].clone()
            ]
        );

        let everything = expand_special_targets(&context.parse_target("//...").unwrap(), &candidates);
        assert_eq!(everything.len(), 4);

        let plain = context.parse_target("//q:r").unwrap();
        assert_eq!(expand_special_targets(&plain, &candidates), vec![plain.clone()]);

        let empty = expand_special_targets(&context.parse_target("//none:all").unwrap(), &candidates);
        assert!(empty.is_empty());
    }
}
