//! Per-repository CMake configuration.
//!
//! Each known repository carries its source and binary directories, the
//! repo-mapping used when resolving `@name` references from inside it, and the
//! table of CMake names that were agreed on for its targets by earlier
//! invocations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::cmake_target::{CMakePackage, CMakeTargetPair};
use crate::core::label::{RepositoryId, TargetId};

/// A persisted name would change for a target that already has one.
#[derive(Debug, Error)]
#[error("canonical CMake name for `{target}` already persisted as `{existing}`, refusing `{requested}`")]
pub struct CanonicalNameConflict {
    pub target: String,
    pub existing: String,
    pub requested: String,
}

/// CMake configuration of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CMakeRepository {
    pub repository_id: RepositoryId,
    pub cmake_project_name: CMakePackage,
    pub source_directory: PathBuf,
    pub cmake_binary_dir: PathBuf,
    /// `@name` as written in this repository → actual repository.
    #[serde(default)]
    pub repo_mapping: BTreeMap<RepositoryId, RepositoryId>,
    #[serde(default, with = "canonical_names")]
    pub persisted_canonical_name: BTreeMap<TargetId, CMakeTargetPair>,
}

impl CMakeRepository {
    pub fn new(
        repository_id: RepositoryId,
        cmake_project_name: CMakePackage,
        source_directory: PathBuf,
        cmake_binary_dir: PathBuf,
    ) -> Self {
        CMakeRepository {
            repository_id,
            cmake_project_name,
            source_directory,
            cmake_binary_dir,
            repo_mapping: BTreeMap::new(),
            persisted_canonical_name: BTreeMap::new(),
        }
    }

    pub fn with_repo_mapping(mut self, repo_mapping: BTreeMap<RepositoryId, RepositoryId>) -> Self {
        self.repo_mapping = repo_mapping;
        self
    }

    /// Rewrite the repository of `target` through the repo mapping.
    pub fn apply_repo_mapping(&self, target: TargetId) -> TargetId {
        match self.repo_mapping.get(&target.repository_id) {
            Some(mapped) => TargetId {
                repository_id: mapped.clone(),
                ..target
            },
            None => target,
        }
    }

    /// Get the CMake names for a target in this repository.
    ///
    /// A persisted name always wins over a freshly derived one.
    pub fn get_cmake_target_pair(&self, target: &TargetId) -> CMakeTargetPair {
        debug_assert_eq!(target.repository_id, self.repository_id);
        if let Some(pair) = self.persisted_canonical_name.get(target) {
            return pair.clone();
        }
        CMakeTargetPair::generate(target, &self.cmake_project_name)
    }

    /// Record the canonical name for `target`.
    ///
    /// Re-recording the same name is a no-op; a different name is rejected.
    pub fn set_persisted_canonical_name(
        &mut self,
        target: TargetId,
        pair: CMakeTargetPair,
    ) -> Result<(), CanonicalNameConflict> {
        if let Some(existing) = self.persisted_canonical_name.get(&target) {
            if *existing != pair {
                return Err(CanonicalNameConflict {
                    target: target.as_label(),
                    existing: existing.target.to_string(),
                    requested: pair.target.to_string(),
                });
            }
            return Ok(());
        }
        self.persisted_canonical_name.insert(target, pair);
        Ok(())
    }

    /// Whether both directories match, compared as forward-slash paths.
    pub fn same_directories(&self, source_directory: &Path, cmake_binary_dir: &Path) -> bool {
        as_posix(&self.source_directory) == as_posix(source_directory)
            && as_posix(&self.cmake_binary_dir) == as_posix(cmake_binary_dir)
    }
}

/// Build a repo mapping from `(from, to)` pairs given on the command line.
///
/// Every repository maps its own name to itself.
pub fn make_repo_mapping(
    repository_id: &RepositoryId,
    pairs: &[(String, String)],
) -> BTreeMap<RepositoryId, RepositoryId> {
    let mut mapping = BTreeMap::new();
    mapping.insert(repository_id.clone(), repository_id.clone());
    for (from, to) in pairs {
        mapping.insert(RepositoryId::new(from), RepositoryId::new(to));
    }
    mapping
}

pub(crate) fn as_posix(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Serde adapter storing the canonical-name table as a list of entries, since
/// structured keys are not valid JSON object keys.
mod canonical_names {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::core::cmake_target::CMakeTargetPair;
    use crate::core::label::TargetId;

    #[derive(Serialize, Deserialize)]
    struct Entry {
        label: TargetId,
        #[serde(flatten)]
        pair: CMakeTargetPair,
    }

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<TargetId, CMakeTargetPair>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let entries: Vec<Entry> = map
            .iter()
            .map(|(label, pair)| Entry {
                label: label.clone(),
                pair: pair.clone(),
            })
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<TargetId, CMakeTargetPair>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.label, e.pair)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cmake_target::CMakeTarget;

    fn repo() -> CMakeRepository {
        CMakeRepository::new(
            RepositoryId::new("dep"),
            CMakePackage::new("Dep"),
            PathBuf::from("/src/dep"),
            PathBuf::from("/build/dep"),
        )
    }

    #[test]
    fn test_generated_name_until_persisted() {
        let mut r = repo();
        let t = TargetId::parse("@dep//lib:core").unwrap();
        assert_eq!(r.get_cmake_target_pair(&t).target.as_str(), "Dep_lib_core");

        let custom = CMakeTargetPair::new(CMakePackage::new("Dep"), CMakeTarget::new("Dep::core"));
        r.set_persisted_canonical_name(t.clone(), custom.clone()).unwrap();
        assert_eq!(r.get_cmake_target_pair(&t), custom);
    }

    #[test]
    fn test_persisted_name_is_stable() {
        let mut r = repo();
        let t = TargetId::parse("@dep//lib:core").unwrap();
        let first = r.get_cmake_target_pair(&t);
        r.set_persisted_canonical_name(t.clone(), first.clone()).unwrap();
        r.set_persisted_canonical_name(t.clone(), first).unwrap();

        let other = CMakeTargetPair::new(CMakePackage::new("Dep"), CMakeTarget::new("renamed"));
        assert!(r.set_persisted_canonical_name(t, other).is_err());
    }

    #[test]
    fn test_repo_mapping() {
        let id = RepositoryId::new("dep");
        let mapping = make_repo_mapping(&id, &[("absl".into(), "com_google_absl".into())]);
        let r = repo().with_repo_mapping(mapping);

        let t = TargetId::parse("@absl//absl/base:core").unwrap();
        assert_eq!(
            r.apply_repo_mapping(t).as_label(),
            "@com_google_absl//absl/base:core"
        );
        let t = TargetId::parse("@other//x:y").unwrap();
        assert_eq!(r.apply_repo_mapping(t).as_label(), "@other//x:y");
    }

    #[test]
    fn test_same_directories() {
        let r = repo();
        assert!(r.same_directories(Path::new("/src/dep"), Path::new("/build/dep")));
        assert!(!r.same_directories(Path::new("/src/other"), Path::new("/build/dep")));
    }
}
