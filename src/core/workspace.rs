//! Workspace - state shared by every repository of one translation.
//!
//! The root invocation builds the Workspace from its command line and saves
//! it as a snapshot; dependency invocations restore it from that snapshot so
//! they see the same repositories, configuration values and agreed-upon
//! CMake names.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::cmake_target::CMakePackage;
use crate::core::label::{RepositoryId, TargetId};
use crate::core::provider::TargetInfo;
use crate::core::repository::{as_posix, CMakeRepository};
use crate::core::snapshot::SnapshotError;

/// Key under which `--define` values are recorded.
pub const DEFINE_KEY: &str = "define";

/// Key under which platform constraint labels are recorded.
pub const CONSTRAINT_KEY: &str = "constraint";

/// Key under which the compilation mode is recorded.
pub const COMPILATION_MODE_KEY: &str = "compilation_mode";

/// Process-wide translation state spanning all repositories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub(crate) root_repository_id: RepositoryId,
    pub(crate) all_repositories: BTreeMap<RepositoryId, CMakeRepository>,
    /// Configuration values such as `("define", "NAME=VALUE")`.
    pub(crate) values: BTreeSet<(String, String)>,
    pub(crate) cmake_vars: BTreeMap<String, String>,
    pub(crate) global_ignored_libraries: BTreeSet<TargetId>,
    pub(crate) modules: Vec<String>,
    pub(crate) persistent_target_info: BTreeMap<TargetId, TargetInfo>,
    pub(crate) verbose: u8,
}

impl Workspace {
    /// Create the workspace for a root invocation.
    pub fn new(root_repository_id: RepositoryId, cmake_vars: BTreeMap<String, String>) -> Self {
        Workspace {
            root_repository_id,
            all_repositories: BTreeMap::new(),
            values: BTreeSet::new(),
            cmake_vars,
            global_ignored_libraries: BTreeSet::new(),
            modules: Vec::new(),
            persistent_target_info: BTreeMap::new(),
            verbose: 0,
        }
    }

    pub fn root_repository_id(&self) -> &RepositoryId {
        &self.root_repository_id
    }

    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: u8) {
        self.verbose = verbose;
    }

    pub fn add_cmake_repository(&mut self, repository: CMakeRepository) {
        tracing::debug!(
            "adding repository {} ({})",
            repository.repository_id,
            repository.cmake_project_name
        );
        self.all_repositories
            .insert(repository.repository_id.clone(), repository);
    }

    pub fn repository(&self, id: &RepositoryId) -> Option<&CMakeRepository> {
        self.all_repositories.get(id)
    }

    pub fn repository_mut(&mut self, id: &RepositoryId) -> Option<&mut CMakeRepository> {
        self.all_repositories.get_mut(id)
    }

    pub fn repositories(&self) -> impl Iterator<Item = &CMakeRepository> {
        self.all_repositories.values()
    }

    pub fn cmake_var(&self, name: &str) -> Option<&str> {
        self.cmake_vars.get(name).map(String::as_str)
    }

    pub fn add_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert((key.into(), value.into()));
    }

    pub fn has_value(&self, key: &str, value: &str) -> bool {
        self.values
            .iter()
            .any(|(k, v)| k.as_str() == key && v.as_str() == value)
    }

    /// Record a `--define NAME=VALUE`.
    pub fn add_define(&mut self, define: impl Into<String>) {
        self.add_value(DEFINE_KEY, define);
    }

    /// Look up the value of `--define NAME=...`.
    pub fn define_value(&self, name: &str) -> Option<&str> {
        self.values.iter().find_map(|(k, v)| {
            if k != DEFINE_KEY {
                return None;
            }
            let (n, value) = v.split_once('=')?;
            (n == name).then_some(value)
        })
    }

    /// Derive platform constraints and the compilation mode from cmake vars.
    pub fn add_platform_constraints(&mut self) {
        if let Some(os) = self.cmake_var("CMAKE_SYSTEM_NAME").and_then(os_constraint) {
            self.add_value(CONSTRAINT_KEY, format!("@platforms//os:{}", os));
        }
        if let Some(cpu) = self
            .cmake_var("CMAKE_SYSTEM_PROCESSOR")
            .and_then(cpu_constraint)
        {
            self.add_value(CONSTRAINT_KEY, format!("@platforms//cpu:{}", cpu));
        }
        let mode = match self.cmake_var("CMAKE_BUILD_TYPE") {
            Some("Release") | Some("MinSizeRel") | Some("RelWithDebInfo") => "opt",
            Some("Debug") => "dbg",
            _ => "fastbuild",
        };
        self.add_value(COMPILATION_MODE_KEY, mode);
    }

    /// Whether a platform constraint label holds for this configuration.
    pub fn has_constraint(&self, constraint: &TargetId) -> bool {
        self.has_value(CONSTRAINT_KEY, &constraint.as_label())
    }

    /// Read `--define` options from a bazelrc file.
    ///
    /// Only `build --define=K=V` / `build --define K=V` lines are honored.
    pub fn load_bazelrc(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bazelrc: {}", path.display()))?;
        for define in parse_bazelrc_defines(&contents) {
            tracing::debug!("bazelrc define {}", define);
            self.add_define(define);
        }
        Ok(())
    }

    pub fn add_module(&mut self, module: impl Into<String>) {
        let module = module.into();
        if !self.modules.contains(&module) {
            self.modules.push(module);
        }
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn ignore_library(&mut self, target: TargetId) {
        self.global_ignored_libraries.insert(target);
    }

    pub fn is_ignored_library(&self, target: &TargetId) -> bool {
        self.global_ignored_libraries.contains(target)
    }

    pub fn set_persistent_target_info(&mut self, target: TargetId, info: TargetInfo) {
        self.persistent_target_info.insert(target, info);
    }

    pub fn persistent_target_info(&self, target: &TargetId) -> Option<&TargetInfo> {
        self.persistent_target_info.get(target)
    }

    /// Check that the snapshot's entry for `repository_id` matches the
    /// current command line.
    pub fn verify_repository(
        &self,
        repository_id: &RepositoryId,
        cmake_project_name: &CMakePackage,
        source_directory: &Path,
        cmake_binary_dir: &Path,
    ) -> Result<(), SnapshotError> {
        let loaded = self
            .repository(repository_id)
            .ok_or_else(|| SnapshotError::UnknownRepository(repository_id.to_string()))?;

        if loaded.cmake_project_name != *cmake_project_name
            || !loaded.same_directories(source_directory, cmake_binary_dir)
        {
            let report = format!(
                "workspace.cmake_project_name: {}\n   vs command-line: {}\n\
                 workspace.source_directory: {}\n   vs command-line: {}\n\
                 workspace.cmake_binary_dir: {}\n   vs command-line: {}",
                loaded.cmake_project_name,
                cmake_project_name,
                as_posix(&loaded.source_directory),
                as_posix(source_directory),
                as_posix(&loaded.cmake_binary_dir),
                as_posix(cmake_binary_dir),
            );
            return Err(SnapshotError::Mismatch {
                repository: repository_id.to_string(),
                report,
            });
        }
        Ok(())
    }
}

fn os_constraint(system_name: &str) -> Option<&'static str> {
    match system_name {
        "Linux" => Some("linux"),
        "Darwin" => Some("macos"),
        "Windows" => Some("windows"),
        "FreeBSD" => Some("freebsd"),
        "OpenBSD" => Some("openbsd"),
        "Android" => Some("android"),
        "iOS" => Some("ios"),
        "Emscripten" => Some("emscripten"),
        _ => None,
    }
}

fn cpu_constraint(processor: &str) -> Option<&'static str> {
    match processor.to_ascii_lowercase().as_str() {
        "x86_64" | "amd64" => Some("x86_64"),
        "aarch64" | "arm64" => Some("aarch64"),
        "i386" | "i686" | "x86" => Some("x86_32"),
        "ppc64le" | "ppc64" => Some("ppc"),
        "s390x" => Some("s390x"),
        p if p.starts_with("armv7") => Some("armv7"),
        _ => None,
    }
}

fn parse_bazelrc_defines(contents: &str) -> Vec<String> {
    let mut defines = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        if words.next() != Some("build") {
            continue;
        }
        while let Some(word) = words.next() {
            if let Some(define) = word.strip_prefix("--define=") {
                defines.push(define.to_string());
            } else if word == "--define" {
                if let Some(define) = words.next() {
                    defines.push(define.to_string());
                }
            }
        }
    }
    defines
}
