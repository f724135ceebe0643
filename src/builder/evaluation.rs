//! Evaluation state - loaded declarations and memoized analysis.
//!
//! BUILD files are loaded into a table of [`RuleDecl`]s. Analysis is demand
//! driven: asking for a target's [`TargetInfo`] analyzes it (and, through its
//! handler, its dependencies) exactly once. Failures are recorded per target
//! and never abort unrelated analyses.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};

use crate::builder::context::AnalysisContext;
use crate::builder::error::{AnalysisError, TargetError};
use crate::builder::interpreter;
use crate::builder::output::CMakeBuilder;
use crate::builder::rules::registry::RuleRegistry;
use crate::core::cmake_target::{CMakePackage, CMakeTargetPair};
use crate::core::label::{PackageId, RepositoryId, TargetId};
use crate::core::provider::{Provider, TargetInfo};
use crate::core::repository::CMakeRepository;
use crate::core::workspace::Workspace;
use crate::starlark::{parse_build_file, SymbolRef, Value};
use crate::util::fs::{read_to_string, relative_path, to_posix};

/// A target declared by a BUILD file, with its unevaluated attributes.
#[derive(Debug, Clone)]
pub struct RuleDecl {
    pub target: TargetId,
    pub symbol: SymbolRef,
    pub attrs: BTreeMap<String, Value>,
    pub build_file: PathBuf,
}

#[derive(Debug, Clone)]
enum Analyzed {
    InProgress,
    Done(TargetInfo),
    Failed,
}

/// State of one translation invocation for one repository.
pub struct EvaluationState {
    workspace: Workspace,
    repository_id: RepositoryId,
    active: CMakeRepository,
    bindings: BTreeMap<TargetId, TargetId>,
    registry: Rc<RuleRegistry>,
    loaded_files: BTreeSet<PathBuf>,
    rules: BTreeMap<TargetId, RuleDecl>,
    targets_to_analyze: Vec<TargetId>,
    analyzed: BTreeMap<TargetId, Analyzed>,
    in_progress: Vec<TargetId>,
    errors: Vec<TargetError>,
    builder: CMakeBuilder,
    required_dep_targets: BTreeMap<TargetId, CMakeTargetPair>,
}

impl EvaluationState {
    /// Create the state for translating `repository_id`, which must already
    /// be part of `workspace`.
    pub fn new(
        workspace: Workspace,
        repository_id: RepositoryId,
        registry: RuleRegistry,
    ) -> Result<Self> {
        let active = workspace
            .repository(&repository_id)
            .cloned()
            .ok_or_else(|| anyhow!("repository {} is not part of the workspace", repository_id))?;
        Ok(EvaluationState {
            workspace,
            repository_id,
            active,
            bindings: BTreeMap::new(),
            registry: Rc::new(registry),
            loaded_files: BTreeSet::new(),
            rules: BTreeMap::new(),
            targets_to_analyze: Vec::new(),
            analyzed: BTreeMap::new(),
            in_progress: Vec::new(),
            errors: Vec::new(),
            builder: CMakeBuilder::new(),
            required_dep_targets: BTreeMap::new(),
        })
    }

    /// Redirect references to `name` to `actual`.
    pub fn with_bindings(mut self, bindings: BTreeMap<TargetId, TargetId>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn repository_id(&self) -> &RepositoryId {
        &self.repository_id
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn into_workspace(self) -> Workspace {
        self.workspace
    }

    pub(crate) fn registry(&self) -> Rc<RuleRegistry> {
        Rc::clone(&self.registry)
    }

    pub fn source_directory(&self) -> &Path {
        &self.active.source_directory
    }

    /// CMake binary directory of a repository; unknown repositories fall
    /// back to the active one.
    pub fn binary_directory(&self, repository_id: &RepositoryId) -> PathBuf {
        self.workspace
            .repository(repository_id)
            .map(|r| r.cmake_binary_dir.clone())
            .unwrap_or_else(|| self.active.cmake_binary_dir.clone())
    }

    pub fn errors(&self) -> &[TargetError] {
        &self.errors
    }

    /// Remove and return the recorded errors.
    pub fn take_errors(&mut self) -> Vec<TargetError> {
        std::mem::take(&mut self.errors)
    }

    pub fn builder(&self) -> &CMakeBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut CMakeBuilder {
        &mut self.builder
    }

    pub fn loaded_files(&self) -> &BTreeSet<PathBuf> {
        &self.loaded_files
    }

    /// Targets declared by loaded BUILD files, in declaration order.
    pub fn targets_to_analyze(&self) -> &[TargetId] {
        &self.targets_to_analyze
    }

    pub(crate) fn record_error(&mut self, target: TargetId, error: AnalysisError) {
        tracing::debug!("{}: {:#}", target, error);
        self.errors.push(TargetError::new(target, error));
    }

    /// Resolve `label` as written in `package`: parse, then apply the active
    /// repository's repo mapping, then `--bind` bindings.
    pub fn resolve_target(&self, package: &PackageId, label: &str) -> Result<TargetId, AnalysisError> {
        let target = self.active.apply_repo_mapping(package.parse_target(label)?);
        Ok(self.bindings.get(&target).cloned().unwrap_or(target))
    }

    /// Load a BUILD file from disk. A file is loaded at most once.
    pub fn process_build_file(&mut self, path: &Path) -> Result<()> {
        if self.loaded_files.contains(path) {
            return Ok(());
        }
        let contents = read_to_string(path)
            .with_context(|| format!("failed to load build file {}", path.display()))?;
        self.process_build_file_contents(path, &contents)
    }

    /// Load BUILD file text as if it were read from `path`.
    ///
    /// The package is derived from the file's directory relative to the
    /// repository source directory. Syntax errors are recorded against the
    /// file's pseudo-target.
    pub fn process_build_file_contents(&mut self, path: &Path, contents: &str) -> Result<()> {
        if !self.loaded_files.insert(path.to_path_buf()) {
            return Ok(());
        }
        let package_id = self.package_for_build_file(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "BUILD".to_string());
        let pseudo_target = package_id.get_target_id(file_name);

        if self.workspace.verbose() > 0 {
            tracing::debug!("loading {} as {}", path.display(), package_id);
        }

        match parse_build_file(path, contents) {
            Ok(statements) => {
                interpreter::evaluate_build_file(self, &package_id, path, &pseudo_target, &statements);
            }
            Err(e) => {
                self.record_error(pseudo_target, AnalysisError::Other(anyhow::Error::new(e)));
            }
        }
        Ok(())
    }

    fn package_for_build_file(&self, path: &Path) -> Result<PackageId> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow!("build file {} has no directory", path.display()))?;
        let source_directory = self.source_directory();
        if !dir.starts_with(source_directory) {
            anyhow::bail!(
                "build file {} is outside of source directory {}",
                path.display(),
                source_directory.display()
            );
        }
        let package_name = to_posix(&relative_path(source_directory, dir));
        let package_name = if package_name == "." {
            String::new()
        } else {
            package_name
        };
        Ok(self.repository_id.get_package_id(package_name))
    }

    /// Record a declaration; declaring the same target twice is an error.
    pub(crate) fn add_rule(&mut self, rule: RuleDecl) -> Result<(), AnalysisError> {
        if self.rules.contains_key(&rule.target) {
            return Err(AnalysisError::invalid_attribute(
                "name",
                format!("target `{}` declared more than once", rule.target),
            ));
        }
        tracing::debug!("declared {} ({})", rule.target, rule.symbol);
        self.targets_to_analyze.push(rule.target.clone());
        self.rules.insert(rule.target.clone(), rule);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn rule(&self, target: &TargetId) -> Option<&RuleDecl> {
        self.rules.get(target)
    }

    /// Analyze every target in `targets`, recording failures.
    pub fn analyze(&mut self, targets: &[TargetId]) {
        for target in targets {
            match self.get_target_info(target) {
                Ok(_) | Err(AnalysisError::DependencyFailed { .. }) => {}
                Err(e) => self.record_error(target.clone(), e),
            }
        }
    }

    /// TargetInfo of `target`, which must be declared or persisted.
    pub fn get_target_info(&mut self, target: &TargetId) -> Result<TargetInfo, AnalysisError> {
        self.get_optional_target_info(target)?
            .ok_or_else(|| AnalysisError::UnresolvedDependency {
                target: target.clone(),
            })
    }

    /// TargetInfo of `target` if it can be known in this invocation.
    ///
    /// A declared target is analyzed on first request and cached. Reaching a
    /// target whose analysis is still in progress is a cycle.
    pub fn get_optional_target_info(
        &mut self,
        target: &TargetId,
    ) -> Result<Option<TargetInfo>, AnalysisError> {
        match self.analyzed.get(target) {
            Some(Analyzed::Done(info)) => return Ok(Some(info.clone())),
            Some(Analyzed::Failed) => {
                return Err(AnalysisError::DependencyFailed {
                    target: target.clone(),
                })
            }
            Some(Analyzed::InProgress) => {
                let start = self
                    .in_progress
                    .iter()
                    .position(|t| t == target)
                    .unwrap_or(0);
                let mut path: Vec<TargetId> = self.in_progress[start..].to_vec();
                path.push(target.clone());
                return Err(AnalysisError::Cycle { path });
            }
            None => {}
        }

        if self.rules.contains_key(target) {
            return self.run_analysis(target).map(Some);
        }
        if let Some(info) = self.workspace.persistent_target_info(target) {
            return Ok(Some(info.clone()));
        }
        Ok(self.source_file_info(target))
    }

    /// A first-party label that names an existing source file.
    fn source_file_info(&self, target: &TargetId) -> Option<TargetInfo> {
        if target.repository_id != self.repository_id {
            return None;
        }
        let mut path = self.source_directory().to_path_buf();
        if !target.package_name.is_empty() {
            path.push(&target.package_name);
        }
        path.push(&target.target_name);
        if !path.exists() {
            return None;
        }
        Some(TargetInfo::new([Provider::Files {
            paths: vec![to_posix(&path)],
        }]))
    }

    fn run_analysis(&mut self, target: &TargetId) -> Result<TargetInfo, AnalysisError> {
        let rule = self
            .rules
            .get(target)
            .cloned()
            .ok_or_else(|| AnalysisError::UnresolvedDependency {
                target: target.clone(),
            })?;

        self.analyzed.insert(target.clone(), Analyzed::InProgress);
        self.in_progress.push(target.clone());

        let result = match self.registry.get(&rule.symbol) {
            Some(handler) => {
                let mut ctx = AnalysisContext::new(self, target.clone());
                handler.analyze(&mut ctx, &rule)
            }
            None => Err(AnalysisError::UnknownRule {
                library: rule.symbol.library.clone(),
                symbol: rule.symbol.symbol.clone(),
            }),
        };

        self.in_progress.pop();
        match result {
            Ok(info) => {
                tracing::debug!("analyzed {}", target);
                if info.is_persistent() {
                    self.workspace
                        .set_persistent_target_info(target.clone(), info.clone());
                }
                self.analyzed
                    .insert(target.clone(), Analyzed::Done(info.clone()));
                Ok(info)
            }
            Err(e) => {
                if !matches!(e, AnalysisError::DependencyFailed { .. }) {
                    self.record_error(target.clone(), e);
                }
                self.analyzed.insert(target.clone(), Analyzed::Failed);
                Err(AnalysisError::DependencyFailed {
                    target: target.clone(),
                })
            }
        }
    }

    /// CMake names for `target`.
    ///
    /// Names of targets outside the active repository are remembered so the
    /// snapshot can pin them for later invocations.
    pub fn generate_cmake_target_pair(&mut self, target: &TargetId) -> CMakeTargetPair {
        let pair = match self.workspace.repository(&target.repository_id) {
            Some(repository) => repository.get_cmake_target_pair(target),
            None => CMakeTargetPair::generate(
                target,
                &CMakePackage::new(target.repository_id.name()),
            ),
        };
        if target.repository_id != self.repository_id {
            self.required_dep_targets
                .entry(target.clone())
                .or_insert_with(|| pair.clone());
        }
        pair
    }

    /// Third-party targets whose CMake names were used.
    pub fn visit_required_dep_targets(&self) -> impl Iterator<Item = (&TargetId, &CMakeTargetPair)> {
        self.required_dep_targets.iter()
    }

    /// Declared targets that were never reached by analysis.
    pub fn unanalyzed_targets(&self) -> Vec<&TargetId> {
        self.targets_to_analyze
            .iter()
            .filter(|t| !self.analyzed.contains_key(*t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingHandler, TestRepo};

    #[test]
    fn test_memoized_analysis() {
        let (handler, count) = CountingHandler::new();
        let mut repo = TestRepo::new();
        repo.register("//tools:defs.bzl", "counted", handler);
        let state = repo.load(
            "pkg",
            "load(\"//tools:defs.bzl\", \"counted\")\ncounted(name = \"a\")\n",
        );
        let target = TargetId::parse("@repo//pkg:a").unwrap();
        let first = state.get_target_info(&target).unwrap();
        let second = state.get_target_info(&target).unwrap();
        assert_eq!(first, second);
        assert_eq!(count.get(), 1);
        assert!(state.errors().is_empty());
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            "alias(name = \"a\", actual = \":b\")\nalias(name = \"b\", actual = \":a\")\n",
        );
        let a = TargetId::parse("@repo//pkg:a").unwrap();
        state.analyze(&[a.clone()]);

        assert_eq!(state.errors().len(), 1);
        let error = &state.errors()[0];
        assert_eq!(error.target, TargetId::parse("@repo//pkg:b").unwrap());
        match &error.error {
            AnalysisError::Cycle { path } => {
                let labels: Vec<String> = path.iter().map(|t| t.as_label()).collect();
                assert_eq!(labels, vec!["@repo//pkg:a", "@repo//pkg:b", "@repo//pkg:a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
        assert!(matches!(
            state.get_target_info(&a),
            Err(AnalysisError::DependencyFailed { .. })
        ));
    }

    #[test]
    fn test_errors_do_not_stop_independent_targets() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            r#"
genrule(name = "good", outs = ["good.txt"], cmd = "echo hi > $@")
genrule(name = "bad", outs = ["bad.txt"], cmd = "echo $(NOPE) > $@")
"#,
        );
        let targets = state.targets_to_analyze().to_vec();
        state.analyze(&targets);

        assert_eq!(state.errors().len(), 1);
        assert_eq!(state.errors()[0].target.target_name, "bad");
        let text = state.builder().as_text();
        assert!(text.contains("good.txt"));
        assert!(!text.contains("bad.txt"));
    }

    #[test]
    fn test_undeclared_root_target_is_unresolved() {
        let mut repo = TestRepo::new();
        let state = repo.load("pkg", "filegroup(name = \"a\", srcs = [\"a.txt\"])\n");
        state.analyze(&[TargetId::parse("@repo//pkg:missing").unwrap()]);
        assert!(matches!(
            state.errors()[0].error,
            AnalysisError::UnresolvedDependency { .. }
        ));
    }

    #[test]
    fn test_undeclared_source_file_has_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        std::fs::write(tmp.path().join("pkg/in.txt"), "").unwrap();
        let mut repo = TestRepo::with_source_dir(tmp.path());
        let state = repo.load("pkg", "");

        let info = state
            .get_target_info(&TargetId::parse("@repo//pkg:in.txt").unwrap())
            .unwrap();
        assert_eq!(
            info.files().unwrap(),
            &[to_posix(&tmp.path().join("pkg/in.txt"))]
        );
        assert!(matches!(
            state.get_target_info(&TargetId::parse("@repo//pkg:nope.txt").unwrap()),
            Err(AnalysisError::UnresolvedDependency { .. })
        ));
    }

    #[test]
    fn test_syntax_error_is_recorded_against_build_file() {
        let mut repo = TestRepo::new();
        let state = repo.load("pkg", "filegroup(name = \"a\"\n");
        assert_eq!(state.errors().len(), 1);
        assert_eq!(state.errors()[0].target.as_label(), "@repo//pkg:BUILD");
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            "filegroup(name = \"a\")\nfilegroup(name = \"a\")\nfilegroup(name = \"b\")\n",
        );
        assert_eq!(state.errors().len(), 1);
        assert_eq!(state.targets_to_analyze().len(), 2);
    }

    #[test]
    fn test_unanalyzed_and_required_dep_targets() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            r#"
cc_library(name = "lib", deps = ["@dep//:core"])
filegroup(name = "unused", srcs = ["x.txt"])
"#,
        );
        state.analyze(&[TargetId::parse("@repo//pkg:lib").unwrap()]);
        assert!(state.errors().is_empty(), "{:?}", state.errors());
        let unanalyzed: Vec<String> = state
            .unanalyzed_targets()
            .iter()
            .map(|t| t.as_label())
            .collect();
        assert_eq!(unanalyzed, vec!["@repo//pkg:unused"]);

        let deps: Vec<(String, String)> = state
            .visit_required_dep_targets()
            .map(|(t, p)| (t.as_label(), p.dep().to_string()))
            .collect();
        assert_eq!(deps, vec![("@dep//:core".to_string(), "Dep::core".to_string())]);
    }

    #[test]
    fn test_bindings_redirect_labels() {
        let mut repo = TestRepo::new();
        repo.bind("@repo//external:zlib", "@dep//:zlib");
        let state = repo.load("pkg", "");
        let package = RepositoryId::new("repo").get_package_id("pkg");
        assert_eq!(
            state.resolve_target(&package, "//external:zlib").unwrap().as_label(),
            "@dep//:zlib"
        );
        assert_eq!(
            state.resolve_target(&package, ":x").unwrap().as_label(),
            "@repo//pkg:x"
        );
    }
}
