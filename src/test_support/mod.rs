//! Test utilities for unit tests.
//!
//! [`TestRepo`] builds an in-memory translation of repository `@repo`
//! (project `Repo`, sources in `/src/repo`, build tree in `/build/repo`) with
//! a known dependency `@dep` (project `Dep`). BUILD files are loaded from
//! strings, so nothing touches disk unless a test sets a real source dir.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut repo = TestRepo::new();
//! let state = repo.load("pkg", "filegroup(name = \"a\", srcs = [\"a.txt\"])");
//! let info = state.get_target_info(&TargetId::parse("@repo//pkg:a")?)?;
//! ```

use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::builder::context::{AnalysisContext, LoadContext};
use crate::builder::error::AnalysisError;
use crate::builder::evaluation::{EvaluationState, RuleDecl};
use crate::builder::rules::registry::{RuleRegistry, NATIVE_LIBRARY};
use crate::builder::rules::trait_def::Handler;
use crate::core::cmake_target::{CMakePackage, CMakeTarget};
use crate::core::label::{RepositoryId, TargetId};
use crate::core::provider::{Provider, TargetInfo};
use crate::core::repository::{make_repo_mapping, CMakeRepository};
use crate::core::workspace::Workspace;
use crate::starlark::SymbolRef;

/// In-memory evaluation fixture.
pub struct TestRepo {
    workspace: Workspace,
    registry: RuleRegistry,
    bindings: BTreeMap<TargetId, TargetId>,
    state: Option<EvaluationState>,
}

impl TestRepo {
    pub fn new() -> Self {
        Self::with_source_dir(Path::new("/src/repo"))
    }

    /// Like [`TestRepo::new`] with `@repo` sources in `source_dir`.
    pub fn with_source_dir(source_dir: &Path) -> Self {
        let repo_id = RepositoryId::new("repo");
        let mut workspace = Workspace::new(repo_id.clone(), BTreeMap::new());
        workspace.add_cmake_repository(
            CMakeRepository::new(
                repo_id.clone(),
                CMakePackage::new("Repo"),
                source_dir.to_path_buf(),
                PathBuf::from("/build/repo"),
            )
            .with_repo_mapping(make_repo_mapping(&repo_id, &[])),
        );
        workspace.add_cmake_repository(CMakeRepository::new(
            RepositoryId::new("dep"),
            CMakePackage::new("Dep"),
            PathBuf::from("/src/dep"),
            PathBuf::from("/build/dep"),
        ));
        TestRepo {
            workspace,
            registry: RuleRegistry::new(),
            bindings: BTreeMap::new(),
            state: None,
        }
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        match &mut self.state {
            Some(state) => state.workspace_mut(),
            None => &mut self.workspace,
        }
    }

    /// Register a handler; `library` is a label relative to `@repo`.
    pub fn register(&mut self, library: &str, symbol: &str, handler: Rc<dyn Handler>) {
        assert!(self.state.is_none(), "register handlers before loading");
        let library = RepositoryId::new("repo")
            .parse_target(library)
            .unwrap()
            .as_label();
        self.registry.register(&library, symbol, handler);
    }

    pub fn enable_module(&mut self, name: &str) {
        assert!(self.state.is_none(), "enable modules before loading");
        self.workspace.add_module(name);
        self.registry.enable_module(name).unwrap();
    }

    pub fn bind(&mut self, name: &str, actual: &str) {
        assert!(self.state.is_none(), "bind before loading");
        self.bindings.insert(
            TargetId::parse(name).unwrap(),
            TargetId::parse(actual).unwrap(),
        );
    }

    pub fn ignore_library(&mut self, label: &str) {
        let target = TargetId::parse(label).unwrap();
        self.workspace_mut().ignore_library(target);
    }

    /// Make `label` available with the given TargetInfo.
    pub fn add_info(&mut self, label: &str, info: TargetInfo) {
        let target = TargetId::parse(label).unwrap();
        self.workspace_mut().set_persistent_target_info(target, info);
    }

    pub fn add_files(&mut self, label: &str, paths: &[&str]) {
        self.add_info(
            label,
            TargetInfo::new([Provider::Files {
                paths: paths.iter().map(|p| p.to_string()).collect(),
            }]),
        );
    }

    pub fn add_executable(&mut self, label: &str, cmake_target: &str) {
        self.add_info(
            label,
            TargetInfo::new([Provider::CMakeExecutableTarget {
                target: CMakeTarget::new(cmake_target),
            }]),
        );
    }

    /// The evaluation state, created on first use.
    pub fn state(&mut self) -> &mut EvaluationState {
        if self.state.is_none() {
            let registry = std::mem::take(&mut self.registry);
            let state = EvaluationState::new(
                self.workspace.clone(),
                RepositoryId::new("repo"),
                registry,
            )
            .unwrap()
            .with_bindings(std::mem::take(&mut self.bindings));
            self.state = Some(state);
        }
        self.state.as_mut().unwrap()
    }

    fn build_file(&mut self, package: &str) -> PathBuf {
        let dir = self.state().source_directory().to_path_buf();
        if package.is_empty() {
            dir.join("BUILD")
        } else {
            dir.join(package).join("BUILD")
        }
    }

    /// Load `contents` as the BUILD file of `package`.
    pub fn load(&mut self, package: &str, contents: &str) -> &mut EvaluationState {
        let path = self.build_file(package);
        let state = self.state();
        state.process_build_file_contents(&path, contents).unwrap();
        state
    }

    /// Run `f` with a load context for `package`.
    pub fn load_with(&mut self, package: &str, f: impl FnOnce(&mut LoadContext<'_>)) {
        let path = self.build_file(package);
        let package_id = RepositoryId::new("repo").get_package_id(package);
        let state = self.state();
        let mut ctx = LoadContext::new(
            state,
            package_id,
            path,
            SymbolRef::new(NATIVE_LIBRARY, "glob"),
        );
        f(&mut ctx);
    }

    /// Run `f` while analyzing `label` (relative to package `pkg`).
    pub fn analyze_with(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut AnalysisContext<'_>) -> Result<(), AnalysisError>,
    ) {
        let target = RepositoryId::new("repo")
            .get_package_id("pkg")
            .parse_target(label)
            .unwrap();
        let state = self.state();
        let mut ctx = AnalysisContext::new(state, target);
        if let Err(e) = f(&mut ctx) {
            panic!("analysis failed: {:#}", e);
        }
    }
}

/// Rule handler that counts how often its targets are analyzed.
pub struct CountingHandler {
    count: Rc<Cell<usize>>,
}

impl CountingHandler {
    pub fn new() -> (Rc<dyn Handler>, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        let handler = CountingHandler {
            count: Rc::clone(&count),
        };
        (Rc::new(handler), count)
    }
}

impl Handler for CountingHandler {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        _rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        self.count.set(self.count.get() + 1);
        Ok(TargetInfo::new([Provider::Files {
            paths: vec![ctx.target().target_name.clone()],
        }]))
    }
}
