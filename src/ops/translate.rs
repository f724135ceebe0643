//! Implementation of a translation run.
//!
//! A root invocation builds the workspace from its options and may save it as
//! a snapshot. Every dependency repository is then translated by a separate
//! invocation that restores that snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::builder::error::TargetError;
use crate::builder::evaluation::EvaluationState;
use crate::builder::output::FRONT_MATTER_SECTION;
use crate::builder::rules::RuleRegistry;
use crate::core::cmake_target::{CMakePackage, CMakeTargetPair};
use crate::core::label::{expand_special_targets, RepositoryId, TargetId};
use crate::core::repository::{make_repo_mapping, CMakeRepository};
use crate::core::workspace::Workspace;
use crate::ops::build_files::find_build_files;
use crate::util::config::RepositoryConfig;
use crate::util::fs::{read_to_string, write_string_if_changed};
use crate::util::quote::{quote_list, quote_string};

/// Fatal problems detected before analysis starts.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("{0}")]
    Configuration(String),

    #[error(
        "no build files in {} match include_packages={include:?} and exclude_packages={exclude:?}",
        source_dir.display()
    )]
    Discovery {
        source_dir: PathBuf,
        include: Vec<String>,
        exclude: Vec<String>,
    },
}

impl TranslateError {
    fn configuration(message: impl Into<String>) -> Self {
        TranslateError::Configuration(message.into())
    }
}

/// Options for one translation run.
#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Bazel name of the repository being translated
    pub repository_name: String,

    /// CMake project name of the repository
    pub cmake_project_name: String,

    /// Repository source directory
    pub source_dir: PathBuf,

    /// CMake binary directory of the repository
    pub cmake_binary_dir: PathBuf,

    /// Where to write the generated CMake script
    pub build_rules_output: Option<PathBuf>,

    /// Save the workspace snapshot here (root invocation)
    pub save_workspace: Option<PathBuf>,

    /// Restore the workspace snapshot from here (dependency invocation)
    pub load_workspace: Option<PathBuf>,

    /// JSON file with the CMake variables (root invocation)
    pub cmake_vars: Option<PathBuf>,

    /// `NAME=VALUE` defines
    pub defines: Vec<String>,

    /// bazelrc files to read defines from
    pub bazelrc: Vec<PathBuf>,

    /// Optional rule modules
    pub modules: Vec<String>,

    /// `(from, to)` repository name mappings
    pub repo_mapping: Vec<(String, String)>,

    /// Dependency repositories to record in the workspace (root invocation)
    pub repositories: Vec<RepositoryConfig>,

    /// Package patterns to search for build files (empty = all)
    pub include_packages: Vec<String>,

    /// Package patterns to skip
    pub exclude_packages: Vec<String>,

    /// `NAME=ACTUAL` bindings for `//external:NAME`
    pub bind: Vec<String>,

    /// Libraries that are never linked
    pub ignore_libraries: Vec<String>,

    /// Targets to analyze (empty = every declared target)
    pub targets: Vec<String>,

    /// Targets to leave out
    pub exclude_targets: Vec<String>,

    /// Additional build files to load
    pub extra_build: Vec<PathBuf>,

    /// Verbosity level
    pub verbose: u8,
}

/// Result of a translation that got as far as analysis.
#[derive(Debug)]
pub struct TranslateOutcome {
    /// Errors recorded during loading and analysis
    pub errors: Vec<TargetError>,

    /// Targets that were requested for analysis
    pub targets: Vec<TargetId>,

    /// Declared targets that analysis never reached
    pub missing: Vec<TargetId>,
}

impl TranslateOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Translate one repository.
///
/// Fatal problems are returned as `Err`, before anything is written. Analysis
/// errors are returned in the outcome; the script is still written in that
/// case but fails CMake configuration, and no snapshot is saved.
pub fn translate(opts: &TranslateOptions) -> Result<TranslateOutcome> {
    let repository_id = RepositoryId::new(&opts.repository_name);

    let mut workspace = match &opts.load_workspace {
        Some(path) => {
            if !opts.repositories.is_empty() {
                tracing::warn!("repositories are taken from the loaded workspace snapshot");
            }
            load_root_workspace(opts, path, &repository_id)?
        }
        None => create_root_workspace(opts, &repository_id)?,
    };
    tracing::debug!("loading workspace {}", repository_id);

    for label in &opts.ignore_libraries {
        workspace.ignore_library(parse_label(&repository_id, label)?);
    }
    let registry = create_registry(workspace.modules())?;
    let bindings = parse_bindings(&opts.bind, &repository_id)?;

    let mut state =
        EvaluationState::new(workspace, repository_id.clone(), registry)?.with_bindings(bindings);

    let targets = process_build_files(opts, &mut state)?;
    state.analyze(&targets);

    let missing: Vec<TargetId> = state.unanalyzed_targets().into_iter().cloned().collect();

    add_configure_depends(&mut state);
    let errors = state.take_errors();
    if !errors.is_empty() {
        let failed: BTreeSet<String> = errors.iter().map(|e| e.target.as_label()).collect();
        let message = format!(
            "bazel_to_cmake failed for: {}",
            failed.into_iter().collect::<Vec<_>>().join(" ")
        );
        state.builder_mut().addtext(
            format!("message(FATAL_ERROR {})\n", quote_string(&message)),
            FRONT_MATTER_SECTION,
        );
    }

    if let Some(output) = &opts.build_rules_output {
        write_string_if_changed(output, &state.builder().as_text())?;
        tracing::info!("wrote {}", output.display());
    }

    if let Some(path) = &opts.save_workspace {
        if errors.is_empty() {
            save_workspace(state, path)?;
        } else {
            tracing::warn!("not saving workspace snapshot because of errors");
        }
    }

    Ok(TranslateOutcome {
        errors,
        targets,
        missing,
    })
}

/// Build the workspace for the root repository from the options.
fn create_root_workspace(opts: &TranslateOptions, repository_id: &RepositoryId) -> Result<Workspace> {
    let cmake_vars = match &opts.cmake_vars {
        Some(path) => load_cmake_vars(path)?,
        None => {
            return Err(TranslateError::configuration(
                "--cmake-vars is required when --load-workspace is not given",
            )
            .into())
        }
    };

    let mut workspace = Workspace::new(repository_id.clone(), cmake_vars);
    workspace.set_verbose(opts.verbose);
    workspace.add_platform_constraints();
    for define in &opts.defines {
        workspace.add_define(define.as_str());
    }
    for bazelrc in &opts.bazelrc {
        workspace
            .load_bazelrc(&opts.source_dir.join(bazelrc))
            .map_err(|e| TranslateError::configuration(format!("{:#}", e)))?;
    }
    for module in &opts.modules {
        workspace.add_module(module.as_str());
    }

    workspace.add_cmake_repository(
        CMakeRepository::new(
            repository_id.clone(),
            CMakePackage::new(&opts.cmake_project_name),
            opts.source_dir.clone(),
            opts.cmake_binary_dir.clone(),
        )
        .with_repo_mapping(make_repo_mapping(repository_id, &opts.repo_mapping)),
    );
    for repository in &opts.repositories {
        add_dependency_repository(&mut workspace, opts, repository)?;
    }
    Ok(workspace)
}

/// Record a dependency repository so its own invocation can find it in the
/// snapshot.
fn add_dependency_repository(
    workspace: &mut Workspace,
    opts: &TranslateOptions,
    repository: &RepositoryConfig,
) -> Result<(), TranslateError> {
    let repository_id = RepositoryId::new(&repository.name);
    let name = repository_id.name();
    if name.is_empty() || name.contains(|c| matches!(c, '@' | '/' | ':')) {
        return Err(TranslateError::configuration(format!(
            "invalid repository name `{}`",
            repository.name
        )));
    }
    if workspace.repository(&repository_id).is_some() {
        return Err(TranslateError::configuration(format!(
            "repository `{}` declared more than once",
            repository_id
        )));
    }

    let pairs: Vec<(String, String)> = repository
        .repo_mapping
        .iter()
        .map(|(from, to)| (from.clone(), to.clone()))
        .collect();
    workspace.add_cmake_repository(
        CMakeRepository::new(
            repository_id.clone(),
            CMakePackage::new(&repository.cmake_project_name),
            opts.source_dir.join(&repository.source_dir),
            opts.cmake_binary_dir.join(&repository.cmake_binary_dir),
        )
        .with_repo_mapping(make_repo_mapping(&repository_id, &pairs)),
    );
    Ok(())
}

fn load_cmake_vars(path: &Path) -> Result<BTreeMap<String, String>> {
    let contents =
        read_to_string(path).map_err(|e| TranslateError::configuration(format!("{:#}", e)))?;
    serde_json::from_str(&contents).map_err(|e| {
        TranslateError::configuration(format!(
            "failed to decode cmake vars as JSON: {}: {}",
            path.display(),
            e
        ))
        .into()
    })
}

/// Restore the root workspace and check that it describes this repository
/// the same way the options do.
fn load_root_workspace(
    opts: &TranslateOptions,
    path: &Path,
    repository_id: &RepositoryId,
) -> Result<Workspace> {
    let mut workspace = Workspace::load_snapshot(path)?;
    if opts.verbose > workspace.verbose() {
        workspace.set_verbose(opts.verbose);
    }
    workspace.verify_repository(
        repository_id,
        &CMakePackage::new(&opts.cmake_project_name),
        &opts.source_dir,
        &opts.cmake_binary_dir,
    )?;
    Ok(workspace)
}

fn create_registry(modules: &[String]) -> Result<RuleRegistry, TranslateError> {
    let mut registry = RuleRegistry::new();
    for module in modules {
        registry
            .enable_module(module)
            .map_err(|e| TranslateError::configuration(e.to_string()))?;
    }
    Ok(registry)
}

fn parse_label(repository_id: &RepositoryId, label: &str) -> Result<TargetId, TranslateError> {
    repository_id
        .parse_target(label)
        .map_err(|e| TranslateError::configuration(e.to_string()))
}

/// Parse `NAME=ACTUAL` bindings.
///
/// `NAME` is relative to the repository's `//external` package, so both
/// `zlib=@zlib` and `//third_party:zlib=@zlib` are accepted.
fn parse_bindings(
    binds: &[String],
    repository_id: &RepositoryId,
) -> Result<BTreeMap<TargetId, TargetId>, TranslateError> {
    let external = repository_id.get_package_id("external");
    let mut bindings = BTreeMap::new();
    for bind in binds {
        let (name, actual) = bind
            .split_once('=')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| {
                TranslateError::configuration(format!(
                    "invalid --bind `{}`: expected NAME=ACTUAL",
                    bind
                ))
            })?;
        let target = external
            .parse_target(name)
            .map_err(|e| TranslateError::configuration(e.to_string()))?;
        let actual = parse_label(repository_id, actual)?;
        tracing::debug!("--bind {}={}", target, actual);
        if bindings.contains_key(&target) {
            return Err(TranslateError::configuration(format!(
                "duplicate --bind for `{}`",
                target
            )));
        }
        bindings.insert(target, actual);
    }
    Ok(bindings)
}

/// Load the selected build files and work out which targets to analyze.
fn process_build_files(
    opts: &TranslateOptions,
    state: &mut EvaluationState,
) -> Result<Vec<TargetId>> {
    let source_dir = state.source_directory().to_path_buf();
    let mut build_files =
        find_build_files(&source_dir, &opts.include_packages, &opts.exclude_packages)?;
    build_files.extend(opts.extra_build.iter().map(|p| source_dir.join(p)));

    if build_files.is_empty() {
        return Err(TranslateError::Discovery {
            source_dir,
            include: opts.include_packages.clone(),
            exclude: opts.exclude_packages.clone(),
        }
        .into());
    }

    for build_file in &build_files {
        tracing::debug!("loading {}", build_file.display());
        state.process_build_file(build_file)?;
    }

    let repository_id = state.repository_id().clone();
    let declared: BTreeSet<TargetId> = state.targets_to_analyze().iter().cloned().collect();
    let mut selected = if opts.targets.is_empty() {
        declared.clone()
    } else {
        let mut selected = BTreeSet::new();
        for label in &opts.targets {
            let target = parse_label(&repository_id, label)?;
            selected.extend(expand_special_targets(&target, &declared));
        }
        selected
    };

    for label in &opts.exclude_targets {
        let target = parse_label(&repository_id, label)?;
        for excluded in expand_special_targets(&target, &selected) {
            selected.remove(&excluded);
        }
    }

    Ok(selected.into_iter().collect())
}

/// Make CMake re-run the translation when any of its inputs change.
fn add_configure_depends(state: &mut EvaluationState) {
    let mut inputs: BTreeSet<String> = state
        .loaded_files()
        .iter()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();
    match std::env::current_exe() {
        Ok(exe) => {
            inputs.insert(exe.to_string_lossy().replace('\\', "/"));
        }
        Err(e) => tracing::warn!("cannot locate the running executable: {}", e),
    }
    let text = format!(
        "set_property(DIRECTORY APPEND PROPERTY CMAKE_CONFIGURE_DEPENDS {})\n",
        quote_list(inputs, "\n    ")
    );
    state.builder_mut().addtext(text, FRONT_MATTER_SECTION);
}

/// Pin the names of third-party targets and save the workspace.
fn save_workspace(state: EvaluationState, path: &Path) -> Result<()> {
    let pairs: Vec<(TargetId, CMakeTargetPair)> = state
        .visit_required_dep_targets()
        .map(|(target, pair)| (target.clone(), pair.clone()))
        .collect();

    let mut workspace = state.into_workspace();
    for (target, pair) in pairs {
        match workspace.repository_mut(&target.repository_id) {
            Some(repository) => repository.set_persisted_canonical_name(target, pair)?,
            None => tracing::debug!("not persisting name of {}: unknown repository", target),
        }
    }

    workspace
        .save_snapshot(path)
        .with_context(|| format!("failed to save workspace to {}", path.display()))?;
    tracing::info!("saved workspace to {}", path.display());
    Ok(())
}
