//! bazel-to-cmake CLI - translate Bazel BUILD files into a CMake build script

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bazel_to_cmake::core::snapshot::SnapshotError;
use bazel_to_cmake::ops::{translate, TranslateError, TranslateOptions};
use bazel_to_cmake::util::config::{global_config_path, load_config, project_config_path};
use bazel_to_cmake::util::diagnostic::{self, suggestions, Diagnostic};

mod cli;

use cli::Cli;

const ERROR_BANNER: &str = "---------------------------------------------------";

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose > 0 {
        EnvFilter::new("bazel_to_cmake=debug")
    } else {
        EnvFilter::new("bazel_to_cmake=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let color = !cli.no_color && std::io::stderr().is_terminal();
    let outcome = match build_options(&cli).and_then(|opts| translate(&opts)) {
        Ok(outcome) => outcome,
        Err(e) => {
            diagnostic::emit(&fatal_diagnostic(&e), color);
            return 1;
        }
    };

    if cli.verbose > 0 && !cli.targets.is_empty() && !outcome.missing.is_empty() {
        let missing: Vec<String> = outcome.missing.iter().map(|t| t.as_label()).collect();
        diagnostic::emit(
            &Diagnostic::warning("targets missing").with_context(missing.join(" ")),
            color,
        );
    }

    if outcome.is_success() {
        return 0;
    }

    eprintln!("\n{}\nbazel_to_cmake encountered errors\n{}", ERROR_BANNER, ERROR_BANNER);
    for error in &outcome.errors {
        diagnostic::emit(&error.to_diagnostic(), color);
    }
    1
}

/// Render an error that stopped the translation before analysis.
fn fatal_diagnostic(error: &anyhow::Error) -> Diagnostic {
    let diag = Diagnostic::error(format!("{:#}", error));
    if error.downcast_ref::<SnapshotError>().is_some() {
        diag.with_suggestion(suggestions::SNAPSHOT_MISMATCH)
    } else {
        diag
    }
}

/// Combine the command line with the configuration files.
///
/// Lists from the command line extend the configured ones.
fn build_options(cli: &Cli) -> Result<TranslateOptions> {
    let source_dir = match &cli.source_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to get current directory")?,
    };
    let config = load_config(
        global_config_path().as_deref(),
        &project_config_path(&source_dir),
    )
    .map_err(|e| TranslateError::Configuration(format!("{:#}", e)))?
    .translate;

    let extend = |configured: Vec<String>, given: &[String]| -> Vec<String> {
        configured.into_iter().chain(given.iter().cloned()).collect()
    };
    let bazelrc: Vec<PathBuf> = config
        .bazelrc
        .into_iter()
        .chain(cli.bazelrc.iter().cloned())
        .collect();

    Ok(TranslateOptions {
        repository_name: cli.bazel_repo_name.clone(),
        cmake_project_name: cli.cmake_project_name.clone(),
        cmake_binary_dir: cli.cmake_binary_dir.clone(),
        build_rules_output: cli.build_rules_output.clone(),
        save_workspace: cli.save_workspace.clone(),
        load_workspace: cli.load_workspace.clone(),
        cmake_vars: cli.cmake_vars.clone(),
        defines: extend(config.defines, &cli.defines),
        bazelrc,
        modules: extend(config.modules, &cli.modules),
        repo_mapping: cli.repo_mapping_pairs(),
        repositories: config
            .repositories
            .into_iter()
            .chain(cli.repository_configs())
            .collect(),
        include_packages: extend(config.include_packages, &cli.include_packages),
        exclude_packages: extend(config.exclude_packages, &cli.exclude_packages),
        bind: cli.bind.clone(),
        ignore_libraries: extend(config.ignore_libraries, &cli.ignore_libraries),
        targets: cli.targets.clone(),
        exclude_targets: cli.exclude_targets.clone(),
        extra_build: cli.extra_build.clone(),
        verbose: cli.verbose,
        source_dir,
    })
}
