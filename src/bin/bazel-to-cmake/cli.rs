//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

use bazel_to_cmake::util::config::RepositoryConfig;

/// Translate Bazel BUILD files into a CMake build script
#[derive(Parser)]
#[command(name = "bazel-to-cmake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Bazel name of the repository being translated
    #[arg(long)]
    pub bazel_repo_name: String,

    /// CMake project name of the repository
    #[arg(long)]
    pub cmake_project_name: String,

    /// CMake binary directory of the repository
    #[arg(long)]
    pub cmake_binary_dir: PathBuf,

    /// Repository source directory (defaults to current directory)
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Write the generated CMake script to this file
    #[arg(long)]
    pub build_rules_output: Option<PathBuf>,

    /// Save the workspace snapshot (root repository only)
    #[arg(long, conflicts_with = "load_workspace")]
    pub save_workspace: Option<PathBuf>,

    /// Load the workspace snapshot saved by the root repository
    #[arg(long)]
    pub load_workspace: Option<PathBuf>,

    /// JSON file with the CMake variables (root repository only)
    #[arg(long)]
    pub cmake_vars: Option<PathBuf>,

    /// Add a `NAME=VALUE` define
    #[arg(long = "define", value_name = "NAME=VALUE")]
    pub defines: Vec<String>,

    /// Read `build --define` lines from a bazelrc file
    #[arg(long)]
    pub bazelrc: Vec<PathBuf>,

    /// Enable an optional rule module (e.g. `rules_proto`)
    #[arg(long = "module")]
    pub modules: Vec<String>,

    /// Map repository name FROM to TO
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
    pub repo_mapping: Vec<String>,

    /// Declare a dependency repository (root repository only)
    #[arg(
        long = "repository",
        num_args = 4,
        value_names = ["NAME", "CMAKE_PROJECT", "SOURCE_DIR", "BINARY_DIR"]
    )]
    pub repositories: Vec<String>,

    /// Package pattern to search for build files (e.g. `absl/**`)
    #[arg(long = "include-package")]
    pub include_packages: Vec<String>,

    /// Package pattern to skip
    #[arg(long = "exclude-package")]
    pub exclude_packages: Vec<String>,

    /// Bind `//external:NAME` to ACTUAL
    #[arg(long, value_name = "NAME=ACTUAL")]
    pub bind: Vec<String>,

    /// Library that is never linked
    #[arg(long = "ignore-library")]
    pub ignore_libraries: Vec<String>,

    /// Target to translate (defaults to all declared targets)
    #[arg(long = "target")]
    pub targets: Vec<String>,

    /// Target to leave out
    #[arg(long = "exclude-target")]
    pub exclude_targets: Vec<String>,

    /// Additional build file to load
    #[arg(long)]
    pub extra_build: Vec<PathBuf>,

    /// Verbosity level
    #[arg(long, env = "BAZEL_TO_CMAKE_VERBOSE", default_value_t = 0)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// `--repo-mapping` values as `(from, to)` pairs.
    pub fn repo_mapping_pairs(&self) -> Vec<(String, String)> {
        self.repo_mapping
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }

    /// `--repository` values as repository declarations.
    pub fn repository_configs(&self) -> Vec<RepositoryConfig> {
        self.repositories
            .chunks_exact(4)
            .map(|r| RepositoryConfig {
                name: r[0].clone(),
                cmake_project_name: r[1].clone(),
                source_dir: PathBuf::from(&r[2]),
                cmake_binary_dir: PathBuf::from(&r[3]),
                repo_mapping: Default::default(),
            })
            .collect()
    }
}
