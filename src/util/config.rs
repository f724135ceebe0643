//! Configuration file support.
//!
//! Two configuration file locations are consulted:
//! - Global: `~/.bazel_to_cmake/config.toml` - User-wide defaults
//! - Project: `<source>/.bazel_to_cmake/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Command-line lists
//! extend the configured lists. A config file that exists but cannot be
//! read or parsed is an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the per-user and per-project configuration directory.
pub const CONFIG_DIR: &str = ".bazel_to_cmake";

/// Translator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Translation settings
    pub translate: TranslateConfig,
}

/// Defaults for a translation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Package patterns to search for build files (e.g. `absl/**`)
    pub include_packages: Vec<String>,

    /// Package patterns to skip
    pub exclude_packages: Vec<String>,

    /// Labels whose libraries are never linked
    pub ignore_libraries: Vec<String>,

    /// `NAME=VALUE` defines, as with `--define`
    pub defines: Vec<String>,

    /// bazelrc files to read defines from
    pub bazelrc: Vec<PathBuf>,

    /// Optional rule modules to enable (e.g. `rules_proto`)
    pub modules: Vec<String>,

    /// Dependency repositories known to the root invocation
    pub repositories: Vec<RepositoryConfig>,
}

/// A dependency repository, as declared by the root invocation.
///
/// ```toml
/// [[translate.repositories]]
/// name = "com_google_absl"
/// cmake_project_name = "absl"
/// source_dir = "_deps/absl-src"
/// cmake_binary_dir = "_deps/absl-build"
/// repo_mapping = { absl = "com_google_absl" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Bazel repository name
    pub name: String,

    /// CMake project name
    pub cmake_project_name: String,

    /// Source directory (relative paths are taken from the root source directory)
    pub source_dir: PathBuf,

    /// CMake binary directory (relative paths are taken from the root binary directory)
    pub cmake_binary_dir: PathBuf,

    /// `@name` as written in this repository -> actual repository
    #[serde(default)]
    pub repo_mapping: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            tracing::debug!("loading config {}", path.display());
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        let t = other.translate;
        if !t.include_packages.is_empty() {
            self.translate.include_packages = t.include_packages;
        }
        if !t.exclude_packages.is_empty() {
            self.translate.exclude_packages = t.exclude_packages;
        }
        if !t.ignore_libraries.is_empty() {
            self.translate.ignore_libraries = t.ignore_libraries;
        }
        if !t.defines.is_empty() {
            self.translate.defines = t.defines;
        }
        if !t.bazelrc.is_empty() {
            self.translate.bazelrc = t.bazelrc;
        }
        if !t.modules.is_empty() {
            self.translate.modules = t.modules;
        }
        if !t.repositories.is_empty() {
            self.translate.repositories = t.repositories;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (`<source>/.bazel_to_cmake/config.toml`)
/// 2. Global config (`~/.bazel_to_cmake/config.toml`)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path)?);
    }
    config.merge(Config::load_or_default(project_path)?);

    Ok(config)
}

/// Get the global config directory (`~/.bazel_to_cmake`).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(CONFIG_DIR))
}

/// Get the global config path (`~/.bazel_to_cmake/config.toml`).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (`<source>/.bazel_to_cmake/config.toml`).
pub fn project_config_path(source_dir: &Path) -> PathBuf {
    source_dir.join(CONFIG_DIR).join("config.toml")
}
