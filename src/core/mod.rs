//! Core data structures.
//!
//! This module contains the foundational types used throughout the translator:
//! - Bazel identifiers (RepositoryId, PackageId, TargetId)
//! - Analysis results (Provider, TargetInfo)
//! - CMake names and per-repository configuration
//! - The Workspace and its persisted snapshot

pub mod cmake_target;
pub mod label;
pub mod provider;
pub mod repository;
pub mod snapshot;
pub mod workspace;

pub use cmake_target::{CMakePackage, CMakeTarget, CMakeTargetPair};
pub use label::{expand_special_targets, LabelError, PackageId, RepositoryId, TargetId};
pub use provider::{Provider, ProviderKind, SettingValue, TargetInfo};
pub use repository::{make_repo_mapping, CMakeRepository};
pub use snapshot::{SnapshotError, WorkspaceSnapshot, SNAPSHOT_VERSION};
pub use workspace::Workspace;
