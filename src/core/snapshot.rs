//! Workspace snapshot encoding and decoding.
//!
//! The snapshot is the only state shared between the root invocation and the
//! invocations for its dependency repositories. It is a versioned JSON
//! document and is rejected outright when the version differs.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::label::{RepositoryId, TargetId};
use crate::core::provider::TargetInfo;
use crate::core::repository::CMakeRepository;
use crate::core::workspace::Workspace;
use crate::util::fs::write_string_if_changed;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot validation failure. Always fatal.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("workspace snapshot version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("repository `{0}` is not part of the loaded workspace snapshot")]
    UnknownRepository(String),

    #[error("repository configuration mismatch for `{repository}`:\n{report}")]
    Mismatch { repository: String, report: String },
}

/// Serialized form of a [`Workspace`].
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub version: u32,
    pub root_repository: RepositoryId,
    #[serde(default)]
    pub repositories: Vec<CMakeRepository>,
    #[serde(default)]
    pub values: Vec<(String, String)>,
    #[serde(default)]
    pub cmake_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub ignored_libraries: Vec<TargetId>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub persisted_target_info: Vec<PersistedTargetInfo>,
    #[serde(default)]
    pub verbose: u8,
}

/// A TargetInfo carried over to dependency invocations.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedTargetInfo {
    pub label: TargetId,
    pub providers: TargetInfo,
}

impl WorkspaceSnapshot {
    pub fn from_workspace(workspace: &Workspace) -> Self {
        WorkspaceSnapshot {
            version: SNAPSHOT_VERSION,
            root_repository: workspace.root_repository_id.clone(),
            repositories: workspace.all_repositories.values().cloned().collect(),
            values: workspace.values.iter().cloned().collect(),
            cmake_vars: workspace.cmake_vars.clone(),
            ignored_libraries: workspace.global_ignored_libraries.iter().cloned().collect(),
            modules: workspace.modules.clone(),
            persisted_target_info: workspace
                .persistent_target_info
                .iter()
                .map(|(label, info)| PersistedTargetInfo {
                    label: label.clone(),
                    providers: info.clone(),
                })
                .collect(),
            verbose: workspace.verbose,
        }
    }

    /// Whether this snapshot can be read by this version.
    pub fn is_compatible(&self) -> bool {
        self.version == SNAPSHOT_VERSION
    }

    pub fn into_workspace(self) -> Workspace {
        Workspace {
            root_repository_id: self.root_repository,
            all_repositories: self
                .repositories
                .into_iter()
                .map(|r| (r.repository_id.clone(), r))
                .collect(),
            values: self.values.into_iter().collect(),
            cmake_vars: self.cmake_vars,
            global_ignored_libraries: self.ignored_libraries.into_iter().collect(),
            modules: self.modules,
            persistent_target_info: self
                .persisted_target_info
                .into_iter()
                .map(|p| (p.label, p.providers))
                .collect(),
            verbose: self.verbose,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read workspace snapshot: {}", path.display()))?;

        // Check the version before decoding the rest so that a schema change
        // reports as a version problem instead of a parse error.
        #[derive(Deserialize)]
        struct Header {
            version: u32,
        }
        let header: Header = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse workspace snapshot: {}", path.display()))?;
        if header.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: header.version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse workspace snapshot: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).context("failed to serialize workspace snapshot")?;
        write_string_if_changed(path, &contents)
    }
}

impl Workspace {
    /// Restore a workspace saved by the root invocation.
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        Ok(WorkspaceSnapshot::load(path)?.into_workspace())
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        WorkspaceSnapshot::from_workspace(self).save(path)
    }
}
