//! Analysis results.
//!
//! A [`TargetInfo`] is the immutable bag of [`Provider`]s published once a
//! target has been analyzed. Provider kinds form a closed set so consumers can
//! match on them exhaustively.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::cmake_target::CMakeTarget;

/// Discriminant of a [`Provider`]; a TargetInfo holds at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    Files,
    CMakeExecutableTarget,
    CMakeLinkLibraries,
    CMakeDeps,
    BuildSetting,
    Condition,
    TemplateVariables,
}

/// Value of a build setting (`bool_flag`, `string_flag`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Bazel compares flag values against their Starlark spelling.
            SettingValue::Bool(true) => f.write_str("true"),
            SettingValue::Bool(false) => f.write_str("false"),
            SettingValue::Int(v) => write!(f, "{}", v),
            SettingValue::String(s) => f.write_str(s),
        }
    }
}

/// One typed fact about an analyzed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provider {
    /// Files produced (or exported) by the target.
    Files { paths: Vec<String> },

    /// The target is a CMake executable.
    CMakeExecutableTarget { target: CMakeTarget },

    /// The target is a CMake library dependents link against.
    CMakeLinkLibraries { target: CMakeTarget },

    /// CMake targets that must be built before dependents.
    CMakeDeps { targets: Vec<CMakeTarget> },

    /// Current value of a build setting.
    BuildSetting { value: SettingValue },

    /// Whether a `config_setting` matches the current configuration.
    Condition { value: bool },

    /// Make variables contributed by a toolchain.
    TemplateVariables { variables: BTreeMap<String, String> },
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Files { .. } => ProviderKind::Files,
            Provider::CMakeExecutableTarget { .. } => ProviderKind::CMakeExecutableTarget,
            Provider::CMakeLinkLibraries { .. } => ProviderKind::CMakeLinkLibraries,
            Provider::CMakeDeps { .. } => ProviderKind::CMakeDeps,
            Provider::BuildSetting { .. } => ProviderKind::BuildSetting,
            Provider::Condition { .. } => ProviderKind::Condition,
            Provider::TemplateVariables { .. } => ProviderKind::TemplateVariables,
        }
    }
}

/// The complete analysis result for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Provider>", into = "Vec<Provider>")]
pub struct TargetInfo {
    providers: BTreeMap<ProviderKind, Provider>,
}

impl TargetInfo {
    /// Create a TargetInfo from a set of providers of distinct kinds.
    pub fn new(providers: impl IntoIterator<Item = Provider>) -> Self {
        providers
            .into_iter()
            .fold(TargetInfo::default(), |info, p| info.with(p))
    }

    /// Attach a provider. Each kind may only be attached once.
    pub fn with(mut self, provider: Provider) -> Self {
        let kind = provider.kind();
        debug_assert!(
            !self.providers.contains_key(&kind),
            "provider {:?} published twice",
            kind
        );
        self.providers.entry(kind).or_insert(provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Provider> {
        self.providers.get(&kind)
    }

    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    pub fn files(&self) -> Option<&[String]> {
        match self.get(ProviderKind::Files) {
            Some(Provider::Files { paths }) => Some(paths),
            _ => None,
        }
    }

    pub fn executable_target(&self) -> Option<&CMakeTarget> {
        match self.get(ProviderKind::CMakeExecutableTarget) {
            Some(Provider::CMakeExecutableTarget { target }) => Some(target),
            _ => None,
        }
    }

    pub fn link_libraries(&self) -> Option<&CMakeTarget> {
        match self.get(ProviderKind::CMakeLinkLibraries) {
            Some(Provider::CMakeLinkLibraries { target }) => Some(target),
            _ => None,
        }
    }

    /// Build-order dependencies; empty when the provider is absent.
    pub fn cmake_deps(&self) -> &[CMakeTarget] {
        match self.get(ProviderKind::CMakeDeps) {
            Some(Provider::CMakeDeps { targets }) => targets,
            _ => &[],
        }
    }

    pub fn build_setting(&self) -> Option<&SettingValue> {
        match self.get(ProviderKind::BuildSetting) {
            Some(Provider::BuildSetting { value }) => Some(value),
            _ => None,
        }
    }

    pub fn condition(&self) -> Option<bool> {
        match self.get(ProviderKind::Condition) {
            Some(Provider::Condition { value }) => Some(*value),
            _ => None,
        }
    }

    pub fn template_variables(&self) -> Option<&BTreeMap<String, String>> {
        match self.get(ProviderKind::TemplateVariables) {
            Some(Provider::TemplateVariables { variables }) => Some(variables),
            _ => None,
        }
    }

    /// Whether this info must survive into the workspace snapshot.
    pub fn is_persistent(&self) -> bool {
        self.contains(ProviderKind::BuildSetting) || self.contains(ProviderKind::Condition)
    }
}

impl From<Vec<Provider>> for TargetInfo {
    fn from(providers: Vec<Provider>) -> Self {
        TargetInfo::new(providers)
    }
}

impl From<TargetInfo> for Vec<Provider> {
    fn from(info: TargetInfo) -> Self {
        info.providers.into_values().collect()
    }
}
