//! Errors recorded while loading and analyzing targets.

use std::fmt;

use thiserror::Error;

use crate::core::label::{LabelError, TargetId};
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Failure to rewrite a command template.
#[derive(Debug, Error)]
pub enum SubstitutionError {
    #[error("undefined make variable `{name}` in {template:?}")]
    UndefinedVariable { name: String, template: String },

    #[error("expected single file for `{key}` of `{label}` in {template:?} but received: {paths:?}")]
    ExpectedSingleFile {
        template: String,
        key: String,
        label: String,
        paths: Vec<String>,
    },

    #[error("location replacement failed in {template:?}: `{key}` of `{label}` has no files, executable or library")]
    NoUsableProvider {
        template: String,
        key: String,
        label: String,
    },

    #[error("command template nested deeper than {limit} levels: {template:?}")]
    TooDeeplyNested { template: String, limit: usize },

    #[error("toolchain `{label}` does not provide make variables")]
    MissingToolchainVariables { label: String },

    #[error("cannot apply `dirname` in {template:?}: {reason}")]
    Dirname { template: String, reason: String },
}

/// Failure to load or analyze one target.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("dependency cycle: {}", format_cycle(.path))]
    Cycle { path: Vec<TargetId> },

    #[error("no rule declares `{target}`")]
    UnresolvedDependency { target: TargetId },

    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    #[error("unknown rule `{symbol}` in `{library}`")]
    UnknownRule { library: String, symbol: String },

    #[error("invalid attribute `{attribute}`: {message}")]
    InvalidAttribute { attribute: String, message: String },

    /// A dependency failed; the dependency's own error is recorded separately.
    #[error("dependency `{target}` failed to analyze")]
    DependencyFailed { target: TargetId },

    #[error(transparent)]
    Label(#[from] LabelError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalysisError {
    pub fn invalid_attribute(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        AnalysisError::InvalidAttribute {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    pub fn other(message: impl fmt::Display) -> Self {
        AnalysisError::Other(anyhow::anyhow!("{}", message))
    }
}

fn format_cycle(path: &[TargetId]) -> String {
    path.iter()
        .map(|t| t.as_label())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// An error recorded against a target (or a build file's pseudo-target).
#[derive(Debug)]
pub struct TargetError {
    pub target: TargetId,
    pub error: AnalysisError,
}

impl TargetError {
    pub fn new(target: TargetId, error: AnalysisError) -> Self {
        TargetError { target, error }
    }

    /// Render for the terminal.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(format!("`{}` failed", self.target))
            .with_context(format!("{:#}", self.error));
        let suggestion = match &self.error {
            AnalysisError::Cycle { .. } => Some(suggestions::CYCLE),
            AnalysisError::UnresolvedDependency { .. } => Some(suggestions::UNRESOLVED_DEPENDENCY),
            AnalysisError::UnknownRule { .. } => Some(suggestions::UNKNOWN_RULE),
            AnalysisError::Substitution(SubstitutionError::UndefinedVariable { .. }) => {
                Some(suggestions::UNDEFINED_VARIABLE)
            }
            AnalysisError::Substitution(SubstitutionError::NoUsableProvider { .. }) => {
                Some(suggestions::NO_USABLE_PROVIDER)
            }
            _ => None,
        };
        match suggestion {
            Some(s) => diag.with_suggestion(s),
            None => diag,
        }
    }
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.target, self.error)
    }
}
