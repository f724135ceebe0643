//! Evaluation engine and CMake generation.
//!
//! This module loads BUILD files, analyzes targets through the rule handlers
//! and assembles the generated CMake script.

pub mod context;
pub mod error;
pub mod evaluation;
mod interpreter;
pub mod output;
pub mod rules;
pub mod substitution;
pub mod toolchain;

pub use context::{AnalysisContext, LoadContext};
pub use error::{AnalysisError, SubstitutionError, TargetError};
pub use evaluation::{EvaluationState, RuleDecl};
pub use output::CMakeBuilder;
pub use rules::{Handler, RuleRegistry};
