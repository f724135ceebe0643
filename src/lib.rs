//! bazel-to-cmake - translate Bazel BUILD files into a CMake build script
//!
//! This crate provides the library behind the `bazel-to-cmake` binary:
//! label handling, the BUILD-file evaluator, the rule handlers that emit
//! CMake, and the translation driver.

pub mod builder;
pub mod core;
pub mod ops;
pub mod starlark;
pub mod util;

/// In-memory evaluation fixtures for unit tests.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{CMakeTargetPair, TargetId, TargetInfo, Workspace};
pub use crate::ops::{translate, TranslateError, TranslateOptions, TranslateOutcome};
