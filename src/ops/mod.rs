//! High-level operations.
//!
//! This module contains the implementation of a translation run.

pub mod build_files;
pub mod translate;

pub use build_files::find_build_files;
pub use translate::{translate, TranslateError, TranslateOptions, TranslateOutcome};
