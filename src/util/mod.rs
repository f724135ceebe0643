//! Shared utilities

pub mod config;
pub mod diagnostic;
pub mod fs;
pub mod quote;

pub use config::Config;
pub use diagnostic::Diagnostic;
pub use quote::{quote_list, quote_path, quote_string};
