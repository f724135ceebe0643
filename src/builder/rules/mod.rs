//! Rule handlers and the registry that maps BUILD-file symbols to them.

pub mod cc;
pub mod config_setting;
pub mod genrule;
pub mod native;
pub mod registry;
pub mod rules_proto;
pub mod skylib;
pub mod trait_def;

pub use registry::{RuleRegistry, UnknownModule, KNOWN_MODULES, NATIVE_LIBRARY};
pub use trait_def::{CallArgs, Handler};
