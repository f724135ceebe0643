//! Optional `@rules_proto` support.
//!
//! Only `proto_library` declares anything; the toolchain rules have no CMake
//! counterpart and are accepted without effect.

use std::rc::Rc;

use crate::builder::context::{AnalysisContext, LoadContext};
use crate::builder::error::AnalysisError;
use crate::builder::evaluation::RuleDecl;
use crate::builder::rules::native::NoOp;
use crate::builder::rules::registry::RuleRegistry;
use crate::builder::rules::trait_def::{CallArgs, Handler};
use crate::core::provider::{Provider, TargetInfo};
use crate::starlark::Value;

pub const RULES_PROTO_DEFS: &str = "@rules_proto//proto:defs.bzl";
pub const RULES_PROTO_TOOLCHAIN: &str = "@rules_proto//proto:proto_toolchain.bzl";
pub const RULES_PROTO_TOOLCHAINS: &str = "@rules_proto//proto:toolchains.bzl";
pub const RULES_PROTO_LANG_TOOLCHAIN: &str = "@rules_proto//proto:proto_lang_toolchain.bzl";

pub fn register(registry: &mut RuleRegistry) {
    let noop: Rc<dyn Handler> = Rc::new(NoOp);
    let ignored: Rc<dyn Handler> = Rc::new(IgnoredValue);

    registry.register(RULES_PROTO_DEFS, "proto_library", Rc::new(ProtoLibrary));
    registry.register(RULES_PROTO_DEFS, "proto_descriptor_set", Rc::clone(&noop));
    registry.register(RULES_PROTO_DEFS, "proto_lang_toolchain", Rc::clone(&ignored));
    registry.register(RULES_PROTO_DEFS, "ProtoInfo", ignored);
    registry.register(RULES_PROTO_TOOLCHAIN, "proto_toolchain", Rc::clone(&noop));
    registry.register(RULES_PROTO_TOOLCHAINS, "proto_toolchains", Rc::clone(&noop));
    registry.register(RULES_PROTO_LANG_TOOLCHAIN, "proto_lang_toolchain", noop);
}

/// Returns an inert value that absorbs further use.
struct IgnoredValue;

impl Handler for IgnoredValue {
    fn invoke(&self, _ctx: &mut LoadContext<'_>, _args: CallArgs) -> Result<Value, AnalysisError> {
        Ok(Value::Ignored)
    }
}

/// `proto_library(name, srcs, deps)`
struct ProtoLibrary;

impl Handler for ProtoLibrary {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        for dep in ctx.attr_labels(rule, "deps")? {
            if ctx.is_first_party(&dep) {
                ctx.get_target_info(&dep)?;
            }
        }
        let srcs = ctx.attr_labels(rule, "srcs")?;
        let paths = ctx.get_file_paths(&srcs)?;
        Ok(TargetInfo::new([Provider::Files { paths }]))
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::error::AnalysisError;
    use crate::core::label::TargetId;
    use crate::test_support::TestRepo;

    const BUILD: &str = r#"
load("@rules_proto//proto:defs.bzl", "proto_library", "proto_descriptor_set", "proto_lang_toolchain")
proto_library(name = "api_proto", srcs = ["api.proto"])
proto_descriptor_set(name = "descriptors", deps = [":api_proto"])
proto_lang_toolchain(name = "cc_toolchain", command_line = "--cpp_out=$(OUT)")
"#;

    #[test]
    fn test_proto_library_with_module() {
        let mut repo = TestRepo::new();
        repo.enable_module("rules_proto");
        let state = repo.load("proto", BUILD);
        assert!(state.errors().is_empty(), "{:?}", state.errors());
        assert_eq!(state.targets_to_analyze().len(), 1);

        let info = state
            .get_target_info(&TargetId::parse("@repo//proto:api_proto").unwrap())
            .unwrap();
        assert_eq!(info.files().unwrap(), &["/src/repo/proto/api.proto".to_string()]);
    }

    #[test]
    fn test_proto_library_without_module() {
        let mut repo = TestRepo::new();
        let state = repo.load("proto", BUILD);
        assert_eq!(state.errors().len(), 3);
        assert!(state
            .errors()
            .iter()
            .all(|e| matches!(e.error, AnalysisError::UnknownRule { .. })));
        assert!(state.targets_to_analyze().is_empty());
    }
}
