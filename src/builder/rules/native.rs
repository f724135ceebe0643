//! Builtins of the native library that are not C++ rules.

use crate::builder::context::{AnalysisContext, LoadContext};
use crate::builder::error::AnalysisError;
use crate::builder::evaluation::RuleDecl;
use crate::builder::rules::trait_def::{CallArgs, Handler};
use crate::core::provider::{Provider, TargetInfo};
use crate::starlark::Value;

/// Accepts any arguments and declares nothing.
pub struct NoOp;

impl Handler for NoOp {
    fn invoke(&self, _ctx: &mut LoadContext<'_>, _args: CallArgs) -> Result<Value, AnalysisError> {
        Ok(Value::None)
    }
}

/// `filegroup(name, srcs)`
pub struct Filegroup;

impl Handler for Filegroup {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        let srcs = ctx.attr_labels(rule, "srcs")?;
        let mut deps = Vec::new();
        let paths = ctx.collect_files(&srcs, &mut deps)?;
        let mut info = TargetInfo::new([Provider::Files { paths }]);
        if !deps.is_empty() {
            info = info.with(Provider::CMakeDeps { targets: deps });
        }
        Ok(info)
    }
}

/// `alias(name, actual)`
pub struct Alias;

impl Handler for Alias {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        let actual = ctx
            .attr_label(rule, "actual")?
            .ok_or_else(|| AnalysisError::invalid_attribute("actual", "missing"))?;
        ctx.get_target_info(&actual)
    }
}

/// `glob(include, exclude = [])`
pub struct Glob;

impl Handler for Glob {
    fn invoke(&self, ctx: &mut LoadContext<'_>, args: CallArgs) -> Result<Value, AnalysisError> {
        let include = args.string_list(0, "include")?;
        let exclude = args.string_list(1, "exclude")?;
        let files = ctx.glob(&include, &exclude)?;
        Ok(Value::List(files.into_iter().map(Value::Str).collect()))
    }
}

/// `select({condition: value, ...})`, resolved during analysis.
pub struct Select;

impl Handler for Select {
    fn invoke(&self, _ctx: &mut LoadContext<'_>, args: CallArgs) -> Result<Value, AnalysisError> {
        let Some(Value::Dict(entries)) = args.arg(0, "x") else {
            return Err(AnalysisError::invalid_attribute(
                "select",
                "expected a dict of condition labels",
            ));
        };
        let mut branches = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let Value::Str(condition) = key else {
                return Err(AnalysisError::invalid_attribute(
                    "select",
                    format!("condition must be a string, got {}", key.type_name()),
                ));
            };
            branches.push((condition.clone(), value.clone()));
        }
        Ok(Value::Select(branches))
    }
}

/// `package_name()`
pub struct PackageName;

impl Handler for PackageName {
    fn invoke(&self, ctx: &mut LoadContext<'_>, _args: CallArgs) -> Result<Value, AnalysisError> {
        Ok(Value::Str(ctx.package_id().package_name.clone()))
    }
}

/// `repository_name()`
pub struct RepositoryName;

impl Handler for RepositoryName {
    fn invoke(&self, ctx: &mut LoadContext<'_>, _args: CallArgs) -> Result<Value, AnalysisError> {
        Ok(Value::Str(ctx.package_id().repository_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::label::TargetId;
    use crate::test_support::TestRepo;

    #[test]
    fn test_filegroup_and_alias() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            r#"
exports_files(["a.txt"])
filegroup(name = "files", srcs = ["a.txt", "b.txt"])
alias(name = "files_alias", actual = ":files")
"#,
        );
        let info = state
            .get_target_info(&TargetId::parse("@repo//pkg:files_alias").unwrap())
            .unwrap();
        assert_eq!(
            info.files().unwrap(),
            &["/src/repo/pkg/a.txt".to_string(), "/src/repo/pkg/b.txt".to_string()]
        );
        assert!(state.errors().is_empty());
    }

    #[test]
    fn test_package_and_repository_name() {
        let mut repo = TestRepo::new();
        repo.load_with("a/b", |ctx| {
            let package = PackageName.invoke(ctx, CallArgs::default()).unwrap();
            let repository = RepositoryName.invoke(ctx, CallArgs::default()).unwrap();
            assert_eq!(package, Value::Str("a/b".into()));
            assert_eq!(repository, Value::Str("@repo".into()));
        });
    }

    #[test]
    fn test_select_requires_dict() {
        let mut repo = TestRepo::new();
        repo.load_with("pkg", |ctx| {
            let args = CallArgs {
                positional: vec![Value::List(vec![])],
                keywords: vec![],
            };
            assert!(Select.invoke(ctx, args).is_err());
        });
    }
}
