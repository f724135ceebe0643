//! `@bazel_skylib` rules: build settings and `write_file`.

use crate::builder::context::AnalysisContext;
use crate::builder::error::AnalysisError;
use crate::builder::evaluation::RuleDecl;
use crate::builder::rules::trait_def::Handler;
use crate::core::provider::{Provider, SettingValue, TargetInfo};
use crate::starlark::Value;
use crate::util::fs::to_posix;
use crate::util::quote::quote_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Int,
    String,
}

/// `bool_flag`, `int_setting`, `string_flag` and friends.
pub struct BuildSetting {
    pub kind: SettingKind,
}

impl BuildSetting {
    fn coerce(&self, value: Value) -> Result<SettingValue, AnalysisError> {
        match (self.kind, value) {
            (SettingKind::Bool, Value::Bool(b)) => Ok(SettingValue::Bool(b)),
            (SettingKind::Int, Value::Int(v)) => Ok(SettingValue::Int(v)),
            (SettingKind::String, Value::Str(s)) => Ok(SettingValue::String(s)),
            (kind, other) => Err(AnalysisError::invalid_attribute(
                "build_setting_default",
                format!("expected {:?} value, got {}", kind, other.type_name()),
            )),
        }
    }
}

impl Handler for BuildSetting {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        let default = ctx.attr(rule, "build_setting_default")?.ok_or_else(|| {
            AnalysisError::invalid_attribute("build_setting_default", "missing")
        })?;
        let value = self.coerce(default)?;

        if let SettingValue::String(s) = &value {
            let allowed = ctx.attr_string_list(rule, "values")?;
            if !allowed.is_empty() && !allowed.contains(s) {
                return Err(AnalysisError::invalid_attribute(
                    "build_setting_default",
                    format!("`{}` is not one of {:?}", s, allowed),
                ));
            }
        }
        Ok(TargetInfo::new([Provider::BuildSetting { value }]))
    }
}

/// `write_file(name, out, content, newline)`
pub struct WriteFile;

impl Handler for WriteFile {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        let out = ctx
            .attr_string(rule, "out")?
            .ok_or_else(|| AnalysisError::invalid_attribute("out", "missing"))?;
        let content = ctx.attr_string_list(rule, "content")?;
        let newline = match ctx.attr_string(rule, "newline")?.as_deref() {
            None | Some("auto") | Some("unix") => "\n",
            Some("windows") => "\r\n",
            Some(other) => {
                return Err(AnalysisError::invalid_attribute(
                    "newline",
                    format!("unknown value `{}`", other),
                ))
            }
        };

        let path = to_posix(&ctx.binary_package_dir().join(&out));
        let mut text = content.join(newline);
        if !content.is_empty() {
            text.push_str(newline);
        }
        let command = format!(
            "\n# {}\nfile(WRITE {} {})\n",
            ctx.target(),
            quote_string(&path),
            quote_string(&text)
        );
        ctx.emit(command);
        Ok(TargetInfo::new([Provider::Files { paths: vec![path] }]))
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::error::AnalysisError;
    use crate::core::label::TargetId;
    use crate::core::provider::SettingValue;
    use crate::test_support::TestRepo;

    #[test]
    fn test_build_settings() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "cfg",
            r#"
load("@bazel_skylib//rules:common_settings.bzl", "int_setting", "string_flag")
int_setting(name = "level", build_setting_default = 3)
string_flag(name = "mode", build_setting_default = "x", values = ["a", "b"])
"#,
        );
        let info = state
            .get_target_info(&TargetId::parse("@repo//cfg:level").unwrap())
            .unwrap();
        assert_eq!(info.build_setting(), Some(&SettingValue::Int(3)));
        assert!(info.is_persistent());

        state.analyze(&[TargetId::parse("@repo//cfg:mode").unwrap()]);
        assert!(matches!(
            state.errors()[0].error,
            AnalysisError::InvalidAttribute { .. }
        ));
    }

    #[test]
    fn test_write_file() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            r##"
load("@bazel_skylib//rules:write_file.bzl", "write_file")
write_file(name = "cfg", out = "config.h", content = ["#define A 1", "#define B \"b\""])
"##,
        );
        let info = state
            .get_target_info(&TargetId::parse("@repo//pkg:cfg").unwrap())
            .unwrap();
        assert_eq!(info.files().unwrap(), &["/build/repo/pkg/config.h".to_string()]);
        assert!(state.builder().as_text().contains(
            "file(WRITE \"/build/repo/pkg/config.h\" \"#define A 1\\n#define B \\\"b\\\"\\n\")"
        ));
    }
}
