//! `config_setting` - named conditions for `select()`.

use crate::builder::context::AnalysisContext;
use crate::builder::error::AnalysisError;
use crate::builder::evaluation::RuleDecl;
use crate::builder::rules::trait_def::Handler;
use crate::core::provider::{Provider, SettingValue, TargetInfo};
use crate::core::workspace::DEFINE_KEY;

pub struct ConfigSetting;

impl Handler for ConfigSetting {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        let value = evaluate(ctx, rule)?;
        tracing::debug!("config_setting {} = {}", ctx.target(), value);
        Ok(TargetInfo::new([Provider::Condition { value }]))
    }
}

fn evaluate(ctx: &mut AnalysisContext<'_>, rule: &RuleDecl) -> Result<bool, AnalysisError> {
    for (key, value) in ctx.attr_string_dict(rule, "values")? {
        if !ctx.workspace().has_value(&key, &value) {
            return Ok(false);
        }
    }

    for (name, value) in ctx.attr_string_dict(rule, "define_values")? {
        if !ctx
            .workspace()
            .has_value(DEFINE_KEY, &format!("{}={}", name, value))
        {
            return Ok(false);
        }
    }

    for (label, expected) in ctx.attr_string_dict(rule, "flag_values")? {
        let flag = ctx.resolve_target(&label)?;
        let info = ctx.get_target_info(&flag)?;
        let setting = info.build_setting().ok_or_else(|| {
            AnalysisError::invalid_attribute(
                "flag_values",
                format!("`{}` is not a build setting", flag),
            )
        })?;
        if !setting_matches(setting, &expected) {
            return Ok(false);
        }
    }

    for constraint in ctx.attr_labels(rule, "constraint_values")? {
        if !ctx.evaluate_condition(&constraint)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn setting_matches(setting: &SettingValue, expected: &str) -> bool {
    match setting {
        SettingValue::Bool(b) => match expected {
            "true" | "True" | "1" => *b,
            "false" | "False" | "0" => !*b,
            _ => false,
        },
        other => other.to_string() == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::label::TargetId;
    use crate::test_support::TestRepo;

    fn condition(repo: &mut TestRepo, label: &str) -> bool {
        let state = repo.state();
        state
            .get_target_info(&TargetId::parse(label).unwrap())
            .unwrap()
            .condition()
            .unwrap()
    }

    #[test]
    fn test_setting_matches() {
        assert!(setting_matches(&SettingValue::Bool(true), "True"));
        assert!(setting_matches(&SettingValue::Bool(false), "0"));
        assert!(setting_matches(&SettingValue::Int(3), "3"));
        assert!(!setting_matches(&SettingValue::String("a".into()), "b"));
    }

    #[test]
    fn test_values_and_defines() {
        let mut repo = TestRepo::new();
        repo.workspace_mut().add_define("with_ssl=1");
        repo.workspace_mut().add_value("compilation_mode", "opt");
        repo.load(
            "cfg",
            r#"
config_setting(name = "opt", values = {"compilation_mode": "opt"})
config_setting(name = "dbg", values = {"compilation_mode": "dbg"})
config_setting(name = "ssl", define_values = {"with_ssl": "1"})
config_setting(name = "ssl_define", values = {"define": "with_ssl=1"})
"#,
        );
        assert!(condition(&mut repo, "@repo//cfg:opt"));
        assert!(!condition(&mut repo, "@repo//cfg:dbg"));
        assert!(condition(&mut repo, "@repo//cfg:ssl"));
        assert!(condition(&mut repo, "@repo//cfg:ssl_define"));
    }

    #[test]
    fn test_flag_values_and_constraints() {
        let mut repo = TestRepo::new();
        repo.workspace_mut()
            .add_value("constraint", "@platforms//os:linux");
        repo.load(
            "cfg",
            r#"
load("@bazel_skylib//rules:common_settings.bzl", "bool_flag", "string_flag")
bool_flag(name = "fast", build_setting_default = True)
string_flag(name = "backend", build_setting_default = "gl")
config_setting(name = "is_fast", flag_values = {":fast": "true"})
config_setting(name = "is_vulkan", flag_values = {":backend": "vulkan"})
config_setting(name = "linux", constraint_values = ["@platforms//os:linux"])
config_setting(name = "windows", constraint_values = ["@platforms//os:windows"])
"#,
        );
        assert!(condition(&mut repo, "@repo//cfg:is_fast"));
        assert!(!condition(&mut repo, "@repo//cfg:is_vulkan"));
        assert!(condition(&mut repo, "@repo//cfg:linux"));
        assert!(!condition(&mut repo, "@repo//cfg:windows"));
    }
}
