//! Handler trait definition and call arguments.
//!
//! A handler is what a BUILD-file symbol resolves to. It is invoked while the
//! file is loaded and, for rules, invoked again when the declared target is
//! analyzed.

use crate::builder::context::{AnalysisContext, LoadContext};
use crate::builder::error::AnalysisError;
use crate::builder::evaluation::RuleDecl;
use crate::core::provider::TargetInfo;
use crate::starlark::Value;

/// Evaluated arguments of a call expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    /// Get a keyword argument by name.
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Get an argument given either at `index` or as keyword `name`.
    pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keyword(name))
    }

    /// Get a string-list argument, accepting a list or tuple of strings.
    pub fn string_list(&self, index: usize, name: &str) -> Result<Vec<String>, AnalysisError> {
        match self.arg(index, name) {
            None | Some(Value::None) => Ok(Vec::new()),
            Some(value) => string_list(name, value),
        }
    }
}

/// Interpret `value` as a list of strings.
pub fn string_list(attribute: &str, value: &Value) -> Result<Vec<String>, AnalysisError> {
    match value {
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Value::Str(s) => Ok(s.clone()),
                other => Err(AnalysisError::invalid_attribute(
                    attribute,
                    format!("expected string, got {}", other.type_name()),
                )),
            })
            .collect(),
        other => Err(AnalysisError::invalid_attribute(
            attribute,
            format!("expected list of strings, got {}", other.type_name()),
        )),
    }
}

/// A callable BUILD-file symbol.
pub trait Handler {
    /// Evaluate a call from a BUILD file.
    ///
    /// Rules declare a target named by the `name` keyword and return `None`.
    fn invoke(&self, ctx: &mut LoadContext<'_>, args: CallArgs) -> Result<Value, AnalysisError> {
        ctx.declare_rule(args)?;
        Ok(Value::None)
    }

    /// Compute the providers of a target declared by [`Handler::invoke`],
    /// emitting its CMake text through `ctx`.
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        let _ = ctx;
        Err(AnalysisError::other(format!(
            "`{}` does not declare analyzable targets",
            rule.symbol
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_args_lookup() {
        let args = CallArgs {
            positional: vec![Value::List(vec![Value::Str("*.cc".into())])],
            keywords: vec![(
                "exclude".into(),
                Value::List(vec![Value::Str("x.cc".into())]),
            )],
        };
        assert_eq!(args.string_list(0, "include").unwrap(), vec!["*.cc"]);
        assert_eq!(args.string_list(1, "exclude").unwrap(), vec!["x.cc"]);
        assert!(args.string_list(2, "missing").unwrap().is_empty());
        assert!(args.keyword("include").is_none());
    }

    #[test]
    fn test_string_list_rejects_non_strings() {
        let err = string_list("srcs", &Value::List(vec![Value::Int(1)])).unwrap_err();
        assert!(err.to_string().contains("srcs"));
    }
}
