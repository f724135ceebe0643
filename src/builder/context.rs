//! Contexts handed to rule handlers.
//!
//! [`LoadContext`] is used while a BUILD file is evaluated and can declare
//! targets. [`AnalysisContext`] is used while one target is analyzed and can
//! analyze dependencies, evaluate `select()` and emit CMake text.

use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::builder::error::AnalysisError;
use crate::builder::evaluation::{EvaluationState, RuleDecl};
use crate::builder::output::DEFAULT_SECTION;
use crate::builder::rules::trait_def::{string_list, CallArgs};
use crate::core::cmake_target::{CMakeTarget, CMakeTargetPair};
use crate::core::label::{PackageId, TargetId};
use crate::core::provider::TargetInfo;
use crate::core::workspace::Workspace;
use crate::starlark::{SymbolRef, Value};
use crate::util::fs::{glob_files, relative_path, to_posix};

/// Condition label that matches when nothing else does.
const DEFAULT_CONDITION: &str = "//conditions:default";

fn is_default_condition(label: &str) -> bool {
    label == DEFAULT_CONDITION || label.ends_with(DEFAULT_CONDITION)
}

/// Context for handler calls made while a BUILD file is loaded.
pub struct LoadContext<'a> {
    state: &'a mut EvaluationState,
    package_id: PackageId,
    build_file: PathBuf,
    symbol: SymbolRef,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn new(
        state: &'a mut EvaluationState,
        package_id: PackageId,
        build_file: PathBuf,
        symbol: SymbolRef,
    ) -> Self {
        LoadContext {
            state,
            package_id,
            build_file,
            symbol,
        }
    }

    pub fn package_id(&self) -> &PackageId {
        &self.package_id
    }

    pub fn build_file(&self) -> &Path {
        &self.build_file
    }

    /// The symbol being invoked.
    pub fn symbol(&self) -> &SymbolRef {
        &self.symbol
    }

    pub fn workspace(&self) -> &Workspace {
        self.state.workspace()
    }

    /// Source directory of the package being loaded.
    pub fn source_package_dir(&self) -> PathBuf {
        join_package(self.state.source_directory(), &self.package_id.package_name)
    }

    /// Declare a target of the invoked rule from keyword arguments.
    ///
    /// `name` names the target; every other keyword is kept unevaluated as
    /// an attribute so `select()` can be resolved during analysis.
    pub fn declare_rule(&mut self, args: CallArgs) -> Result<TargetId, AnalysisError> {
        if !args.positional.is_empty() {
            return Err(AnalysisError::invalid_attribute(
                "*args",
                format!("`{}` only accepts keyword arguments", self.symbol.symbol),
            ));
        }
        let mut name = None;
        let mut attrs = std::collections::BTreeMap::new();
        for (key, value) in args.keywords {
            if key == "name" {
                match value {
                    Value::Str(s) if !s.is_empty() => name = Some(s),
                    other => {
                        return Err(AnalysisError::invalid_attribute(
                            "name",
                            format!("expected non-empty string, got {}", other.type_name()),
                        ))
                    }
                }
            } else if attrs.insert(key.clone(), value).is_some() {
                return Err(AnalysisError::invalid_attribute(
                    key,
                    "argument given more than once",
                ));
            }
        }
        let name = name.ok_or_else(|| {
            AnalysisError::invalid_attribute(
                "name",
                format!("`{}` requires a name", self.symbol.symbol),
            )
        })?;
        let target = self.package_id.get_target_id(name);
        self.state.add_rule(RuleDecl {
            target: target.clone(),
            symbol: self.symbol.clone(),
            attrs,
            build_file: self.build_file.clone(),
        })?;
        Ok(target)
    }

    /// Expand `glob()` patterns relative to the package directory.
    ///
    /// Files inside subpackages (directories with their own BUILD file) are
    /// not matched. Results are package-relative and sorted.
    pub fn glob(&self, include: &[String], exclude: &[String]) -> Result<Vec<String>, AnalysisError> {
        let package_dir = self.source_package_dir();
        let exclude: Vec<Pattern> = exclude
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| AnalysisError::invalid_attribute("exclude", e.to_string()))
            })
            .collect::<Result<_, _>>()?;

        let matches = glob_files(&package_dir, include)?;
        let mut result = Vec::new();
        for path in matches {
            let rel = to_posix(&relative_path(&package_dir, &path));
            if exclude.iter().any(|p| p.matches(&rel)) {
                continue;
            }
            if in_subpackage(&package_dir, &path) {
                continue;
            }
            result.push(rel);
        }
        Ok(result)
    }
}

/// Whether a directory strictly between `package_dir` and `path` holds a
/// BUILD file.
fn in_subpackage(package_dir: &Path, path: &Path) -> bool {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == package_dir || !d.starts_with(package_dir) {
            return false;
        }
        if d.join("BUILD").is_file() || d.join("BUILD.bazel").is_file() {
            return true;
        }
        dir = d.parent();
    }
    false
}

fn join_package(root: &Path, package_name: &str) -> PathBuf {
    if package_name.is_empty() {
        root.to_path_buf()
    } else {
        root.join(package_name)
    }
}

/// Context for analyzing one target.
pub struct AnalysisContext<'a> {
    state: &'a mut EvaluationState,
    target: TargetId,
}

impl<'a> AnalysisContext<'a> {
    pub(crate) fn new(state: &'a mut EvaluationState, target: TargetId) -> Self {
        AnalysisContext { state, target }
    }

    /// The target being analyzed.
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn package_id(&self) -> PackageId {
        self.target.package_id()
    }

    pub fn workspace(&self) -> &Workspace {
        self.state.workspace()
    }

    /// Resolve a label written in the analyzed target's package.
    pub fn resolve_target(&self, label: &str) -> Result<TargetId, AnalysisError> {
        Ok(self.state.resolve_target(&self.package_id(), label)?)
    }

    /// Whether `target` belongs to the repository being translated.
    pub fn is_first_party(&self, target: &TargetId) -> bool {
        target.repository_id == self.target.repository_id
    }

    /// Analyze `target`; it must be declared (or persisted).
    pub fn get_target_info(&mut self, target: &TargetId) -> Result<TargetInfo, AnalysisError> {
        self.state.get_target_info(target)
    }

    /// Analyze `target` if it is available in this invocation.
    pub fn get_optional_target_info(
        &mut self,
        target: &TargetId,
    ) -> Result<Option<TargetInfo>, AnalysisError> {
        self.state.get_optional_target_info(target)
    }

    pub fn generate_cmake_target_pair(&mut self, target: &TargetId) -> CMakeTargetPair {
        self.state.generate_cmake_target_pair(target)
    }

    pub fn is_ignored_library(&self, target: &TargetId) -> bool {
        self.state.workspace().is_ignored_library(target)
    }

    /// Source directory of the repository being translated.
    pub fn source_directory(&self) -> PathBuf {
        self.state.source_directory().to_path_buf()
    }

    /// Source directory of the analyzed target's package.
    pub fn source_package_dir(&self) -> PathBuf {
        join_package(self.state.source_directory(), &self.target.package_name)
    }

    /// CMake binary directory of a repository.
    pub fn binary_directory(&self, repository_id: &crate::core::label::RepositoryId) -> PathBuf {
        self.state.binary_directory(repository_id)
    }

    /// CMake binary directory of the analyzed target's package.
    pub fn binary_package_dir(&self) -> PathBuf {
        join_package(
            &self.binary_directory(&self.target.repository_id),
            &self.target.package_name,
        )
    }

    /// Path of a source file named by `target`.
    pub fn source_file_path(&self, target: &TargetId) -> PathBuf {
        let root = self
            .state
            .workspace()
            .repository(&target.repository_id)
            .map(|r| r.source_directory.clone())
            .unwrap_or_else(|| self.source_directory());
        join_package(&root, &target.package_name).join(&target.target_name)
    }

    /// Resolve a list of labels to file paths.
    ///
    /// Declared targets contribute their `Files`; other first-party labels
    /// name source files. Third-party labels that are not available are
    /// skipped.
    pub fn get_file_paths(&mut self, targets: &[TargetId]) -> Result<Vec<String>, AnalysisError> {
        let mut scratch = Vec::new();
        self.collect_files(targets, &mut scratch)
    }

    /// Like [`AnalysisContext::get_file_paths`], also collecting the CMake
    /// targets that produce the files into `deps`.
    pub fn collect_files(
        &mut self,
        targets: &[TargetId],
        deps: &mut Vec<CMakeTarget>,
    ) -> Result<Vec<String>, AnalysisError> {
        let mut paths = Vec::new();
        for target in targets {
            if let Some(info) = self.get_optional_target_info(target)? {
                paths.extend(info.files().unwrap_or_default().iter().cloned());
                for dep in info.cmake_deps() {
                    if !deps.contains(dep) {
                        deps.push(dep.clone());
                    }
                }
            } else if self.is_first_party(target)
                || self.workspace().repository(&target.repository_id).is_some()
            {
                paths.push(to_posix(&self.source_file_path(target)));
            } else {
                tracing::debug!("{}: skipping unavailable file {}", self.target, target);
            }
        }
        Ok(paths)
    }

    /// Append CMake text to the rule-body section.
    pub fn emit(&mut self, text: impl AsRef<str>) {
        self.state.builder_mut().addtext(text, DEFAULT_SECTION);
    }

    /// Append CMake text to a specific section.
    pub fn emit_section(&mut self, text: impl AsRef<str>, section: i32) {
        self.state.builder_mut().addtext(text, section);
    }

    /// Resolve every `select()` in `value`.
    pub fn evaluate(&mut self, value: &Value) -> Result<Value, AnalysisError> {
        match value {
            Value::Select(branches) => {
                let chosen = self.select(branches)?;
                self.evaluate(&chosen)
            }
            Value::Concat(parts) => {
                let mut acc: Option<Value> = None;
                for part in parts {
                    let v = self.evaluate(part)?;
                    acc = Some(match acc {
                        None => v,
                        Some(a) => a.add(v).map_err(AnalysisError::other)?,
                    });
                }
                Ok(acc.unwrap_or(Value::None))
            }
            Value::List(items) => Ok(Value::List(self.evaluate_all(items)?)),
            Value::Tuple(items) => Ok(Value::Tuple(self.evaluate_all(items)?)),
            Value::Dict(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((self.evaluate(k)?, self.evaluate(v)?));
                }
                Ok(Value::Dict(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn evaluate_all(&mut self, items: &[Value]) -> Result<Vec<Value>, AnalysisError> {
        items.iter().map(|v| self.evaluate(v)).collect()
    }

    fn select(&mut self, branches: &[(String, Value)]) -> Result<Value, AnalysisError> {
        let mut default = None;
        for (condition, value) in branches {
            if is_default_condition(condition) {
                default = Some(value);
                continue;
            }
            let target = self.resolve_target(condition)?;
            if self.evaluate_condition(&target)? {
                return Ok(value.clone());
            }
        }
        default.cloned().ok_or_else(|| {
            let conditions: Vec<&str> = branches.iter().map(|(c, _)| c.as_str()).collect();
            AnalysisError::invalid_attribute(
                "select",
                format!("no condition matched among [{}]", conditions.join(", ")),
            )
        })
    }

    /// Whether a `config_setting` or platform constraint holds.
    pub fn evaluate_condition(&mut self, target: &TargetId) -> Result<bool, AnalysisError> {
        match self.get_optional_target_info(target)? {
            Some(info) => info.condition().ok_or_else(|| {
                AnalysisError::invalid_attribute(
                    "select",
                    format!("`{}` is not a condition", target),
                )
            }),
            None if self.is_first_party(target) => Err(AnalysisError::UnresolvedDependency {
                target: target.clone(),
            }),
            None => Ok(self.workspace().has_constraint(target)),
        }
    }

    /// Evaluated attribute value; `None` when absent or `None`.
    pub fn attr(&mut self, rule: &RuleDecl, name: &str) -> Result<Option<Value>, AnalysisError> {
        match rule.attrs.get(name) {
            None => Ok(None),
            Some(value) => match self.evaluate(value)? {
                Value::None => Ok(None),
                v => Ok(Some(v)),
            },
        }
    }

    pub fn attr_string(&mut self, rule: &RuleDecl, name: &str) -> Result<Option<String>, AnalysisError> {
        match self.attr(rule, name)? {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(other) => Err(AnalysisError::invalid_attribute(
                name,
                format!("expected string, got {}", other.type_name()),
            )),
        }
    }

    pub fn attr_string_list(&mut self, rule: &RuleDecl, name: &str) -> Result<Vec<String>, AnalysisError> {
        match self.attr(rule, name)? {
            None => Ok(Vec::new()),
            Some(value) => string_list(name, &value),
        }
    }

    pub fn attr_bool(&mut self, rule: &RuleDecl, name: &str, default: bool) -> Result<bool, AnalysisError> {
        match self.attr(rule, name)? {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(b),
            Some(Value::Int(v)) => Ok(v != 0),
            Some(other) => Err(AnalysisError::invalid_attribute(
                name,
                format!("expected bool, got {}", other.type_name()),
            )),
        }
    }

    pub fn attr_label(&mut self, rule: &RuleDecl, name: &str) -> Result<Option<TargetId>, AnalysisError> {
        match self.attr_string(rule, name)? {
            None => Ok(None),
            Some(label) => Ok(Some(self.resolve_target(&label)?)),
        }
    }

    pub fn attr_labels(&mut self, rule: &RuleDecl, name: &str) -> Result<Vec<TargetId>, AnalysisError> {
        self.attr_string_list(rule, name)?
            .iter()
            .map(|label| self.resolve_target(label))
            .collect()
    }

    /// A `dict` attribute with string keys and values, in written order.
    pub fn attr_string_dict(
        &mut self,
        rule: &RuleDecl,
        name: &str,
    ) -> Result<Vec<(String, String)>, AnalysisError> {
        match self.attr(rule, name)? {
            None => Ok(Vec::new()),
            Some(Value::Dict(entries)) => entries
                .into_iter()
                .map(|(k, v)| match (k, v) {
                    (Value::Str(k), Value::Str(v)) => Ok((k, v)),
                    (k, v) => Err(AnalysisError::invalid_attribute(
                        name,
                        format!(
                            "expected string to string dict, got {}: {}",
                            k.type_name(),
                            v.type_name()
                        ),
                    )),
                })
                .collect(),
            Some(other) => Err(AnalysisError::invalid_attribute(
                name,
                format!("expected dict, got {}", other.type_name()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn test_is_default_condition() {
        assert!(is_default_condition("//conditions:default"));
        assert!(is_default_condition("@bazel_tools//conditions:default"));
        assert!(!is_default_condition("//conditions:other"));
    }

    #[test]
    fn test_select_on_platform_constraint() {
        let mut repo = TestRepo::new();
        repo.workspace_mut()
            .add_value("constraint", "@platforms//os:linux");
        repo.analyze_with(":x", |ctx| {
            let v = Value::Select(vec![
                ("@platforms//os:windows".into(), Value::Str("win".into())),
                ("@platforms//os:linux".into(), Value::Str("linux".into())),
                (DEFAULT_CONDITION.into(), Value::Str("other".into())),
            ]);
            assert_eq!(ctx.evaluate(&v)?, Value::Str("linux".into()));
            Ok(())
        });
    }

    #[test]
    fn test_select_concat_and_default() {
        let mut repo = TestRepo::new();
        repo.analyze_with(":x", |ctx| {
            let v = Value::Concat(vec![
                Value::List(vec![Value::Str("a".into())]),
                Value::Select(vec![
                    ("@platforms//os:ios".into(), Value::List(vec![Value::Str("ios".into())])),
                    (DEFAULT_CONDITION.into(), Value::List(vec![Value::Str("b".into())])),
                ]),
            ]);
            assert_eq!(
                ctx.evaluate(&v)?,
                Value::List(vec![Value::Str("a".into()), Value::Str("b".into())])
            );
            Ok(())
        });
    }

    #[test]
    fn test_select_without_match_fails() {
        let mut repo = TestRepo::new();
        repo.analyze_with(":x", |ctx| {
            let v = Value::Select(vec![(
                "@platforms//os:ios".into(),
                Value::Str("ios".into()),
            )]);
            assert!(matches!(
                ctx.evaluate(&v),
                Err(AnalysisError::InvalidAttribute { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn test_glob_skips_subpackages_and_excludes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pkg = tmp.path().join("pkg");
        std::fs::create_dir_all(pkg.join("sub")).unwrap();
        std::fs::create_dir_all(pkg.join("inner")).unwrap();
        std::fs::write(pkg.join("a.cc"), "").unwrap();
        std::fs::write(pkg.join("a_test.cc"), "").unwrap();
        std::fs::write(pkg.join("inner/b.cc"), "").unwrap();
        std::fs::write(pkg.join("sub/BUILD"), "").unwrap();
        std::fs::write(pkg.join("sub/c.cc"), "").unwrap();

        let mut repo = TestRepo::with_source_dir(tmp.path());
        repo.load_with("pkg", |ctx| {
            let files = ctx
                .glob(&["**/*.cc".to_string()], &["*_test.cc".to_string()])
                .unwrap();
            assert_eq!(files, vec!["a.cc", "inner/b.cc"]);
        });
    }
}
