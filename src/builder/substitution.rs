//! `$(location)` and make variable substitution in command templates.
//!
//! Templates are scanned left to right for `$`. `$$` is a literal `$`, a
//! single following character is a one-letter variable, and `$(...)` /
//! `${...}` delimit an expression whose body is expanded innermost first
//! before being handed to the resolver.
//!
//! Location and make variable substitution are resolved independently; a
//! single nested expression mixing both is not guaranteed to be meaningful,
//! since locations of unavailable targets become CMake generator expressions.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::builder::context::AnalysisContext;
use crate::builder::error::{AnalysisError, SubstitutionError};
use crate::builder::toolchain::get_toolchain_substitutions;
use crate::core::cmake_target::CMakeTarget;
use crate::core::label::TargetId;
use crate::util::fs::to_posix;
use crate::util::quote::quote_string;

/// Make variable name → replacement text.
pub type MakeVariables = BTreeMap<String, String>;

/// Deepest `$(...)` nesting accepted in a template.
pub const MAX_NESTING_DEPTH: usize = 32;

const LOCATION_KEYS: [&str; 6] = [
    "location",
    "locations",
    "execpath",
    "execpaths",
    "rootpath",
    "rootpaths",
];

fn location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\((location|locations|execpath|execpaths|rootpath|rootpaths)\s+([^)]+)\)")
            .expect("location regex is valid")
    })
}

/// How a `$` expression was delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `$X`
    Bare,
    /// `$(...)`
    Paren,
    /// `${...}`
    Brace,
}

/// Rewrite every `$` expression of `template` through `replace`.
///
/// Nested expressions inside a delimited body are expanded first. An
/// unbalanced `$(` extends to the end of the template and a trailing `$` is
/// kept as-is.
pub fn do_variable_replacement<E, F>(template: &str, mut replace: F) -> Result<String, E>
where
    E: From<SubstitutionError>,
    F: FnMut(Delimiter, &str) -> Result<String, E>,
{
    expand(template, template, 0, &mut replace)
}

fn expand<E, F>(template: &str, text: &str, depth: usize, replace: &mut F) -> Result<String, E>
where
    E: From<SubstitutionError>,
    F: FnMut(Delimiter, &str) -> Result<String, E>,
{
    if depth > MAX_NESTING_DEPTH {
        return Err(SubstitutionError::TooDeeplyNested {
            template: template.to_string(),
            limit: MAX_NESTING_DEPTH,
        }
        .into());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(i) = rest.find('$') {
        out.push_str(&rest[..i]);
        let after = &rest[i + 1..];
        let Some(c) = after.chars().next() else {
            out.push('$');
            rest = "";
            break;
        };
        match c {
            '$' => {
                out.push('$');
                rest = &after[1..];
            }
            '(' | '{' => {
                let (delimiter, close) = if c == '(' {
                    (Delimiter::Paren, ')')
                } else {
                    (Delimiter::Brace, '}')
                };
                let (body, remainder) = split_balanced(&after[1..], c, close);
                let body = expand(template, body, depth + 1, replace)?;
                out.push_str(&replace(delimiter, &body)?);
                rest = remainder;
            }
            c => {
                let name = &after[..c.len_utf8()];
                out.push_str(&replace(Delimiter::Bare, name)?);
                rest = &after[c.len_utf8()..];
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Split `s` (just past an opening delimiter) at its matching close.
fn split_balanced(s: &str, open: char, close: char) -> (&str, &str) {
    let mut count = 1usize;
    for (k, c) in s.char_indices() {
        if c == open {
            count += 1;
        } else if c == close {
            count -= 1;
            if count == 0 {
                return (&s[..k], &s[k + close.len_utf8()..]);
            }
        }
    }
    (s, "")
}

/// Rewrite `path` relative to `relative_to` when it lies beneath it.
fn make_relative(path: &str, relative_to: Option<&Path>) -> String {
    match relative_to {
        Some(base) => match Path::new(path).strip_prefix(base) {
            Ok(rel) => to_posix(rel),
            Err(_) => path.to_string(),
        },
        None => path.to_string(),
    }
}

/// Resolve `$(key label)` for the target being analyzed.
///
/// First-party labels must resolve; a third-party label whose TargetInfo is
/// not available becomes a `$<TARGET_FILE:...>` forward reference and its
/// CMake name is added to `add_dependencies` once.
fn get_location_replacement(
    ctx: &mut AnalysisContext<'_>,
    template: &str,
    relative_to: Option<&Path>,
    add_dependencies: &mut Vec<CMakeTarget>,
    key: &str,
    label: &str,
) -> Result<String, AnalysisError> {
    let target = ctx.resolve_target(label.trim())?;

    let info = if ctx.is_first_party(&target) {
        Some(ctx.get_target_info(&target)?)
    } else {
        ctx.get_optional_target_info(&target)?
    };

    let Some(info) = info else {
        let pair = ctx.generate_cmake_target_pair(&target);
        if !add_dependencies.contains(pair.dep()) {
            add_dependencies.push(pair.dep().clone());
        }
        return Ok(format!("$<TARGET_FILE:{}>", pair.target));
    };

    if let Some(paths) = info.files() {
        let rel_paths: Vec<String> = paths
            .iter()
            .map(|p| make_relative(p, relative_to))
            .collect();
        if !key.ends_with('s') {
            if rel_paths.len() != 1 {
                return Err(SubstitutionError::ExpectedSingleFile {
                    template: template.to_string(),
                    key: key.to_string(),
                    label: target.as_label(),
                    paths: rel_paths,
                }
                .into());
            }
            return Ok(quote_string(&rel_paths[0]));
        }
        return Ok(rel_paths
            .iter()
            .map(|p| quote_string(p))
            .collect::<Vec<_>>()
            .join(" "));
    }

    if let Some(cmake_target) = info.executable_target().or(info.link_libraries()) {
        return Ok(format!("$<TARGET_FILE:{}>", cmake_target));
    }

    Err(SubstitutionError::NoUsableProvider {
        template: template.to_string(),
        key: key.to_string(),
        label: target.as_label(),
    }
    .into())
}

fn split_location(body: &str) -> Option<(&str, &str)> {
    let (key, label) = body.split_once(|c: char| c.is_whitespace())?;
    if !LOCATION_KEYS.contains(&key) {
        return None;
    }
    let label = label.trim_start();
    (!label.is_empty()).then_some((key, label))
}

fn apply_substitutions_impl(
    ctx: &mut AnalysisContext<'_>,
    template: &str,
    relative_to: Option<&Path>,
    add_dependencies: Option<&mut Vec<CMakeTarget>>,
    substitutions: &MakeVariables,
    toolchains: &[TargetId],
    enable_location: bool,
) -> Result<String, AnalysisError> {
    let substitutions = get_toolchain_substitutions(ctx, toolchains, substitutions)?;
    let mut scratch = Vec::new();
    let add_dependencies = add_dependencies.unwrap_or(&mut scratch);

    do_variable_replacement(template, |delimiter, name| {
        if delimiter == Delimiter::Brace {
            // `${...}` is not substitutable; it resolves to nothing.
            tracing::warn!("`${{{}}}` in {:?} expands to an empty string", name, template);
            return Ok(String::new());
        }
        if delimiter == Delimiter::Paren && enable_location {
            if let Some((key, label)) = split_location(name) {
                return get_location_replacement(
                    ctx,
                    template,
                    relative_to,
                    add_dependencies,
                    key,
                    label,
                );
            }
        }
        substitutions.get(name).cloned().ok_or_else(|| {
            SubstitutionError::UndefinedVariable {
                name: name.to_string(),
                template: template.to_string(),
            }
            .into()
        })
    })
}

/// Apply make variable substitutions only.
pub fn apply_make_variable_substitutions(
    ctx: &mut AnalysisContext<'_>,
    template: &str,
    substitutions: &MakeVariables,
    toolchains: &[TargetId],
) -> Result<String, AnalysisError> {
    apply_substitutions_impl(ctx, template, None, None, substitutions, toolchains, false)
}

/// Apply `$(location)` and make variable substitutions.
pub fn apply_location_and_make_variable_substitutions(
    ctx: &mut AnalysisContext<'_>,
    template: &str,
    relative_to: Option<&Path>,
    add_dependencies: &mut Vec<CMakeTarget>,
    substitutions: &MakeVariables,
    toolchains: &[TargetId],
) -> Result<String, AnalysisError> {
    apply_substitutions_impl(
        ctx,
        template,
        relative_to,
        Some(add_dependencies),
        substitutions,
        toolchains,
        true,
    )
}

/// Substitute only `$(location ...)`-style references, leaving every other
/// `$` untouched.
pub fn apply_location_substitutions(
    ctx: &mut AnalysisContext<'_>,
    template: &str,
    relative_to: Option<&Path>,
    add_dependencies: &mut Vec<CMakeTarget>,
) -> Result<String, AnalysisError> {
    let re = location_regex();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let (Some(whole), Some(key), Some(label)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        out.push_str(&get_location_replacement(
            ctx,
            template,
            relative_to,
            add_dependencies,
            key.as_str(),
            label.as_str(),
        )?);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Built-in make variables of a command-bearing rule.
///
/// `SRCS` are relative to the source directory of the referencing
/// repository; `OUTS` are kept as given. `<` and `@` exist only for a single
/// source or output, and a single output also narrows `@D` to its directory.
pub fn generate_substitutions(
    ctx: &AnalysisContext<'_>,
    target: &TargetId,
    src_files: &[String],
    out_files: &[String],
) -> MakeVariables {
    let source_directory = ctx.source_directory();
    let binary_directory = to_posix(&ctx.binary_directory(&target.repository_id));

    let relative_src_paths: Vec<String> = src_files
        .iter()
        .map(|s| make_relative(s, Some(source_directory.as_path())))
        .collect();
    let package_binary_dir = if target.package_name.is_empty() {
        binary_directory.clone()
    } else {
        format!("{}/{}", binary_directory, target.package_name)
    };
    let quoted_out_files: Vec<String> = out_files.iter().map(|p| quote_string(p)).collect();

    let mut substitutions = MakeVariables::new();
    substitutions.insert("GENDIR".into(), binary_directory.clone());
    substitutions.insert("BINDIR".into(), binary_directory);
    substitutions.insert(
        "SRCS".into(),
        relative_src_paths
            .iter()
            .map(|p| quote_string(p))
            .collect::<Vec<_>>()
            .join(" "),
    );
    substitutions.insert("OUTS".into(), quoted_out_files.join(" "));
    substitutions.insert("RULEDIR".into(), package_binary_dir.clone());
    substitutions.insert("@D".into(), package_binary_dir);

    if let [src] = relative_src_paths.as_slice() {
        substitutions.insert("<".into(), quote_string(src));
    }
    if let ([out], [quoted]) = (out_files, quoted_out_files.as_slice()) {
        substitutions.insert("@".into(), quoted.clone());
        let dirname = Path::new(out)
            .parent()
            .map(to_posix)
            .unwrap_or_default();
        substitutions.insert("@D".into(), quote_string(&dirname));
    }
    substitutions
}

/// Emulate `$(dirname ARG...)` of the shell; other `$` expressions are
/// passed through unchanged.
pub fn do_bash_command_replacement(template: &str) -> Result<String, SubstitutionError> {
    do_variable_replacement(template, |delimiter, name| match delimiter {
        Delimiter::Bare => Ok(format!("${}", name)),
        Delimiter::Brace => Ok(format!("${{{}}}", name)),
        Delimiter::Paren => {
            let is_dirname = name
                .split_whitespace()
                .next()
                .is_some_and(|command| command.eq_ignore_ascii_case("dirname"));
            if !is_dirname {
                return Ok(format!("$({})", name));
            }
            let words = shlex::split(name.trim()).ok_or_else(|| SubstitutionError::Dirname {
                template: template.to_string(),
                reason: format!("unbalanced quoting in `{}`", name),
            })?;
            dirname(template, &words[1..])
        }
    })
}

fn dirname(template: &str, args: &[String]) -> Result<String, SubstitutionError> {
    if args.is_empty() {
        return Err(SubstitutionError::Dirname {
            template: template.to_string(),
            reason: "missing operand".to_string(),
        });
    }
    Ok(args
        .iter()
        .map(|arg| {
            let head = arg.rfind('/').map(|i| &arg[..=i]).unwrap_or("");
            let trimmed = head.trim_end_matches('/');
            let dir = if trimmed.is_empty() { head } else { trimmed };
            if dir.is_empty() {
                ".".to_string()
            } else {
                dir.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    fn vars(pairs: &[(&str, &str)]) -> MakeVariables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn replace_with(template: &str, table: &MakeVariables) -> Result<String, SubstitutionError> {
        do_variable_replacement(template, |d, name| {
            if d == Delimiter::Brace {
                return Ok(String::new());
            }
            table
                .get(name)
                .cloned()
                .ok_or_else(|| SubstitutionError::UndefinedVariable {
                    name: name.to_string(),
                    template: template.to_string(),
                })
        })
    }

    #[test]
    fn test_dollar_escape_and_single_char() {
        let table = vars(&[("<", "\"a/in.txt\""), ("@", "\"out/o.txt\"")]);
        assert_eq!(
            replace_with("cp $< $@", &table).unwrap(),
            "cp \"a/in.txt\" \"out/o.txt\""
        );
        assert_eq!(replace_with("echo $$HOME", &table).unwrap(), "echo $HOME");
        assert_eq!(replace_with("cost 5$", &table).unwrap(), "cost 5$");
    }

    #[test]
    fn test_nested_innermost_first() {
        let table = vars(&[("NAME", "CC"), ("CC", "gcc")]);
        assert_eq!(replace_with("run $($(NAME))", &table).unwrap(), "run gcc");
    }

    #[test]
    fn test_brace_resolves_to_empty() {
        let table = MakeVariables::new();
        assert_eq!(replace_with("a${X}b", &table).unwrap(), "ab");
    }

    #[test]
    fn test_undefined_variable_names_template() {
        let err = replace_with("echo $(FOO)", &MakeVariables::new()).unwrap_err();
        match err {
            SubstitutionError::UndefinedVariable { name, template } => {
                assert_eq!(name, "FOO");
                assert_eq!(template, "echo $(FOO)");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let template = format!("{}x{}", "$(".repeat(MAX_NESTING_DEPTH + 2), ")".repeat(MAX_NESTING_DEPTH + 2));
        let table = vars(&[("x", "y")]);
        assert!(matches!(
            replace_with(&template, &table),
            Err(SubstitutionError::TooDeeplyNested { .. })
        ));
    }

    #[test]
    fn test_bash_dirname() {
        assert_eq!(
            do_bash_command_replacement("mkdir -p $(dirname a/b/c.txt)").unwrap(),
            "mkdir -p a/b"
        );
        assert_eq!(
            do_bash_command_replacement("$(dirname x.txt \"d/e f.h\")").unwrap(),
            ".\nd"
        );
        assert_eq!(
            do_bash_command_replacement("echo $(pwd) ${HOME} $X").unwrap(),
            "echo $(pwd) ${HOME} $X"
        );
        assert!(do_bash_command_replacement("$(dirname)").is_err());
    }

    #[test]
    fn test_bash_dirname_slashes() {
        assert_eq!(do_bash_command_replacement("$(dirname a//b)").unwrap(), "a");
        assert_eq!(do_bash_command_replacement("$(dirname a/b/)").unwrap(), "a/b");
        assert_eq!(do_bash_command_replacement("$(dirname /x)").unwrap(), "/");
        assert_eq!(do_bash_command_replacement("$(dirname //x)").unwrap(), "//");
    }

    #[test]
    fn test_bash_other_commands_pass_through() {
        assert_eq!(
            do_bash_command_replacement("echo $(echo it's)").unwrap(),
            "echo $(echo it's)"
        );
        assert!(do_bash_command_replacement("$(dirname 'a/b)").is_err());
    }

    #[test]
    fn test_split_location() {
        assert_eq!(split_location("location //a:b"), Some(("location", "//a:b")));
        assert_eq!(split_location("execpaths  :x"), Some(("execpaths", ":x")));
        assert_eq!(split_location("CC"), None);
        assert_eq!(split_location("dirname x"), None);
    }

    #[test]
    fn test_generate_substitutions_single_files() {
        let mut repo = TestRepo::new();
        repo.analyze_with(":gen", |ctx| {
            let target = ctx.target().clone();
            let subs = generate_substitutions(
                ctx,
                &target,
                &["a/in.txt".to_string()],
                &["out/o.txt".to_string()],
            );
            assert_eq!(subs["<"], "\"a/in.txt\"");
            assert_eq!(subs["@"], "\"out/o.txt\"");
            assert_eq!(subs["@D"], "\"out\"");
            assert_eq!(subs["SRCS"], "\"a/in.txt\"");
            assert_eq!(subs["RULEDIR"], "/build/repo/pkg");
            assert_eq!(subs["GENDIR"], "/build/repo");

            let cmd = apply_make_variable_substitutions(ctx, "cp $< $@", &subs, &[])?;
            assert_eq!(cmd, "cp \"a/in.txt\" \"out/o.txt\"");
            Ok(())
        });
    }

    #[test]
    fn test_generate_substitutions_multiple_files() {
        let mut repo = TestRepo::new();
        repo.analyze_with(":gen", |ctx| {
            let target = ctx.target().clone();
            let srcs = vec!["/src/repo/pkg/a.txt".to_string(), "/src/repo/pkg/b.txt".to_string()];
            let outs = vec!["/build/repo/pkg/x".to_string(), "/build/repo/pkg/y".to_string()];
            let subs = generate_substitutions(ctx, &target, &srcs, &outs);
            assert!(!subs.contains_key("<"));
            assert!(!subs.contains_key("@"));
            assert_eq!(subs["SRCS"], "\"pkg/a.txt\" \"pkg/b.txt\"");
            assert_eq!(subs["OUTS"], "\"/build/repo/pkg/x\" \"/build/repo/pkg/y\"");
            assert_eq!(subs["@D"], "/build/repo/pkg");
            Ok(())
        });
    }

    #[test]
    fn test_location_of_available_target() {
        let mut repo = TestRepo::new();
        repo.add_files("@repo//x:lib", &["out/lib.a"]);
        repo.add_files("@repo//x:two", &["out/a", "out/b"]);
        repo.analyze_with(":gen", |ctx| {
            let mut deps = Vec::new();
            let subs = MakeVariables::new();
            let s = apply_location_and_make_variable_substitutions(
                ctx,
                "$(location //x:lib)",
                None,
                &mut deps,
                &subs,
                &[],
            )?;
            assert_eq!(s, "\"out/lib.a\"");

            let s = apply_location_and_make_variable_substitutions(
                ctx,
                "$(locations //x:two)",
                None,
                &mut deps,
                &subs,
                &[],
            )?;
            assert_eq!(s, "\"out/a\" \"out/b\"");

            let err = apply_location_and_make_variable_substitutions(
                ctx,
                "$(location //x:two)",
                None,
                &mut deps,
                &subs,
                &[],
            )
            .unwrap_err();
            assert!(matches!(
                err,
                AnalysisError::Substitution(SubstitutionError::ExpectedSingleFile { ref paths, .. })
                    if paths.len() == 2
            ));
            assert!(deps.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_location_of_unavailable_third_party_target() {
        let mut repo = TestRepo::new();
        repo.analyze_with(":gen", |ctx| {
            let mut deps = Vec::new();
            let s = apply_location_and_make_variable_substitutions(
                ctx,
                "$(location @dep//tools:gen) --in $(execpath @dep//tools:gen)",
                None,
                &mut deps,
                &MakeVariables::new(),
                &[],
            )?;
            assert_eq!(
                s,
                "$<TARGET_FILE:Dep_tools_gen> --in $<TARGET_FILE:Dep_tools_gen>"
            );
            assert_eq!(deps, vec![CMakeTarget::new("Dep::tools_gen")]);
            Ok(())
        });
    }

    #[test]
    fn test_location_of_missing_first_party_target_fails() {
        let mut repo = TestRepo::new();
        repo.analyze_with(":gen", |ctx| {
            let mut deps = Vec::new();
            let err = apply_location_substitutions(ctx, "cat $(location //nope:x)", None, &mut deps)
                .unwrap_err();
            assert!(matches!(err, AnalysisError::UnresolvedDependency { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_location_substitutions_leave_other_variables() {
        let mut repo = TestRepo::new();
        repo.add_files("@repo//x:lib", &["/src/repo/x/lib.h"]);
        repo.analyze_with(":gen", |ctx| {
            let mut deps = Vec::new();
            let s = apply_location_substitutions(
                ctx,
                "-I$(location //x:lib) $(CC)",
                Some(Path::new("/src/repo")),
                &mut deps,
            )?;
            assert_eq!(s, "-I\"x/lib.h\" $(CC)");
            Ok(())
        });
    }

    #[test]
    fn test_location_executable_fallback() {
        let mut repo = TestRepo::new();
        repo.add_executable("@repo//tools:protoc", "repo_tools_protoc");
        repo.analyze_with(":gen", |ctx| {
            let mut deps = Vec::new();
            let s = apply_location_substitutions(ctx, "$(execpath //tools:protoc)", None, &mut deps)?;
            assert_eq!(s, "$<TARGET_FILE:repo_tools_protoc>");
            Ok(())
        });
    }
}
