//! `genrule` - shell commands producing files.

use crate::builder::context::AnalysisContext;
use crate::builder::error::AnalysisError;
use crate::builder::evaluation::RuleDecl;
use crate::builder::rules::trait_def::Handler;
use crate::builder::substitution::{
    apply_location_and_make_variable_substitutions, do_bash_command_replacement,
    generate_substitutions,
};
use crate::core::cmake_target::CMakeTarget;
use crate::core::provider::{Provider, TargetInfo};
use crate::util::fs::to_posix;
use crate::util::quote::{quote_list, quote_path, quote_string};

const LIST_SEPARATOR: &str = "\n    ";

pub struct Genrule;

impl Handler for Genrule {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        let target = ctx.target().clone();
        let pair = ctx.generate_cmake_target_pair(&target);

        let mut add_dependencies: Vec<CMakeTarget> = Vec::new();
        let src_labels = ctx.attr_labels(rule, "srcs")?;
        let srcs = ctx.collect_files(&src_labels, &mut add_dependencies)?;

        let package_binary_dir = ctx.binary_package_dir();
        let outs: Vec<String> = ctx
            .attr_string_list(rule, "outs")?
            .iter()
            .map(|out| to_posix(&package_binary_dir.join(out)))
            .collect();
        if outs.is_empty() {
            return Err(AnalysisError::invalid_attribute(
                "outs",
                "genrule must produce at least one file",
            ));
        }

        let cmd = match ctx.attr_string(rule, "cmd_bash")? {
            Some(cmd) => cmd,
            None => ctx
                .attr_string(rule, "cmd")?
                .ok_or_else(|| AnalysisError::invalid_attribute("cmd", "missing"))?,
        };

        for tool in ctx.attr_labels(rule, "tools")? {
            let dep = match ctx.get_optional_target_info(&tool)? {
                Some(info) => info
                    .executable_target()
                    .cloned()
                    .or_else(|| info.cmake_deps().first().cloned()),
                None if ctx.is_first_party(&tool) => None,
                None => Some(ctx.generate_cmake_target_pair(&tool).dep().clone()),
            };
            if let Some(dep) = dep {
                if !add_dependencies.contains(&dep) {
                    add_dependencies.push(dep);
                }
            }
        }

        let toolchains = ctx.attr_labels(rule, "toolchains")?;
        let substitutions = generate_substitutions(ctx, &target, &srcs, &outs);
        let source_directory = ctx.source_directory();
        let cmd = apply_location_and_make_variable_substitutions(
            ctx,
            &cmd,
            Some(source_directory.as_path()),
            &mut add_dependencies,
            &substitutions,
            &toolchains,
        )?;
        let cmd = do_bash_command_replacement(&cmd)?;

        let mut out_dirs: Vec<String> = outs
            .iter()
            .filter_map(|o| o.rsplit_once('/').map(|(dir, _)| dir.to_string()))
            .collect();
        out_dirs.sort();
        out_dirs.dedup();

        let mut depends: Vec<String> = srcs.clone();
        depends.extend(add_dependencies.iter().map(|d| d.as_str().to_string()));

        let mut text = format!("\n# {}\n", target);
        text.push_str(&format!(
            "file(MAKE_DIRECTORY {})\n",
            quote_list(&out_dirs, " ")
        ));
        text.push_str("add_custom_command(\n");
        text.push_str(&format!(
            "  OUTPUT{}{}\n",
            LIST_SEPARATOR,
            quote_list(&outs, LIST_SEPARATOR)
        ));
        if !depends.is_empty() {
            text.push_str(&format!(
                "  DEPENDS{}{}\n",
                LIST_SEPARATOR,
                quote_list(&depends, LIST_SEPARATOR)
            ));
        }
        text.push_str(&format!("  COMMAND bash -c {}\n", quote_string(&cmd)));
        text.push_str("  VERBATIM\n");
        text.push_str(&format!(
            "  WORKING_DIRECTORY {}\n",
            quote_path(&source_directory)
        ));
        text.push_str(")\n");
        text.push_str(&format!(
            "add_custom_target({} DEPENDS{}{})\n",
            pair.target,
            LIST_SEPARATOR,
            quote_list(&outs, LIST_SEPARATOR)
        ));
        ctx.emit(text);

        Ok(TargetInfo::new([
            Provider::Files { paths: outs },
            Provider::CMakeDeps {
                targets: vec![pair.target],
            },
        ]))
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::error::{AnalysisError, SubstitutionError};
    use crate::core::label::TargetId;
    use crate::test_support::TestRepo;

    #[test]
    fn test_genrule_emission() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            r#"
genrule(
    name = "gen",
    srcs = ["in.txt"],
    outs = ["out/o.txt"],
    cmd = "mkdir -p $$(dirname $@) && cp $< $@ && $(location @dep//tools:stamp) $@",
)
"#,
        );
        let info = state
            .get_target_info(&TargetId::parse("@repo//pkg:gen").unwrap())
            .unwrap();
        assert!(state.errors().is_empty(), "{:?}", state.errors());
        assert_eq!(info.files().unwrap(), &["/build/repo/pkg/out/o.txt".to_string()]);
        assert_eq!(info.cmake_deps()[0].as_str(), "Repo_pkg_gen");

        let text = state.builder().as_text();
        assert!(text.contains("OUTPUT\n    \"/build/repo/pkg/out/o.txt\""));
        assert!(text.contains("\"/src/repo/pkg/in.txt\""));
        assert!(text.contains("\"Dep::tools_stamp\""));
        assert!(text.contains(
            "COMMAND bash -c \"mkdir -p /build/repo/pkg/out && cp \\\"pkg/in.txt\\\" \\\"/build/repo/pkg/out/o.txt\\\" && $<TARGET_FILE:Dep_tools_stamp> \\\"/build/repo/pkg/out/o.txt\\\"\""
        ));
        assert!(text.contains("WORKING_DIRECTORY \"/src/repo\""));
        assert!(text.contains("add_custom_target(Repo_pkg_gen DEPENDS"));
    }

    #[test]
    fn test_genrule_location_of_source_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        std::fs::write(tmp.path().join("pkg/in.txt"), "hello").unwrap();
        let mut repo = TestRepo::with_source_dir(tmp.path());
        let state = repo.load(
            "pkg",
            r#"genrule(name = "g", srcs = ["in.txt"], outs = ["out.txt"], cmd = "cp $(location in.txt) $@")"#,
        );
        state.analyze(&[TargetId::parse("@repo//pkg:g").unwrap()]);
        assert!(state.errors().is_empty(), "{:?}", state.errors());
        assert!(state
            .builder()
            .as_text()
            .contains("COMMAND bash -c \"cp \\\"pkg/in.txt\\\" \\\"/build/repo/pkg/out.txt\\\"\""));

        let state = repo.load(
            "other",
            r#"genrule(name = "g", outs = ["out.txt"], cmd = "cp $(location missing.txt) $@")"#,
        );
        state.analyze(&[TargetId::parse("@repo//other:g").unwrap()]);
        assert!(matches!(
            state.errors()[0].error,
            AnalysisError::UnresolvedDependency { .. }
        ));
    }

    #[test]
    fn test_genrule_undefined_variable() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            "genrule(name = \"g\", outs = [\"x\"], cmd = \"echo $(UNDEFINED) > $@\")\n",
        );
        state.analyze(&[TargetId::parse("@repo//pkg:g").unwrap()]);
        assert_eq!(state.errors().len(), 1);
        assert!(matches!(
            &state.errors()[0].error,
            AnalysisError::Substitution(SubstitutionError::UndefinedVariable { name, .. })
                if name == "UNDEFINED"
        ));
    }

    #[test]
    fn test_genrule_uses_cc_toolchain() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            r#"
genrule(
    name = "g",
    outs = ["x.o"],
    cmd = "$(CC) -c -o $@ in.c",
    toolchains = ["@bazel_tools//tools/cpp:current_cc_toolchain"],
)
"#,
        );
        state.analyze(&[TargetId::parse("@repo//pkg:g").unwrap()]);
        assert!(state.errors().is_empty(), "{:?}", state.errors());
        assert!(state.builder().as_text().contains("${CMAKE_C_COMPILER} -c -o"));
    }
}
